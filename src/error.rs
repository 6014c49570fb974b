use chrono::NaiveDate;

pub type Error = anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// The ways a call to either ledger service can fail.
///
/// Only `NotFound` is a first-class outcome, it drives the find-or-create logic of the account
/// resolver. `Unauthorized` means the credentials are bad and nothing further will succeed.
/// Everything else is lumped together in `Other`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::Other(e.into())
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// A Frollo transaction whose amount is not a canonical decimal. Frollo data that cannot be read
/// stops the whole run, not just the account.
#[derive(Debug, thiserror::Error)]
#[error("transaction {id} on {date} has the malformed amount '{amount}'")]
pub struct MalformedAmount {
    pub id: u64,
    pub date: NaiveDate,
    pub amount: String,
}

/// Returns true if `e`, or anything in its chain, is a `MalformedAmount`.
pub fn is_malformed(e: &Error) -> bool {
    e.chain().any(|cause| cause.is::<MalformedAmount>())
}

/// Returns true if `e`, or anything in its chain, is an `ApiError::Unauthorized`.
pub fn is_unauthorized(e: &Error) -> bool {
    e.chain().any(|cause| {
        cause
            .downcast_ref::<ApiError>()
            .map(ApiError::is_unauthorized)
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn unauthorized_is_found_through_context() {
        let inner: ApiResult<()> = Err(ApiError::Unauthorized("token expired".into()));
        let e = inner.context("Unable to fetch account 42").unwrap_err();
        assert!(is_unauthorized(&e));
    }

    #[test]
    fn other_errors_are_not_unauthorized() {
        let inner: ApiResult<()> = Err(ApiError::NotFound("account 'Everyday'".into()));
        let e = inner.context("lookup").unwrap_err();
        assert!(!is_unauthorized(&e));
        assert_eq!(
            ApiError::NotFound("account 'Everyday'".into()).to_string(),
            "account 'Everyday' not found"
        );
    }

    #[test]
    fn malformed_amount_is_found_through_context() {
        let inner: Result<()> = Err(MalformedAmount {
            id: 7,
            date: NaiveDate::from_ymd_opt(2025, 1, 7).unwrap(),
            amount: "12.5.0".into(),
        }
        .into());
        let e = inner.context("Unable to import 'Everyday'").unwrap_err();
        assert!(is_malformed(&e));
        assert!(!is_unauthorized(&e));
        assert!(format!("{e:#}").contains("'12.5.0'"));
    }
}
