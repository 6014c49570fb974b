//! Types returned by the Frollo aggregation API. These are read fresh on every run and never
//! mutated locally.

use crate::model::Amount;
use crate::Result;
use anyhow::Context;
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

/// Lifecycle status of an aggregated account. Only `Active` accounts are synced.
#[derive(Debug, Default, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Inactive,
    #[default]
    #[serde(other)]
    Other,
}

serde_plain::derive_display_from_serialize!(AccountStatus);

/// Classification of an aggregated account.
#[derive(Debug, Default, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    BankAccount,
    Savings,
    CreditCard,
    Loan,
    #[default]
    #[serde(other)]
    Other,
}

serde_plain::derive_display_from_serialize!(AccountType);

/// An amount and its currency, e.g. `{"amount": "500.00", "currency": "AUD"}`.
#[derive(Debug, Default, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub amount: String,
    pub currency: String,
}

impl Balance {
    pub fn new(amount: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            amount: amount.into(),
            currency: currency.into(),
        }
    }

    /// Parses the decimal text. Fails when the text is not a canonical decimal.
    pub fn value(&self) -> Result<Amount> {
        Amount::from_str(&self.amount)
            .with_context(|| format!("Unable to parse amount '{}'", self.amount))
    }
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct AccountAttributes {
    pub account_type: AccountType,
    #[serde(default, deserialize_with = "null_as_default")]
    pub container: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub classification: String,
}

/// An account as seen by the aggregation service.
#[derive(Debug, Default, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct SourceAccount {
    pub id: u64,
    pub account_name: String,
    pub account_status: AccountStatus,
    pub account_attributes: AccountAttributes,
    pub provider: Provider,
    pub primary_balance: Balance,
    pub current_balance: Balance,
}

impl SourceAccount {
    pub fn name(&self) -> &str {
        &self.account_name
    }

    pub fn provider_name(&self) -> &str {
        &self.provider.name
    }

    pub fn account_type(&self) -> &AccountType {
        &self.account_attributes.account_type
    }

    /// Returns `None` if the account can be synced, otherwise the reason it is skipped.
    pub fn ineligibility(&self) -> Option<String> {
        if self.account_status != AccountStatus::Active {
            return Some(format!(
                "only active accounts are synced, '{}' has status {}",
                self.account_name, self.account_status
            ));
        }
        match self.account_type() {
            AccountType::BankAccount | AccountType::Savings => None,
            other => Some(format!(
                "only bank accounts are supported, '{}' has type {other}",
                self.account_name
            )),
        }
    }

    /// The lower-cased primary balance currency, used as the destination currency code.
    pub fn currency_code(&self) -> String {
        self.primary_balance.currency.to_lowercase()
    }
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Description {
    #[serde(default, deserialize_with = "null_as_default")]
    pub original: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub simple: String,
}

/// A transaction as seen by the aggregation service.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct SourceTransaction {
    pub id: u64,
    pub account_id: u64,
    pub transaction_date: NaiveDate,
    #[serde(default, deserialize_with = "optional_date")]
    pub post_date: Option<NaiveDate>,
    pub amount: Balance,
    pub description: Description,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reference: String,
    #[serde(default, rename = "type", deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
}

impl SourceTransaction {
    /// Transfers are recognised by the type tag, case-sensitive as sourced.
    pub fn is_transfer(&self) -> bool {
        self.kind.contains("transfer")
    }
}

/// The envelope returned by the transactions endpoint. Cursors are not followed.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct TransactionPage {
    pub data: Vec<SourceTransaction>,
    #[serde(default)]
    pub paging: Paging,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Paging {
    #[serde(default)]
    pub cursors: Option<Cursors>,
    #[serde(default)]
    pub total: Option<u64>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Cursors {
    pub before: Option<String>,
    pub after: Option<String>,
}

/// Frollo sends `null` for text it does not have, treat it like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Empty strings and nulls both mean "no date".
fn optional_date<'de, D>(deserializer: D) -> std::result::Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCOUNT_JSON: &str = r#"{
        "id": 1657651,
        "aggregator": "cdr",
        "external_id": "abc",
        "provider_account_id": 77,
        "provider": {"id": 12, "name": "Example Bank", "small_logo_url": ""},
        "account_name": "Everyday",
        "account_status": "active",
        "joint_account": false,
        "account_attributes": {
            "container": "bank",
            "account_type": "bank_account",
            "group": "bank",
            "classification": "personal"
        },
        "primary_balance": {"amount": "500.00", "currency": "AUD"},
        "current_balance": {"amount": "500.00", "currency": "AUD"},
        "payids": []
    }"#;

    const TRANSACTION_JSON: &str = r#"{
        "id": 99,
        "account_id": 1657651,
        "base_type": "debit",
        "status": "posted",
        "transaction_date": "2025-01-07",
        "post_date": "",
        "amount": {"amount": "-12.50", "currency": "AUD"},
        "description": {"original": "CAFE 123 SYDNEY", "simple": "Cafe 123"},
        "reference": "REF-0099",
        "type": "internal_transfer",
        "user_tags": []
    }"#;

    #[test]
    fn test_deserialize_account() {
        let account: SourceAccount = serde_json::from_str(ACCOUNT_JSON).unwrap();
        assert_eq!(account.id, 1657651);
        assert_eq!(account.name(), "Everyday");
        assert_eq!(account.provider_name(), "Example Bank");
        assert_eq!(account.account_status, AccountStatus::Active);
        assert_eq!(account.account_type(), &AccountType::BankAccount);
        assert_eq!(account.currency_code(), "aud");
        assert!(account.ineligibility().is_none());
    }

    #[test]
    fn test_unknown_enum_values() {
        let json = ACCOUNT_JSON
            .replace("\"active\"", "\"closed\"")
            .replace("\"bank_account\"", "\"mortgage\"");
        let account: SourceAccount = serde_json::from_str(&json).unwrap();
        assert_eq!(account.account_status, AccountStatus::Other);
        assert_eq!(account.account_type(), &AccountType::Other);
    }

    #[test]
    fn test_ineligible_status() {
        let mut account: SourceAccount = serde_json::from_str(ACCOUNT_JSON).unwrap();
        account.account_status = AccountStatus::Inactive;
        let reason = account.ineligibility().unwrap();
        assert!(reason.contains("only active accounts"), "{reason}");
    }

    #[test]
    fn test_ineligible_type() {
        let mut account: SourceAccount = serde_json::from_str(ACCOUNT_JSON).unwrap();
        account.account_attributes.account_type = AccountType::CreditCard;
        let reason = account.ineligibility().unwrap();
        assert!(reason.contains("credit_card"), "{reason}");
    }

    #[test]
    fn test_savings_is_eligible() {
        let mut account: SourceAccount = serde_json::from_str(ACCOUNT_JSON).unwrap();
        account.account_attributes.account_type = AccountType::Savings;
        assert!(account.ineligibility().is_none());
    }

    #[test]
    fn test_deserialize_transaction() {
        let tx: SourceTransaction = serde_json::from_str(TRANSACTION_JSON).unwrap();
        assert_eq!(
            tx.transaction_date,
            NaiveDate::from_ymd_opt(2025, 1, 7).unwrap()
        );
        assert_eq!(tx.post_date, None);
        assert_eq!(tx.reference, "REF-0099");
        assert_eq!(tx.description.original, "CAFE 123 SYDNEY");
        assert!(tx.is_transfer());
        assert_eq!(tx.amount.value().unwrap().to_string(), "-12.50");
    }

    #[test]
    fn test_null_text_fields_read_as_empty() {
        let json = TRANSACTION_JSON
            .replace(r#""reference": "REF-0099""#, r#""reference": null"#)
            .replace(r#""simple": "Cafe 123""#, r#""simple": null"#)
            .replace(r#""type": "internal_transfer""#, r#""type": null"#)
            .replace(r#""status": "posted""#, r#""status": null"#);
        let tx: SourceTransaction = serde_json::from_str(&json).unwrap();
        assert_eq!(tx.reference, "");
        assert_eq!(tx.description.simple, "");
        assert_eq!(tx.description.original, "CAFE 123 SYDNEY");
        assert_eq!(tx.kind, "");
        assert_eq!(tx.status, "");
        assert!(!tx.is_transfer());

        let page: TransactionPage =
            serde_json::from_str(&format!(r#"{{"data": [{json}, {TRANSACTION_JSON}]}}"#)).unwrap();
        assert_eq!(page.data.len(), 2);
    }

    #[test]
    fn test_transfer_detection_is_case_sensitive() {
        let mut tx: SourceTransaction = serde_json::from_str(TRANSACTION_JSON).unwrap();
        tx.kind = "purchase".into();
        assert!(!tx.is_transfer());
        tx.kind = "Transfer".into();
        assert!(!tx.is_transfer());
    }

    #[test]
    fn test_deserialize_page() {
        let json = format!(
            r#"{{"data": [{TRANSACTION_JSON}], "paging": {{"cursors": {{"before": "a", "after": "b"}}, "total": 1}}}}"#
        );
        let page: TransactionPage = serde_json::from_str(&json).unwrap();
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.paging.total, Some(1));
    }

    #[test]
    fn test_bad_balance_amount() {
        let balance = Balance::new("five hundred", "AUD");
        assert!(balance.value().is_err());
    }
}
