//! Finds, or creates, the PocketSmith account that receives a Frollo account's transactions.

use crate::api::Ledger;
use crate::db::{AccountMapping, Db};
use crate::model::destination::ACCOUNT_KIND_BANK;
use crate::model::{Account, SourceAccount};
use crate::Result;
use anyhow::Context;
use tracing::{debug, info, warn};

/// Returns the destination account for `source`, in order of preference:
/// - the account remembered in the state store, if it still exists
/// - an account with the same name
/// - a new account, under an institution named after the source provider (created if needed)
///
/// Every successful resolution is remembered in the state store.
pub(crate) async fn resolve(
    ledger: &dyn Ledger,
    db: &Db,
    user_id: u64,
    source: &SourceAccount,
) -> Result<Account> {
    let account = match remembered(ledger, db, source).await? {
        Some(account) => account,
        None => find_or_create(ledger, user_id, source).await?,
    };

    let mapping = AccountMapping {
        source_account_id: source.id,
        destination_account_id: account.id,
        transaction_account_id: account.transaction_account_id(),
        institution_id: account.institution_id(),
        name: source.name().to_string(),
    };
    if let Err(e) = db.save_mapping(&mapping).await {
        warn!("Unable to remember the account for '{}': {e:#}", source.name());
    }
    Ok(account)
}

async fn remembered(ledger: &dyn Ledger, db: &Db, source: &SourceAccount) -> Result<Option<Account>> {
    let mapping = match db.mapping(source.id).await {
        Ok(Some(mapping)) => mapping,
        Ok(None) => return Ok(None),
        Err(e) => {
            warn!("Unable to read the state store, matching '{}' by name: {e:#}", source.name());
            return Ok(None);
        }
    };

    match ledger.get_account(mapping.destination_account_id).await {
        Ok(account) => {
            debug!(
                "Using PocketSmith account {} remembered for '{}'",
                account.id,
                source.name()
            );
            Ok(Some(account))
        }
        Err(e) if e.is_not_found() => {
            warn!(
                "PocketSmith account {} no longer exists, forgetting it and matching '{}' by name",
                mapping.destination_account_id,
                source.name()
            );
            if let Err(e) = db.delete_mapping(source.id).await {
                warn!("Unable to forget the account for '{}': {e:#}", source.name());
            }
            Ok(None)
        }
        Err(e) => Err(e).with_context(|| {
            format!(
                "Unable to look up PocketSmith account {}",
                mapping.destination_account_id
            )
        }),
    }
}

async fn find_or_create(ledger: &dyn Ledger, user_id: u64, source: &SourceAccount) -> Result<Account> {
    let name = source.name();
    match ledger.find_account_by_name(user_id, name).await {
        Ok(account) => {
            debug!("Found PocketSmith account {} named '{name}'", account.id);
            return Ok(account);
        }
        Err(e) if e.is_not_found() => {}
        Err(e) => {
            return Err(e).with_context(|| format!("Unable to look up PocketSmith account '{name}'"))
        }
    }

    let currency_code = source.currency_code();
    let provider = source.provider_name();
    let institution = match ledger.find_institution_by_name(user_id, provider).await {
        Ok(institution) => institution,
        Err(e) if e.is_not_found() => {
            let institution = ledger
                .create_institution(user_id, provider, &currency_code)
                .await
                .with_context(|| format!("Unable to create PocketSmith institution '{provider}'"))?;
            info!(
                "Created institution '{}' with id {}",
                institution.title, institution.id
            );
            institution
        }
        Err(e) => {
            return Err(e)
                .with_context(|| format!("Unable to look up PocketSmith institution '{provider}'"))
        }
    };

    let account = ledger
        .create_account(
            user_id,
            institution.id,
            name,
            &currency_code,
            ACCOUNT_KIND_BANK,
        )
        .await
        .with_context(|| format!("Unable to create PocketSmith account '{name}'"))?;
    info!(
        "Created account '{}' with id {} under '{}'",
        account.title, account.id, institution.title
    );
    Ok(account)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{source_account, TestLedger, TEST_USER_ID};
    use crate::model::AccountType;
    use crate::test::TestEnv;
    use rust_decimal::Decimal;

    fn everyday() -> SourceAccount {
        source_account(
            1657651,
            "Everyday",
            "Example Bank",
            AccountType::BankAccount,
            "500.00",
        )
    }

    #[tokio::test]
    async fn test_creates_institution_and_account_once() {
        let env = TestEnv::new().await;
        let ledger = TestLedger::new();
        let source = everyday();

        let first = resolve(&ledger, env.db(), TEST_USER_ID, &source).await.unwrap();
        assert_eq!(ledger.institutions().len(), 1);
        assert_eq!(ledger.accounts().len(), 1);
        assert_eq!(first.title, "Everyday");
        assert_eq!(first.currency_code, "aud");
        assert_eq!(first.kind, ACCOUNT_KIND_BANK);
        assert_eq!(ledger.institutions()[0].title, "Example Bank");
        assert_eq!(ledger.institutions()[0].currency_code, "aud");

        let second = resolve(&ledger, env.db(), TEST_USER_ID, &source).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(ledger.institutions().len(), 1);
        assert_eq!(ledger.accounts().len(), 1);

        let mapping = env.db().mapping(source.id).await.unwrap().unwrap();
        assert_eq!(mapping.destination_account_id, first.id);
        assert_eq!(mapping.transaction_account_id, first.transaction_account_id());
    }

    #[tokio::test]
    async fn test_reuses_existing_institution() {
        let env = TestEnv::new().await;
        let ledger = TestLedger::new();
        ledger.insert_institution("Example Bank", "aud");

        resolve(&ledger, env.db(), TEST_USER_ID, &everyday())
            .await
            .unwrap();
        assert_eq!(ledger.institutions().len(), 1);
        assert_eq!(ledger.accounts().len(), 1);
    }

    #[tokio::test]
    async fn test_finds_account_by_name() {
        let env = TestEnv::new().await;
        let ledger = TestLedger::new();
        let institution = ledger.insert_institution("Some Other Bank", "aud");
        let existing = ledger.insert_account(&institution, "Everyday", Decimal::ZERO);

        let found = resolve(&ledger, env.db(), TEST_USER_ID, &everyday())
            .await
            .unwrap();
        assert_eq!(found.id, existing.id);
        assert_eq!(ledger.institutions().len(), 1);
        assert_eq!(ledger.accounts().len(), 1);
    }

    #[tokio::test]
    async fn test_mapping_survives_rename() {
        let env = TestEnv::new().await;
        let ledger = TestLedger::new();
        let first = resolve(&ledger, env.db(), TEST_USER_ID, &everyday())
            .await
            .unwrap();

        let mut renamed = everyday();
        renamed.account_name = "Everyday Plus".to_string();
        let second = resolve(&ledger, env.db(), TEST_USER_ID, &renamed)
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(ledger.accounts().len(), 1);
        let mapping = env.db().mapping(renamed.id).await.unwrap().unwrap();
        assert_eq!(mapping.name, "Everyday Plus");
    }

    #[tokio::test]
    async fn test_stale_mapping_falls_back_to_name() {
        let env = TestEnv::new().await;
        let ledger = TestLedger::new();
        let first = resolve(&ledger, env.db(), TEST_USER_ID, &everyday())
            .await
            .unwrap();
        ledger.remove_account(first.id);

        let second = resolve(&ledger, env.db(), TEST_USER_ID, &everyday())
            .await
            .unwrap();
        assert_ne!(first.id, second.id);
        // The institution is found by name rather than created again.
        assert_eq!(ledger.institutions().len(), 1);
        let mapping = env.db().mapping(1657651).await.unwrap().unwrap();
        assert_eq!(mapping.destination_account_id, second.id);
    }

    #[tokio::test]
    async fn test_lookup_failure_is_an_error() {
        let env = TestEnv::new().await;
        let ledger = TestLedger::new();
        ledger.fail_account_lookup();
        let e = resolve(&ledger, env.db(), TEST_USER_ID, &everyday())
            .await
            .unwrap_err();
        assert!(e.to_string().contains("Everyday"), "{e}");
        assert!(ledger.accounts().is_empty());
        assert!(ledger.institutions().is_empty());
    }
}
