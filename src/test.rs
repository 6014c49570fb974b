//! Shared test utilities for creating test environments.
//!
//! This module is only compiled when running tests (`#[cfg(test)]`).

use crate::db::Db;
use crate::model::source::Description;
use crate::model::{Balance, SourceTransaction};
use crate::Config;
use chrono::NaiveDate;
use tempfile::TempDir;

/// Test environment that sets up a frollo-sync home directory with Config and state store.
/// Holds TempDir to keep the directory alive for the duration of the test.
pub struct TestEnv {
    _temp_dir: TempDir,
    config: Config,
}

impl TestEnv {
    /// Creates a test environment with a default config.json and an empty state store.
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("frollo-sync");
        let config = Config::create(&root).await.unwrap();
        Self {
            _temp_dir: temp_dir,
            config,
        }
    }

    /// Returns a clone of the Config.
    pub fn config(&self) -> Config {
        self.config.clone()
    }

    pub fn db(&self) -> &Db {
        self.config.db()
    }
}

/// A purchase with memo `REF-{id}` and payee `PAYEE {id}`.
pub fn source_transaction(
    id: u64,
    account_id: u64,
    date: NaiveDate,
    amount: &str,
) -> SourceTransaction {
    SourceTransaction {
        id,
        account_id,
        transaction_date: date,
        post_date: Some(date),
        amount: Balance::new(amount, "AUD"),
        description: Description {
            original: format!("PAYEE {id}"),
            simple: format!("Payee {id}"),
        },
        reference: format!("REF-{id}"),
        kind: "purchase".to_string(),
        status: "posted".to_string(),
    }
}

pub fn with_kind(mut transaction: SourceTransaction, kind: &str) -> SourceTransaction {
    transaction.kind = kind.to_string();
    transaction
}
