//! Typed access to the two ledger services.
//!
//! The sync engine only talks to the `Aggregator` (Frollo, the source of truth) and the `Ledger`
//! (PocketSmith, the destination) traits. Each has a real HTTP implementation and an in-memory
//! implementation which is selected by `Mode`.

mod frollo;
mod http;
mod oauth;
mod pocketsmith;
mod test_aggregator;
mod test_ledger;

use crate::config::FrolloLogin;
use crate::error::ApiResult;
use crate::model::{
    Account, Institution, NewTransaction, SourceAccount, SourceTransaction, Transaction, User,
};
use crate::{Config, Result};
use anyhow::Context;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

pub use test_aggregator::TestAggregator;
pub use test_ledger::{BalanceUpdateCall, TestLedger, TEST_USER_ID};

#[cfg(test)]
pub(crate) use test_aggregator::source_account;

/// Read-only access to the account-aggregation service.
#[async_trait::async_trait]
pub trait Aggregator: Send + Sync {
    /// Lists every account the user has aggregated.
    async fn list_accounts(&self) -> ApiResult<Vec<SourceAccount>>;

    /// Fetches one account. A missing account is `ApiError::NotFound`.
    async fn fetch_account(&self, account_id: u64) -> ApiResult<SourceAccount>;

    /// Fetches the transactions of one account dated within `[from, to]`. The order of the
    /// returned transactions is not guaranteed.
    async fn fetch_transactions(
        &self,
        account_id: u64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> ApiResult<Vec<SourceTransaction>>;

    /// Asks the service to pull fresh data from the banks. The result is advisory.
    async fn trigger_refresh(&self) -> ApiResult<serde_json::Value>;
}

/// Access to the personal-finance ledger that receives the synced data.
#[async_trait::async_trait]
pub trait Ledger: Send + Sync {
    async fn current_user(&self) -> ApiResult<User>;

    async fn get_account(&self, account_id: u64) -> ApiResult<Account>;

    async fn find_account_by_name(&self, user_id: u64, name: &str) -> ApiResult<Account>;

    async fn find_institution_by_name(&self, user_id: u64, name: &str) -> ApiResult<Institution>;

    async fn create_institution(
        &self,
        user_id: u64,
        name: &str,
        currency_code: &str,
    ) -> ApiResult<Institution>;

    async fn create_account(
        &self,
        user_id: u64,
        institution_id: u64,
        name: &str,
        currency_code: &str,
        kind: &str,
    ) -> ApiResult<Account>;

    /// Returns the transactions that exactly match `date` and `memo`.
    async fn search_transactions_by_memo(
        &self,
        transaction_account_id: u64,
        date: NaiveDate,
        memo: &str,
    ) -> ApiResult<Vec<Transaction>>;

    async fn add_transaction(
        &self,
        transaction_account_id: u64,
        transaction: &NewTransaction,
    ) -> ApiResult<Transaction>;

    async fn update_transaction_account_balance(
        &self,
        transaction_account_id: u64,
        institution_id: u64,
        balance: Decimal,
        as_of: NaiveDate,
    ) -> ApiResult<()>;
}

/// Selects whether the real services or in-memory stand-ins are used.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Live,
    Test,
}

/// When this environment variable is set and non-empty, `Mode::from_env` returns `Mode::Test`.
pub const TEST_MODE_ENV: &str = "FROLLO_SYNC_IN_TEST_MODE";

impl Mode {
    pub fn from_env() -> Self {
        match std::env::var(TEST_MODE_ENV) {
            Ok(value) if !value.is_empty() => Mode::Test,
            _ => Mode::Live,
        }
    }
}

/// Logs in to Frollo, or builds a seeded in-memory aggregator in test mode.
pub async fn aggregator(
    config: &Config,
    login: &FrolloLogin,
    mode: Mode,
) -> Result<Arc<dyn Aggregator>> {
    match mode {
        Mode::Live => {
            let client = frollo::FrolloClient::login(
                config.frollo_api_url(),
                config.frollo_auth_url(),
                login.username(),
                login.password(),
                config.page_size(),
            )
            .await
            .context("Unable to log in to Frollo")?;
            Ok(Arc::new(client))
        }
        Mode::Test => {
            debug!("Using the in-memory aggregator");
            Ok(Arc::new(TestAggregator::seeded()?))
        }
    }
}

/// Creates a PocketSmith client, or an empty in-memory ledger in test mode.
pub fn ledger(config: &Config, token: &str, mode: Mode) -> Result<Arc<dyn Ledger>> {
    match mode {
        Mode::Live => Ok(Arc::new(pocketsmith::PocketSmithClient::new(
            config.pocketsmith_api_url(),
            token,
        )?)),
        Mode::Test => {
            debug!("Using the in-memory ledger");
            Ok(Arc::new(TestLedger::new()))
        }
    }
}
