use crate::api::{self, Mode};
use crate::args::AccountsArgs;
use crate::commands::Out;
use crate::config::FrolloLogin;
use crate::db::{Db, RunRecord};
use crate::model::{AccountStatus, AccountType, SourceAccount};
use crate::{Config, Result};
use anyhow::Context;
use serde::Serialize;
use tracing::warn;

/// One line of the `frollo-sync accounts` listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountSummary {
    pub id: u64,
    pub name: String,
    pub provider: String,
    pub status: AccountStatus,
    pub account_type: AccountType,
    pub balance: String,
    pub currency: String,
    /// Why the account would be skipped, `None` if it can be synced.
    pub ineligible: Option<String>,
    pub last_sync: Option<LastSync>,
}

/// The most recent `sync` of an account, from the run history in the state store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastSync {
    pub at: String,
    pub outcome: String,
    pub imported: u64,
    pub failed: u64,
}

impl From<RunRecord> for LastSync {
    fn from(run: RunRecord) -> Self {
        Self {
            at: run.started_at.unwrap_or_default(),
            outcome: run.outcome,
            imported: run.imported,
            failed: run.failed,
        }
    }
}

impl From<&SourceAccount> for AccountSummary {
    fn from(account: &SourceAccount) -> Self {
        let balance = match account.current_balance.value() {
            Ok(amount) => amount.to_string(),
            Err(_) => account.current_balance.amount.clone(),
        };
        Self {
            id: account.id,
            name: account.name().to_string(),
            provider: account.provider_name().to_string(),
            status: account.account_status.clone(),
            account_type: account.account_type().clone(),
            balance,
            currency: account.current_balance.currency.clone(),
            ineligible: account.ineligibility(),
            last_sync: None,
        }
    }
}

/// Handles `frollo-sync accounts`: logs in to Frollo and lists the aggregated accounts.
pub async fn accounts(
    config: Config,
    args: &AccountsArgs,
    mode: Mode,
) -> Result<Out<Vec<AccountSummary>>> {
    let login = FrolloLogin::new(
        args.frollo().username().cloned(),
        args.frollo().password().cloned(),
    )?;
    let aggregator = api::aggregator(&config, &login, mode).await?;
    let accounts = aggregator
        .list_accounts()
        .await
        .context("Unable to list Frollo accounts")?;
    let mut summaries: Vec<AccountSummary> = accounts.iter().map(AccountSummary::from).collect();
    for summary in &mut summaries {
        summary.last_sync = last_sync(config.db(), summary.id).await;
    }

    let mut message = format!("Frollo has {} accounts", summaries.len());
    for s in &summaries {
        let note = if s.ineligible.is_some() {
            "not synced"
        } else {
            "can be synced"
        };
        message.push_str(&format!(
            "\n  {} {} ({}, {}, {}) {} {}: {note}",
            s.id, s.name, s.provider, s.account_type, s.status, s.balance, s.currency
        ));
        if let Some(last) = &s.last_sync {
            message.push_str(&format!(
                ", last synced {} ({}, imported {})",
                last.at, last.outcome, last.imported
            ));
        }
    }
    Ok(Out::new(message, summaries))
}

async fn last_sync(db: &Db, account_id: u64) -> Option<LastSync> {
    match db.runs(account_id, 1).await {
        Ok(runs) => runs.into_iter().next().map(LastSync::from),
        Err(e) => {
            warn!("Unable to read the sync history of account {account_id}: {e:#}");
            None
        }
    }
}
