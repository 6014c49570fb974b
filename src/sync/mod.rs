//! The sync engine.
//!
//! For each Frollo account: check that it can be synced, page through its history, find or create
//! the matching PocketSmith account, import what PocketSmith does not have yet and finally raise
//! the PocketSmith balance if it has fallen behind. Accounts are independent of each other, a
//! failure in one is recorded in the `SyncReport` and the others carry on.

mod balance;
mod importer;
mod resolver;
mod window;

use crate::api::{Aggregator, Ledger};
use crate::db::{Db, RunRecord, Watermark};
use crate::error::{is_malformed, is_unauthorized};
use crate::model::{SourceAccount, SourceTransaction};
use crate::{Config, Result};
use anyhow::Context;
use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

pub use importer::ImportStats;
pub use window::WindowPlan;

/// Settings for one run of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    pub plan: WindowPlan,
    pub match_threshold: u32,
    pub concurrency: usize,
    pub use_watermark: bool,
    pub fail_fast: bool,
    /// The end of the first window and the as-of date of balance updates.
    pub today: NaiveDate,
}

impl SyncOptions {
    pub fn from_config(config: &Config, fail_fast: bool) -> Result<Self> {
        Ok(Self {
            plan: WindowPlan::new(config.window_months(), config.step_months())?,
            match_threshold: config.match_threshold(),
            concurrency: config.concurrency(),
            use_watermark: config.use_watermark(),
            fail_fast,
            today: Local::now().date_naive(),
        })
    }
}

/// How the sync of one account ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AccountOutcome {
    Synced {
        #[serde(flatten)]
        stats: ImportStats,
        balance_updated: bool,
    },
    /// The account is not active or not a bank account.
    Skipped { reason: String },
    /// Frollo has no transactions for the account.
    Empty,
    Failed {
        error: String,
        /// Set when the failure stops the rest of the run.
        halt: Option<HaltCause>,
    },
    /// The run was halted before this account was started.
    NotAttempted { reason: String },
}

/// Failures that no other account can get past.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltCause {
    CredentialsRejected,
    MalformedData,
}

impl HaltCause {
    fn of(e: &crate::Error) -> Option<Self> {
        if is_unauthorized(e) {
            Some(HaltCause::CredentialsRejected)
        } else if is_malformed(e) {
            Some(HaltCause::MalformedData)
        } else {
            None
        }
    }

    fn reason(&self) -> &'static str {
        match self {
            HaltCause::CredentialsRejected => "the credentials were rejected",
            HaltCause::MalformedData => "Frollo returned data that cannot be read",
        }
    }
}

impl AccountOutcome {
    fn label(&self) -> &'static str {
        match self {
            AccountOutcome::Synced { .. } => "synced",
            AccountOutcome::Skipped { .. } => "skipped",
            AccountOutcome::Empty => "empty",
            AccountOutcome::Failed { .. } => "failed",
            AccountOutcome::NotAttempted { .. } => "not_attempted",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            AccountOutcome::Failed { .. } | AccountOutcome::NotAttempted { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountReport {
    pub account_id: u64,
    pub name: Option<String>,
    #[serde(flatten)]
    pub outcome: AccountOutcome,
}

impl AccountReport {
    fn record(&self) -> RunRecord {
        let (imported, skipped, failed) = match &self.outcome {
            AccountOutcome::Synced { stats, .. } => {
                (stats.imported, stats.skipped_existing, stats.failed)
            }
            _ => (0, 0, 0),
        };
        RunRecord {
            source_account_id: self.account_id,
            started_at: None,
            imported,
            skipped,
            failed,
            outcome: self.outcome.label().to_string(),
        }
    }
}

/// The outcome of every requested account, in the order they were requested.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub accounts: Vec<AccountReport>,
}

impl SyncReport {
    pub fn imported(&self) -> u64 {
        self.accounts
            .iter()
            .map(|a| match &a.outcome {
                AccountOutcome::Synced { stats, .. } => stats.imported,
                _ => 0,
            })
            .sum()
    }

    pub fn failures(&self) -> usize {
        self.accounts
            .iter()
            .filter(|a| a.outcome.is_failure())
            .count()
    }

    pub fn is_success(&self) -> bool {
        self.failures() == 0
    }

    pub fn summary(&self) -> String {
        let synced = self
            .accounts
            .iter()
            .filter(|a| matches!(a.outcome, AccountOutcome::Synced { .. }))
            .count();
        format!(
            "Synced {synced} of {} accounts, imported {} transactions, {} accounts failed",
            self.accounts.len(),
            self.imported(),
            self.failures()
        )
    }
}

/// Runs the sync of a list of Frollo accounts into PocketSmith.
#[derive(Clone)]
pub struct Engine {
    aggregator: Arc<dyn Aggregator>,
    ledger: Arc<dyn Ledger>,
    db: Db,
    options: SyncOptions,
    /// Held while an account is matched to PocketSmith, so concurrent accounts from the same
    /// provider share one institution.
    resolving: Arc<Mutex<()>>,
}

impl Engine {
    pub(crate) fn new(
        aggregator: Arc<dyn Aggregator>,
        ledger: Arc<dyn Ledger>,
        db: Db,
        options: SyncOptions,
    ) -> Self {
        Self {
            aggregator,
            ledger,
            db,
            options,
            resolving: Arc::new(Mutex::new(())),
        }
    }

    /// Syncs every account in `account_ids`. Only a failure to identify the PocketSmith user is
    /// returned as an error, everything else is reported per account.
    pub async fn run(&self, account_ids: &[u64]) -> Result<SyncReport> {
        let user = self
            .ledger
            .current_user()
            .await
            .context("Unable to read the PocketSmith user")?;
        debug!("PocketSmith user {} ({})", user.id, user.login);

        self.request_refresh();

        let mut seen = HashSet::new();
        let account_ids: Vec<u64> = account_ids
            .iter()
            .copied()
            .filter(|id| {
                let first = seen.insert(*id);
                if !first {
                    warn!("Account {id} is listed more than once, syncing it once");
                }
                first
            })
            .collect();

        let concurrency = self.options.concurrency.max(1);
        let mut slots: Vec<Option<AccountReport>> = vec![None; account_ids.len()];
        let mut tasks = JoinSet::new();
        let mut halt: Option<String> = None;

        for (ix, &account_id) in account_ids.iter().enumerate() {
            while tasks.len() >= concurrency {
                if let Some(joined) = tasks.join_next().await {
                    let (done, report) = joined.context("An account sync task panicked")?;
                    self.check_halt(&report, &mut halt);
                    slots[done] = Some(report);
                }
            }
            if let Some(reason) = &halt {
                info!("Not syncing account {account_id}: {reason}");
                slots[ix] = Some(AccountReport {
                    account_id,
                    name: None,
                    outcome: AccountOutcome::NotAttempted {
                        reason: reason.clone(),
                    },
                });
                continue;
            }
            let engine = self.clone();
            let user_id = user.id;
            tasks.spawn(async move { (ix, engine.sync_account(user_id, account_id).await) });
        }

        while let Some(joined) = tasks.join_next().await {
            let (done, report) = joined.context("An account sync task panicked")?;
            self.check_halt(&report, &mut halt);
            slots[done] = Some(report);
        }

        Ok(SyncReport {
            accounts: slots.into_iter().flatten().collect(),
        })
    }

    fn check_halt(&self, report: &AccountReport, halt: &mut Option<String>) {
        if halt.is_some() {
            return;
        }
        if let AccountOutcome::Failed { halt: cause, .. } = &report.outcome {
            if let Some(cause) = cause {
                *halt = Some(cause.reason().to_string());
            } else if self.options.fail_fast {
                *halt = Some(format!(
                    "account {} failed and --fail-fast is set",
                    report.account_id
                ));
            }
        }
    }

    /// Asks Frollo to pull fresh data from the banks. This is not waited for.
    fn request_refresh(&self) {
        let aggregator = Arc::clone(&self.aggregator);
        tokio::spawn(async move {
            match aggregator.trigger_refresh().await {
                Ok(ack) => debug!("Frollo refresh requested: {ack}"),
                Err(e) => debug!("Frollo refresh request failed: {e}"),
            }
        });
    }

    async fn sync_account(&self, user_id: u64, account_id: u64) -> AccountReport {
        let mut name = None;
        let result = match self
            .aggregator
            .fetch_account(account_id)
            .await
            .with_context(|| format!("Unable to fetch Frollo account {account_id}"))
        {
            Ok(source) => {
                name = Some(source.name().to_string());
                self.sync_source(user_id, &source).await
            }
            Err(e) => Err(e),
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Sync of account {account_id} failed: {e:#}");
                AccountOutcome::Failed {
                    error: format!("{e:#}"),
                    halt: HaltCause::of(&e),
                }
            }
        };
        let report = AccountReport {
            account_id,
            name,
            outcome,
        };
        if let Err(e) = self.db.record_run(&report.record()).await {
            warn!("Unable to record the sync of account {account_id}: {e:#}");
        }
        report
    }

    async fn sync_source(&self, user_id: u64, source: &SourceAccount) -> Result<AccountOutcome> {
        if let Some(reason) = source.ineligibility() {
            info!("Skipping: {reason}");
            return Ok(AccountOutcome::Skipped { reason });
        }
        let name = source.name();
        info!("Syncing account '{name}'");

        let watermark = self.watermark(source).await;
        let fetched = window::fetch_history(
            self.aggregator.as_ref(),
            source.id,
            self.options.plan,
            self.options.today,
            watermark.as_ref().map(|w| w.date),
        )
        .await?;
        if fetched.is_empty() {
            info!("'{name}' has no transactions, skipping");
            return Ok(AccountOutcome::Empty);
        }

        let mut transactions = newest_first(fetched);
        if let Some(watermark) = &watermark {
            transactions.retain(|t| t.transaction_date >= watermark.date);
        }

        let account = {
            let _resolving = self.resolving.lock().await;
            resolver::resolve(self.ledger.as_ref(), &self.db, user_id, source).await?
        };
        info!("'{name}' has {} transactions to check", transactions.len());

        let stats = importer::import(
            self.ledger.as_ref(),
            account.transaction_account_id(),
            name,
            self.options.match_threshold,
            &transactions,
        )
        .await?;
        if stats.failed == 0 {
            if let Some(newest) = transactions.first() {
                self.save_watermark(source, newest).await;
            }
        }

        let balance_updated =
            balance::reconcile(self.ledger.as_ref(), source, &account, self.options.today).await?;

        info!(
            "'{name}': imported {}, already present {}, failed {}",
            stats.imported, stats.skipped_existing, stats.failed
        );
        Ok(AccountOutcome::Synced {
            stats,
            balance_updated,
        })
    }

    async fn watermark(&self, source: &SourceAccount) -> Option<Watermark> {
        if !self.options.use_watermark {
            return None;
        }
        match self.db.watermark(source.id).await {
            Ok(watermark) => watermark,
            Err(e) => {
                warn!(
                    "Unable to read the watermark of '{}', syncing its full history: {e:#}",
                    source.name()
                );
                None
            }
        }
    }

    async fn save_watermark(&self, source: &SourceAccount, newest: &SourceTransaction) {
        let watermark = Watermark {
            date: newest.transaction_date,
            memo: newest.reference.clone(),
        };
        if let Err(e) = self.db.save_watermark(source.id, &watermark).await {
            warn!("Unable to save the watermark of '{}': {e:#}", source.name());
        }
    }
}

/// Drops repeated ids, which overlapping windows produce, and sorts newest first. Transactions on
/// the same date are ordered by descending id so the order is the same on every run.
fn newest_first(transactions: Vec<SourceTransaction>) -> Vec<SourceTransaction> {
    let mut seen = HashSet::new();
    let mut unique: Vec<SourceTransaction> = transactions
        .into_iter()
        .filter(|t| seen.insert(t.id))
        .collect();
    unique.sort_by(|a, b| {
        b.transaction_date
            .cmp(&a.transaction_date)
            .then_with(|| b.id.cmp(&a.id))
    });
    unique
}
