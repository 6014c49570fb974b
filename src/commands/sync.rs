use crate::api::{self, Mode};
use crate::args::SyncArgs;
use crate::commands::Out;
use crate::config::{parse_account_ids, require, FrolloLogin};
use crate::sync::{Engine, SyncOptions, SyncReport};
use crate::{Config, Result};
use anyhow::{bail, ensure};
use tracing::debug;

/// Handles `frollo-sync sync`.
///
/// Credentials and the account list are checked before anything is contacted. The command fails
/// if any account failed, after the whole report has been printed.
pub async fn sync(config: Config, args: &SyncArgs, mode: Mode) -> Result<Out<SyncReport>> {
    let login = FrolloLogin::new(
        args.frollo().username().cloned(),
        args.frollo().password().cloned(),
    )?;
    let token = require(args.token().cloned(), "--token", "POCKETSMITH_TOKEN")?;
    let accounts = require(args.accounts().cloned(), "--accounts", "ACCOUNTS_TO_SYNC")?;
    let account_ids = parse_account_ids(&accounts)?;
    ensure!(
        !account_ids.is_empty(),
        "No account ids found in '{accounts}'"
    );
    let options = SyncOptions::from_config(&config, args.fail_fast())?;
    debug!("Syncing accounts {account_ids:?} with {options:?}");

    let ledger = api::ledger(&config, &token, mode)?;
    let aggregator = api::aggregator(&config, &login, mode).await?;
    let engine = Engine::new(aggregator, ledger, config.db().clone(), options);
    let report = engine.run(&account_ids).await?;

    let out = Out::new(report.summary(), report.clone());
    if !report.is_success() {
        out.print();
        bail!("{} of {} accounts failed", report.failures(), report.accounts.len());
    }
    Ok(out)
}
