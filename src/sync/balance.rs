//! Raises the PocketSmith balance when it has fallen below the bank balance reported by Frollo.

use crate::api::Ledger;
use crate::model::{Account, SourceAccount};
use crate::Result;
use anyhow::Context;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

/// Pushes the source balance to the destination when the destination balance is strictly lower.
/// A destination balance that is equal or higher is left alone.
///
/// Returns whether an update was made. Failures are logged and reported as `false`, except for
/// rejected credentials which are returned as an error.
pub(crate) async fn reconcile(
    ledger: &dyn Ledger,
    source: &SourceAccount,
    destination: &Account,
    today: NaiveDate,
) -> Result<bool> {
    match try_reconcile(ledger, source, destination, today).await {
        Ok(updated) => Ok(updated),
        Err(e) if crate::error::is_unauthorized(&e) => Err(e),
        Err(e) => {
            warn!("Unable to reconcile the balance of '{}': {e:#}", source.name());
            Ok(false)
        }
    }
}

async fn try_reconcile(
    ledger: &dyn Ledger,
    source: &SourceAccount,
    destination: &Account,
    today: NaiveDate,
) -> Result<bool> {
    // Read the account again, imported transactions may have moved its balance.
    let current = ledger
        .get_account(destination.id)
        .await
        .with_context(|| format!("Unable to read PocketSmith account {}", destination.id))?;
    let destination_balance = current.balance();
    let source_balance: Decimal = source
        .current_balance
        .value()
        .context("Unable to read the Frollo balance")?
        .value();

    if destination_balance >= source_balance {
        debug!(
            "'{}' balance {destination_balance} is not below {source_balance}, leaving it",
            source.name()
        );
        return Ok(false);
    }

    info!(
        "Updating the balance of '{}' from {destination_balance} to {source_balance}",
        source.name()
    );
    ledger
        .update_transaction_account_balance(
            current.transaction_account_id(),
            current.institution_id(),
            source_balance,
            today,
        )
        .await
        .context("Unable to update the PocketSmith balance")?;
    Ok(true)
}
