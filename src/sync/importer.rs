//! Imports transactions newest first and stops once the destination has clearly caught up.

use crate::api::Ledger;
use crate::error::MalformedAmount;
use crate::model::{NewTransaction, SourceTransaction};
use crate::Result;
use anyhow::Context;
use serde::Serialize;
use tracing::{debug, error, info, warn};

/// What happened to the transactions of one account.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    pub imported: u64,
    pub skipped_existing: u64,
    pub failed: u64,
    pub stopped_early: bool,
}

/// Builds the PocketSmith transaction for a Frollo transaction.
pub(crate) fn to_new_transaction(source: &SourceTransaction) -> Result<NewTransaction> {
    let amount = source.amount.value().map_err(|e| {
        debug!("{e:#}");
        MalformedAmount {
            id: source.id,
            date: source.transaction_date,
            amount: source.amount.amount.clone(),
        }
    })?;
    Ok(NewTransaction {
        payee: source.description.original.clone(),
        amount: amount.value(),
        date: source.transaction_date,
        is_transfer: source.is_transfer(),
        memo: source.reference.clone(),
    })
}

/// Walks `transactions`, which must be sorted newest first, adding those that the destination
/// does not have yet.
///
/// Once more than `threshold` consecutive transactions are found at the destination the walk
/// stops and older transactions are not looked at. A failed probe or a failed add is logged and
/// the transaction is skipped. A malformed amount or rejected credentials end the import with an
/// error.
pub(crate) async fn import(
    ledger: &dyn Ledger,
    transaction_account_id: u64,
    account_name: &str,
    threshold: u32,
    transactions: &[SourceTransaction],
) -> Result<ImportStats> {
    let mut stats = ImportStats::default();
    let mut consecutive: u32 = 0;

    for tx in transactions {
        if consecutive > threshold {
            info!(
                "'{account_name}' already has {consecutive} consecutive transactions, stopping"
            );
            stats.stopped_early = true;
            break;
        }
        debug!(
            "'{account_name}' {}: {}",
            tx.transaction_date, tx.description.original
        );

        let found = match ledger
            .search_transactions_by_memo(transaction_account_id, tx.transaction_date, &tx.reference)
            .await
        {
            Ok(found) => found,
            Err(e) if e.is_unauthorized() => {
                return Err(e).context("PocketSmith rejected the developer key");
            }
            Err(e) => {
                warn!(
                    "Unable to check '{account_name}' for the transaction on {} with memo '{}': {e}",
                    tx.transaction_date, tx.reference
                );
                stats.failed += 1;
                continue;
            }
        };

        if !found.is_empty() {
            debug!("Already have this transaction, skipping");
            consecutive += 1;
            stats.skipped_existing += 1;
            continue;
        }
        consecutive = 0;

        let new = to_new_transaction(tx)?;
        match ledger.add_transaction(transaction_account_id, &new).await {
            Ok(created) => {
                debug!("Added transaction {} to '{account_name}'", created.id);
                stats.imported += 1;
            }
            Err(e) if e.is_unauthorized() => {
                return Err(e).context("PocketSmith rejected the developer key");
            }
            Err(e) => {
                error!(
                    "Unable to add the transaction on {} with memo '{}' to '{account_name}': {e}",
                    tx.transaction_date, tx.reference
                );
                stats.failed += 1;
            }
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Ledger, TestLedger};
    use crate::test::{source_transaction, with_kind};
    use chrono::{Days, NaiveDate};
    use rust_decimal::Decimal;
    use std::str::FromStr;

    const TA: u64 = 2;

    fn day(n: u64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 1)
            .unwrap()
            .checked_add_days(Days::new(n))
            .unwrap()
    }

    /// `count` transactions, newest first, with ids and memos derived from their position.
    fn newest_first(count: u64) -> Vec<SourceTransaction> {
        (0..count)
            .map(|i| source_transaction(1000 + i, 1, day(100 - i), "-10.00"))
            .collect()
    }

    fn seed_destination(ledger: &TestLedger, transactions: &[SourceTransaction]) {
        for tx in transactions {
            ledger.insert_transaction(TA, tx.transaction_date, &tx.reference);
        }
    }

    #[tokio::test]
    async fn test_imports_everything_into_empty_destination() {
        let ledger = TestLedger::new();
        let transactions = newest_first(5);
        let stats = import(&ledger, TA, "Everyday", 10, &transactions)
            .await
            .unwrap();
        assert_eq!(stats.imported, 5);
        assert_eq!(stats.skipped_existing, 0);
        assert!(!stats.stopped_early);
        let added = ledger.transactions(TA);
        assert_eq!(added.len(), 5);
        assert_eq!(added[0].memo.as_deref(), Some(transactions[0].reference.as_str()));
        assert_eq!(added[0].amount, Decimal::from_str("-10.00").unwrap());
    }

    #[tokio::test]
    async fn test_stops_after_eleven_matches() {
        let ledger = TestLedger::new();
        let transactions = newest_first(12);
        seed_destination(&ledger, &transactions[..11]);

        let stats = import(&ledger, TA, "Everyday", 10, &transactions)
            .await
            .unwrap();
        assert!(stats.stopped_early);
        assert_eq!(stats.skipped_existing, 11);
        assert_eq!(stats.imported, 0);
        // The twelfth transaction is never probed.
        assert_eq!(ledger.searches(), 11);
        assert_eq!(ledger.transactions(TA).len(), 11);
    }

    #[tokio::test]
    async fn test_ten_matches_do_not_stop() {
        let ledger = TestLedger::new();
        let transactions = newest_first(11);
        seed_destination(&ledger, &transactions[..10]);

        let stats = import(&ledger, TA, "Everyday", 10, &transactions)
            .await
            .unwrap();
        assert!(!stats.stopped_early);
        assert_eq!(stats.imported, 1);
    }

    #[tokio::test]
    async fn test_nothing_older_than_a_long_run_of_matches_is_imported() {
        let ledger = TestLedger::new();
        let transactions = newest_first(30);
        // Three new, then a run of twelve existing, then fifteen missing.
        seed_destination(&ledger, &transactions[3..15]);

        let stats = import(&ledger, TA, "Everyday", 10, &transactions)
            .await
            .unwrap();
        assert_eq!(stats.imported, 3);
        assert!(stats.stopped_early);
        let oldest_allowed = transactions[14].transaction_date;
        assert!(ledger
            .transactions(TA)
            .iter()
            .all(|t| t.date >= oldest_allowed));
    }

    #[tokio::test]
    async fn test_match_run_is_reset_by_new_transaction() {
        let ledger = TestLedger::new();
        let transactions = newest_first(25);
        // Eight existing, one missing, eight existing, then eight missing.
        seed_destination(&ledger, &transactions[..8]);
        seed_destination(&ledger, &transactions[9..17]);

        let stats = import(&ledger, TA, "Everyday", 10, &transactions)
            .await
            .unwrap();
        assert!(!stats.stopped_early);
        assert_eq!(stats.imported, 9);
        assert_eq!(stats.skipped_existing, 16);
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let ledger = TestLedger::new();
        let transactions = newest_first(8);
        import(&ledger, TA, "Everyday", 10, &transactions)
            .await
            .unwrap();
        let stats = import(&ledger, TA, "Everyday", 10, &transactions)
            .await
            .unwrap();
        assert_eq!(stats.imported, 0);
        assert_eq!(stats.skipped_existing, 8);
        assert_eq!(ledger.transactions(TA).len(), 8);
    }

    #[tokio::test]
    async fn test_failed_probe_is_skipped() {
        let ledger = TestLedger::new();
        let transactions = newest_first(3);
        ledger.fail_search_for(&transactions[1].reference);

        let stats = import(&ledger, TA, "Everyday", 10, &transactions)
            .await
            .unwrap();
        assert_eq!(stats.imported, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(ledger.transactions(TA).len(), 2);
    }

    #[tokio::test]
    async fn test_failed_add_is_skipped() {
        let ledger = TestLedger::new();
        let transactions = newest_first(3);
        ledger.fail_add_for(&transactions[0].reference);

        let stats = import(&ledger, TA, "Everyday", 10, &transactions)
            .await
            .unwrap();
        assert_eq!(stats.imported, 2);
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test]
    async fn test_bad_amount_is_an_error() {
        let ledger = TestLedger::new();
        let mut transactions = newest_first(2);
        transactions[1].amount.amount = "1,000.00".to_string();

        let e = import(&ledger, TA, "Everyday", 10, &transactions)
            .await
            .unwrap_err();
        assert!(crate::error::is_malformed(&e), "{e}");
        assert!(e.to_string().contains("'1,000.00'"), "{e}");
        assert_eq!(ledger.transactions(TA).len(), 1);
    }

    #[test]
    fn test_transfer_flag() {
        let transfer = with_kind(source_transaction(1, 1, day(0), "-5.00"), "internal_transfer");
        let purchase = with_kind(source_transaction(2, 1, day(0), "-5.00"), "purchase");
        let shouting = with_kind(source_transaction(3, 1, day(0), "-5.00"), "INTERNAL_TRANSFER");
        assert!(to_new_transaction(&transfer).unwrap().is_transfer);
        assert!(!to_new_transaction(&purchase).unwrap().is_transfer);
        assert!(!to_new_transaction(&shouting).unwrap().is_transfer);
    }

    #[test]
    fn test_mapping() {
        let tx = source_transaction(9, 1, day(3), "2450.00");
        let new = to_new_transaction(&tx).unwrap();
        assert_eq!(new.payee, tx.description.original);
        assert_eq!(new.memo, tx.reference);
        assert_eq!(new.date, tx.transaction_date);
        assert_eq!(new.amount, Decimal::from_str("2450.00").unwrap());
    }

    #[tokio::test]
    async fn test_searches_use_exact_date_and_memo() {
        let ledger = TestLedger::new();
        let transactions = newest_first(1);
        // Same memo on a different date is not a match.
        ledger.insert_transaction(TA, day(1), &transactions[0].reference);
        let stats = import(&ledger, TA, "Everyday", 10, &transactions)
            .await
            .unwrap();
        assert_eq!(stats.imported, 1);
        let found = ledger
            .search_transactions_by_memo(TA, transactions[0].transaction_date, &transactions[0].reference)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }
}
