//! Pages backwards through an account's history using date windows instead of cursors.

use crate::api::Aggregator;
use crate::model::SourceTransaction;
use crate::Result;
use anyhow::{ensure, Context};
use chrono::{Months, NaiveDate};
use tracing::{debug, trace};

/// The width of each query window and how far the window end moves back after each non-empty
/// window. A step smaller than the width makes consecutive windows overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPlan {
    width_months: u32,
    step_months: u32,
}

impl Default for WindowPlan {
    fn default() -> Self {
        Self {
            width_months: 12,
            step_months: 6,
        }
    }
}

impl WindowPlan {
    pub fn new(width_months: u32, step_months: u32) -> Result<Self> {
        ensure!(step_months >= 1, "The window step must be at least one month");
        ensure!(
            step_months <= width_months,
            "A window step of {step_months} months is larger than the {width_months} month \
            window, history would have gaps"
        );
        Ok(Self {
            width_months,
            step_months,
        })
    }

    pub fn width_months(&self) -> u32 {
        self.width_months
    }

    pub fn step_months(&self) -> u32 {
        self.step_months
    }
}

/// Collects the history of `account_id` by querying `[end - width, end]`, starting with
/// `end = today` and moving `end` back by the step until a window comes back empty.
///
/// When `stop_at` is given, fetching also ends after the first window whose start is on or before
/// that date.
///
/// The result is an unordered accumulation. Windows overlap, so a transaction may appear more
/// than once.
pub(crate) async fn fetch_history(
    aggregator: &dyn Aggregator,
    account_id: u64,
    plan: WindowPlan,
    today: NaiveDate,
    stop_at: Option<NaiveDate>,
) -> Result<Vec<SourceTransaction>> {
    let mut all = Vec::new();
    let mut end = today;
    loop {
        let start = months_before(end, plan.width_months)?;
        trace!("Querying account {account_id} from {start} to {end}");
        let found = aggregator
            .fetch_transactions(account_id, start, end)
            .await
            .with_context(|| {
                format!("Unable to fetch transactions for account {account_id} from {start} to {end}")
            })?;
        if found.is_empty() {
            debug!("Account {account_id} has nothing from {start} to {end}, history is complete");
            break;
        }
        debug!(
            "Account {account_id} has {} transactions from {start} to {end}",
            found.len()
        );
        all.extend(found);
        if let Some(stop) = stop_at {
            if start <= stop {
                debug!("Reached the watermark {stop} for account {account_id}");
                break;
            }
        }
        end = months_before(end, plan.step_months)?;
    }
    Ok(all)
}

fn months_before(date: NaiveDate, months: u32) -> Result<NaiveDate> {
    date.checked_sub_months(Months::new(months))
        .with_context(|| format!("Cannot go back {months} months from {date}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{source_account, TestAggregator};
    use crate::model::AccountType;
    use crate::test::source_transaction;
    use chrono::Datelike;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// One transaction on the 15th of every month for `months` months before `today`.
    fn monthly(months: u32, today: NaiveDate) -> TestAggregator {
        let aggregator = TestAggregator::new();
        aggregator.add_account(source_account(
            7,
            "Everyday",
            "Example Bank",
            AccountType::BankAccount,
            "0",
        ));
        for i in 0..months {
            let d = today
                .checked_sub_months(Months::new(i))
                .unwrap()
                .with_day(15)
                .unwrap();
            aggregator.add_transaction(source_transaction(u64::from(i) + 1, 7, d, "-1.00"));
        }
        aggregator
    }

    #[test]
    fn test_window_plan_validation() {
        assert!(WindowPlan::new(12, 6).is_ok());
        assert!(WindowPlan::new(12, 12).is_ok());
        assert!(WindowPlan::new(6, 12).is_err());
        assert!(WindowPlan::new(12, 0).is_err());
        assert_eq!(WindowPlan::default(), WindowPlan::new(12, 6).unwrap());
    }

    #[tokio::test]
    async fn test_empty_first_window() {
        let aggregator = TestAggregator::new();
        let today = date(2026, 5, 1);
        let found = fetch_history(&aggregator, 7, WindowPlan::default(), today, None)
            .await
            .unwrap();
        assert!(found.is_empty());
        assert_eq!(aggregator.windows(), vec![(7, date(2025, 5, 1), today)]);
    }

    #[tokio::test]
    async fn test_three_years_without_gaps() {
        let today = date(2026, 5, 20);
        let aggregator = monthly(40, today);
        let found = fetch_history(&aggregator, 7, WindowPlan::default(), today, None)
            .await
            .unwrap();

        let mut ids: Vec<u64> = found.iter().map(|t| t.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids, (1..=40).collect::<Vec<u64>>());

        let windows = aggregator.windows();
        // The first window ends today and each window starts no later than the previous one ends.
        assert_eq!(windows[0].2, today);
        for pair in windows.windows(2) {
            assert!(pair[1].2 >= pair[0].1, "gap between {pair:?}");
            assert!(pair[1].2 < pair[0].2);
        }
        // The last window is the empty one that ends the walk.
        let (_, last_from, last_to) = *windows.last().unwrap();
        assert!(found
            .iter()
            .all(|t| t.transaction_date < last_from || t.transaction_date > last_to));
    }

    #[tokio::test]
    async fn test_overlap_returns_duplicates() {
        let today = date(2026, 5, 20);
        let aggregator = monthly(9, today);
        let found = fetch_history(&aggregator, 7, WindowPlan::default(), today, None)
            .await
            .unwrap();
        // September to November 2025 fall in both of the first two windows.
        assert_eq!(found.len(), 12);
        assert_eq!(aggregator.windows().len(), 3);
    }

    #[tokio::test]
    async fn test_stop_at_watermark() {
        let today = date(2026, 5, 20);
        let aggregator = monthly(40, today);
        let found = fetch_history(
            &aggregator,
            7,
            WindowPlan::default(),
            today,
            Some(date(2026, 1, 1)),
        )
        .await
        .unwrap();
        assert_eq!(aggregator.windows().len(), 1);
        assert_eq!(found.len(), 12);
    }

    #[tokio::test]
    async fn test_unauthorized_propagates() {
        let aggregator = TestAggregator::new();
        aggregator.set_unauthorized(true);
        let e = fetch_history(&aggregator, 7, WindowPlan::default(), date(2026, 1, 1), None)
            .await
            .unwrap_err();
        assert!(crate::error::is_unauthorized(&e));
    }
}
