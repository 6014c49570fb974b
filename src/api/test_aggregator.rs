//! Implements the `Aggregator` trait using in-memory data for testing purposes.
//!
//! Note: this is compiled even in the "production" version of this app so that we can run the whole
//! app, top-to-bottom, without talking to Frollo.

use crate::api::Aggregator;
use crate::error::{ApiError, ApiResult};
use crate::model::source::{AccountAttributes, Description, Provider};
use crate::model::{AccountStatus, AccountType, Balance, SourceAccount, SourceTransaction};
use crate::Result;
use anyhow::Context;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// An in-memory aggregation service. It records every window it is asked for so that tests can
/// make assertions about how history was paged.
#[derive(Debug, Default)]
pub struct TestAggregator {
    state: Mutex<AggregatorState>,
    refreshes: AtomicUsize,
}

#[derive(Debug, Default)]
struct AggregatorState {
    accounts: BTreeMap<u64, SourceAccount>,
    transactions: Vec<SourceTransaction>,
    windows: Vec<(u64, NaiveDate, NaiveDate)>,
    unauthorized: bool,
}

impl TestAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an aggregator seeded with the demo accounts and transactions in this module.
    pub fn seeded() -> Result<Self> {
        let aggregator = Self::new();
        for account in seed_accounts() {
            aggregator.add_account(account);
        }
        for tx in load_csv(TRANSACTION_DATA)? {
            aggregator.add_transaction(tx);
        }
        Ok(aggregator)
    }

    fn state(&self) -> MutexGuard<'_, AggregatorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_account(&self, account: SourceAccount) {
        self.state().accounts.insert(account.id, account);
    }

    pub fn add_transaction(&self, transaction: SourceTransaction) {
        self.state().transactions.push(transaction);
    }

    /// Makes every subsequent call fail as if the bearer token had expired.
    pub fn set_unauthorized(&self, unauthorized: bool) {
        self.state().unauthorized = unauthorized;
    }

    /// The `(account_id, from, to)` of every transaction query, in call order.
    pub fn windows(&self) -> Vec<(u64, NaiveDate, NaiveDate)> {
        self.state().windows.clone()
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    fn check_auth(&self) -> ApiResult<()> {
        if self.state().unauthorized {
            return Err(ApiError::Unauthorized("test token expired".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Aggregator for TestAggregator {
    async fn list_accounts(&self) -> ApiResult<Vec<SourceAccount>> {
        self.check_auth()?;
        Ok(self.state().accounts.values().cloned().collect())
    }

    async fn fetch_account(&self, account_id: u64) -> ApiResult<SourceAccount> {
        self.check_auth()?;
        self.state()
            .accounts
            .get(&account_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("account {account_id}")))
    }

    async fn fetch_transactions(
        &self,
        account_id: u64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> ApiResult<Vec<SourceTransaction>> {
        self.check_auth()?;
        let mut state = self.state();
        state.windows.push((account_id, from, to));
        // Reverse the storage order so callers cannot rely on any particular ordering.
        Ok(state
            .transactions
            .iter()
            .rev()
            .filter(|t| {
                t.account_id == account_id && t.transaction_date >= from && t.transaction_date <= to
            })
            .cloned()
            .collect())
    }

    async fn trigger_refresh(&self) -> ApiResult<serde_json::Value> {
        self.check_auth()?;
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(serde_json::json!({ "status": "ok" }))
    }
}

/// Builds a source account. Shared with the test fixtures.
pub(crate) fn source_account(
    id: u64,
    name: &str,
    provider: &str,
    account_type: AccountType,
    balance: &str,
) -> SourceAccount {
    SourceAccount {
        id,
        account_name: name.to_string(),
        account_status: AccountStatus::Active,
        account_attributes: AccountAttributes {
            account_type,
            ..Default::default()
        },
        provider: Provider {
            id: 1,
            name: provider.to_string(),
        },
        primary_balance: Balance::new(balance, "AUD"),
        current_balance: Balance::new(balance, "AUD"),
    }
}

fn seed_accounts() -> Vec<SourceAccount> {
    vec![
        source_account(1657651, "Everyday", "Example Bank", AccountType::BankAccount, "500.00"),
        source_account(1657652, "Rainy Day", "Example Bank", AccountType::Savings, "2500.00"),
        source_account(1657653, "Visa", "Example Bank", AccountType::CreditCard, "-310.40"),
    ]
}

/// Loads seed transactions from a CSV-formatted string.
fn load_csv(csv_data: &str) -> Result<Vec<SourceTransaction>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(Cursor::new(csv_data.as_bytes()));

    let mut transactions = Vec::new();
    for (ix, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("Bad seed transaction row {}", ix + 1))?;
        let field = |i: usize| record.get(i).unwrap_or_default().to_string();
        let transaction_date = NaiveDate::parse_from_str(&field(2), "%Y-%m-%d")
            .with_context(|| format!("Bad date in seed transaction row {}", ix + 1))?;
        transactions.push(SourceTransaction {
            id: field(0).parse().context("Bad seed transaction id")?,
            account_id: field(1).parse().context("Bad seed account id")?,
            transaction_date,
            post_date: Some(transaction_date),
            amount: Balance::new(field(3), "AUD"),
            description: Description {
                original: field(4),
                simple: field(4),
            },
            reference: field(5),
            kind: field(6),
            status: "posted".to_string(),
        });
    }
    Ok(transactions)
}

/// Seed transaction data.
const TRANSACTION_DATA: &str = r##"id,account_id,date,amount,description,reference,type
1001,1657651,2024-03-02,-54.20,WOOLWORTHS 1234 SYDNEY,REF-1001,purchase
1002,1657651,2024-06-14,-18.00,OPAL TRAVEL,REF-1002,purchase
1003,1657651,2024-09-30,2450.00,SALARY ACME PTY LTD,REF-1003,deposit
1004,1657651,2024-12-24,-300.00,TRANSFER TO RAINY DAY,REF-1004,internal_transfer
1005,1657651,2025-02-11,-64.95,COLES 0456 SYDNEY,REF-1005,purchase
1006,1657651,2025-05-03,-12.50,CAFE 123 SYDNEY,REF-1006,purchase
1007,1657651,2025-08-19,2450.00,SALARY ACME PTY LTD,REF-1007,deposit
1008,1657651,2025-11-01,-89.99,TELSTRA BILL,REF-1008,direct_debit
1009,1657651,2026-01-15,-42.10,BP NORTH SYDNEY,REF-1009,purchase
1010,1657651,2026-04-08,-250.00,TRANSFER TO RAINY DAY,REF-1010,internal_transfer
2001,1657652,2024-12-24,300.00,TRANSFER FROM EVERYDAY,REF-2001,internal_transfer
2002,1657652,2025-06-30,12.34,INTEREST,REF-2002,interest
2003,1657652,2026-04-08,250.00,TRANSFER FROM EVERYDAY,REF-2003,internal_transfer
3001,1657653,2025-10-10,-310.40,JB HI-FI,REF-3001,purchase
"##;
