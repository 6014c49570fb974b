//! Implements the `Ledger` trait using in-memory data for testing purposes.
//!
//! Note: this is compiled even in the "production" version of this app so that we can run the whole
//! app, top-to-bottom, without writing to PocketSmith.

use crate::api::Ledger;
use crate::error::{ApiError, ApiResult};
use crate::model::destination::ACCOUNT_KIND_BANK;
use crate::model::{Account, Institution, NewTransaction, Transaction, TransactionAccount, User};
use anyhow::anyhow;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

pub const TEST_USER_ID: u64 = 1;

/// A balance update that was pushed to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceUpdateCall {
    pub transaction_account_id: u64,
    pub institution_id: u64,
    pub balance: Decimal,
    pub as_of: NaiveDate,
}

/// An in-memory personal finance ledger. Failures can be injected per memo so that the
/// log-and-continue paths of the sync engine can be exercised.
#[derive(Debug, Default)]
pub struct TestLedger {
    state: Mutex<LedgerState>,
}

#[derive(Debug, Default)]
struct LedgerState {
    next_id: u64,
    institutions: Vec<Institution>,
    accounts: BTreeMap<u64, Account>,
    /// Transactions keyed by transaction account id.
    transactions: BTreeMap<u64, Vec<Transaction>>,
    balance_updates: Vec<BalanceUpdateCall>,
    searches: usize,
    fail_search: HashSet<String>,
    fail_add: HashSet<String>,
    fail_account_lookup: bool,
    fail_balance_update: bool,
}

impl LedgerState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

impl TestLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Creates an institution directly, bypassing the `Ledger` trait.
    pub fn insert_institution(&self, title: &str, currency_code: &str) -> Institution {
        let mut state = self.state();
        let institution = Institution {
            id: state.next_id(),
            title: title.to_string(),
            currency_code: currency_code.to_string(),
        };
        state.institutions.push(institution.clone());
        institution
    }

    /// Creates an account directly, bypassing the `Ledger` trait.
    pub fn insert_account(&self, institution: &Institution, title: &str, balance: Decimal) -> Account {
        let mut state = self.state();
        let account = Account {
            id: state.next_id(),
            title: title.to_string(),
            currency_code: institution.currency_code.clone(),
            kind: ACCOUNT_KIND_BANK.to_string(),
            current_balance: Some(balance),
            primary_transaction_account: TransactionAccount {
                id: state.next_id(),
                name: title.to_string(),
                currency_code: institution.currency_code.clone(),
                current_balance: Some(balance),
                institution: institution.clone(),
            },
        };
        state.accounts.insert(account.id, account.clone());
        account
    }

    /// Stores a transaction directly, bypassing the `Ledger` trait.
    pub fn insert_transaction(&self, transaction_account_id: u64, date: NaiveDate, memo: &str) {
        let mut state = self.state();
        let id = state.next_id();
        state
            .transactions
            .entry(transaction_account_id)
            .or_default()
            .push(Transaction {
                id,
                payee: String::new(),
                amount: Decimal::ZERO,
                date,
                is_transfer: false,
                memo: Some(memo.to_string()),
            });
    }

    pub fn remove_account(&self, account_id: u64) {
        self.state().accounts.remove(&account_id);
    }

    pub fn institutions(&self) -> Vec<Institution> {
        self.state().institutions.clone()
    }

    pub fn accounts(&self) -> Vec<Account> {
        self.state().accounts.values().cloned().collect()
    }

    pub fn transactions(&self, transaction_account_id: u64) -> Vec<Transaction> {
        self.state()
            .transactions
            .get(&transaction_account_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn balance_updates(&self) -> Vec<BalanceUpdateCall> {
        self.state().balance_updates.clone()
    }

    /// The number of duplicate probes made so far.
    pub fn searches(&self) -> usize {
        self.state().searches
    }

    pub fn fail_search_for(&self, memo: &str) {
        self.state().fail_search.insert(memo.to_string());
    }

    pub fn fail_add_for(&self, memo: &str) {
        self.state().fail_add.insert(memo.to_string());
    }

    pub fn fail_account_lookup(&self) {
        self.state().fail_account_lookup = true;
    }

    pub fn fail_balance_update(&self) {
        self.state().fail_balance_update = true;
    }
}

#[async_trait::async_trait]
impl Ledger for TestLedger {
    async fn current_user(&self) -> ApiResult<User> {
        Ok(User {
            id: TEST_USER_ID,
            login: "test".to_string(),
        })
    }

    async fn get_account(&self, account_id: u64) -> ApiResult<Account> {
        let state = self.state();
        if state.fail_account_lookup {
            return Err(ApiError::Other(anyhow!("test account lookup failure")));
        }
        state
            .accounts
            .get(&account_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("account {account_id}")))
    }

    async fn find_account_by_name(&self, _user_id: u64, name: &str) -> ApiResult<Account> {
        let state = self.state();
        if state.fail_account_lookup {
            return Err(ApiError::Other(anyhow!("test account lookup failure")));
        }
        state
            .accounts
            .values()
            .find(|a| a.title == name)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("account '{name}'")))
    }

    async fn find_institution_by_name(&self, _user_id: u64, name: &str) -> ApiResult<Institution> {
        self.state()
            .institutions
            .iter()
            .find(|i| i.title == name)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("institution '{name}'")))
    }

    async fn create_institution(
        &self,
        _user_id: u64,
        name: &str,
        currency_code: &str,
    ) -> ApiResult<Institution> {
        Ok(self.insert_institution(name, currency_code))
    }

    async fn create_account(
        &self,
        _user_id: u64,
        institution_id: u64,
        name: &str,
        currency_code: &str,
        kind: &str,
    ) -> ApiResult<Account> {
        let institution = self
            .state()
            .institutions
            .iter()
            .find(|i| i.id == institution_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("institution {institution_id}")))?;
        let mut account = self.insert_account(&institution, name, Decimal::ZERO);
        account.currency_code = currency_code.to_string();
        account.kind = kind.to_string();
        self.state().accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn search_transactions_by_memo(
        &self,
        transaction_account_id: u64,
        date: NaiveDate,
        memo: &str,
    ) -> ApiResult<Vec<Transaction>> {
        let mut state = self.state();
        state.searches += 1;
        if state.fail_search.contains(memo) {
            return Err(ApiError::Other(anyhow!("test search failure for {memo}")));
        }
        Ok(state
            .transactions
            .get(&transaction_account_id)
            .map(|txs| {
                txs.iter()
                    .filter(|t| t.date == date && t.memo.as_deref() == Some(memo))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn add_transaction(
        &self,
        transaction_account_id: u64,
        transaction: &NewTransaction,
    ) -> ApiResult<Transaction> {
        let mut state = self.state();
        if state.fail_add.contains(&transaction.memo) {
            return Err(ApiError::Other(anyhow!(
                "test add failure for {}",
                transaction.memo
            )));
        }
        let created = Transaction {
            id: state.next_id(),
            payee: transaction.payee.clone(),
            amount: transaction.amount,
            date: transaction.date,
            is_transfer: transaction.is_transfer,
            memo: Some(transaction.memo.clone()),
        };
        state
            .transactions
            .entry(transaction_account_id)
            .or_default()
            .push(created.clone());
        Ok(created)
    }

    async fn update_transaction_account_balance(
        &self,
        transaction_account_id: u64,
        institution_id: u64,
        balance: Decimal,
        as_of: NaiveDate,
    ) -> ApiResult<()> {
        let mut state = self.state();
        if state.fail_balance_update {
            return Err(ApiError::Other(anyhow!("test balance update failure")));
        }
        state.balance_updates.push(BalanceUpdateCall {
            transaction_account_id,
            institution_id,
            balance,
            as_of,
        });
        for account in state.accounts.values_mut() {
            if account.primary_transaction_account.id == transaction_account_id {
                account.current_balance = Some(balance);
                account.primary_transaction_account.current_balance = Some(balance);
            }
        }
        Ok(())
    }
}
