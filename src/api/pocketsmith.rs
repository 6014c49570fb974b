//! Implements the `Ledger` trait against the PocketSmith API.

use crate::api::{http, Ledger};
use crate::error::{ApiError, ApiResult};
use crate::model::destination::{BalanceUpdate, NewAccount, NewInstitution};
use crate::model::{Account, Institution, NewTransaction, Transaction, User};
use anyhow::Context;
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use rust_decimal::Decimal;
use tracing::trace;
use url::Url;

const DEVELOPER_KEY_HEADER: &str = "x-developer-key";

pub(crate) struct PocketSmithClient {
    base: Url,
    client: reqwest::Client,
}

impl PocketSmithClient {
    pub(crate) fn new(api_url: &str, developer_key: &str) -> crate::Result<Self> {
        let base =
            Url::parse(api_url).with_context(|| format!("Invalid PocketSmith URL '{api_url}'"))?;
        let mut key = HeaderValue::from_str(developer_key)
            .context("The PocketSmith token is not a valid header value")?;
        key.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(DEVELOPER_KEY_HEADER, key);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("Unable to build the PocketSmith HTTP client")?;
        Ok(Self { base, client })
    }

    fn url(&self, path: &str) -> crate::Result<Url> {
        self.base
            .join(path)
            .with_context(|| format!("Unable to build a PocketSmith URL for '{path}'"))
    }

    async fn accounts(&self, user_id: u64) -> ApiResult<Vec<Account>> {
        let url = self.url(&format!("users/{user_id}/accounts"))?;
        trace!("GET {url}");
        let response = self.client.get(url).send().await?;
        http::json(response, &format!("accounts of user {user_id}")).await
    }

    async fn institutions(&self, user_id: u64) -> ApiResult<Vec<Institution>> {
        let url = self.url(&format!("users/{user_id}/institutions"))?;
        trace!("GET {url}");
        let response = self.client.get(url).send().await?;
        http::json(response, &format!("institutions of user {user_id}")).await
    }
}

#[async_trait::async_trait]
impl Ledger for PocketSmithClient {
    async fn current_user(&self) -> ApiResult<User> {
        let url = self.url("me")?;
        trace!("GET {url}");
        let response = self.client.get(url).send().await?;
        http::json(response, "current user").await
    }

    async fn get_account(&self, account_id: u64) -> ApiResult<Account> {
        let url = self.url(&format!("accounts/{account_id}"))?;
        trace!("GET {url}");
        let response = self.client.get(url).send().await?;
        http::json(response, &format!("account {account_id}")).await
    }

    async fn find_account_by_name(&self, user_id: u64, name: &str) -> ApiResult<Account> {
        self.accounts(user_id)
            .await?
            .into_iter()
            .find(|a| a.title == name)
            .ok_or_else(|| ApiError::NotFound(format!("account '{name}'")))
    }

    async fn find_institution_by_name(&self, user_id: u64, name: &str) -> ApiResult<Institution> {
        self.institutions(user_id)
            .await?
            .into_iter()
            .find(|i| i.title == name)
            .ok_or_else(|| ApiError::NotFound(format!("institution '{name}'")))
    }

    async fn create_institution(
        &self,
        user_id: u64,
        name: &str,
        currency_code: &str,
    ) -> ApiResult<Institution> {
        let url = self.url(&format!("users/{user_id}/institutions"))?;
        trace!("POST {url}");
        let body = NewInstitution {
            title: name,
            currency_code,
        };
        let response = self.client.post(url).json(&body).send().await?;
        http::json(response, &format!("new institution '{name}'")).await
    }

    async fn create_account(
        &self,
        user_id: u64,
        institution_id: u64,
        name: &str,
        currency_code: &str,
        kind: &str,
    ) -> ApiResult<Account> {
        let url = self.url(&format!("users/{user_id}/accounts"))?;
        trace!("POST {url}");
        let body = NewAccount {
            institution_id,
            title: name,
            currency_code,
            kind,
        };
        let response = self.client.post(url).json(&body).send().await?;
        http::json(response, &format!("new account '{name}'")).await
    }

    async fn search_transactions_by_memo(
        &self,
        transaction_account_id: u64,
        date: NaiveDate,
        memo: &str,
    ) -> ApiResult<Vec<Transaction>> {
        let date_param = date.format("%Y-%m-%d").to_string();
        let mut url = self.url(&format!(
            "transaction_accounts/{transaction_account_id}/transactions"
        ))?;
        url.query_pairs_mut()
            .append_pair("start_date", &date_param)
            .append_pair("end_date", &date_param)
            .append_pair("search", memo);
        trace!("GET {url}");
        let response = self.client.get(url).send().await?;
        let found: Vec<Transaction> = http::json(
            response,
            &format!("transactions of transaction account {transaction_account_id}"),
        )
        .await?;
        // The search parameter is fuzzy, only exact matches count as duplicates.
        Ok(found
            .into_iter()
            .filter(|t| t.date == date && t.memo.as_deref().unwrap_or_default() == memo)
            .collect())
    }

    async fn add_transaction(
        &self,
        transaction_account_id: u64,
        transaction: &NewTransaction,
    ) -> ApiResult<Transaction> {
        let url = self.url(&format!(
            "transaction_accounts/{transaction_account_id}/transactions"
        ))?;
        trace!("POST {url}");
        let response = self.client.post(url).json(transaction).send().await?;
        http::json(
            response,
            &format!("new transaction in transaction account {transaction_account_id}"),
        )
        .await
    }

    async fn update_transaction_account_balance(
        &self,
        transaction_account_id: u64,
        institution_id: u64,
        balance: Decimal,
        as_of: NaiveDate,
    ) -> ApiResult<()> {
        let url = self.url(&format!("transaction_accounts/{transaction_account_id}"))?;
        trace!("PUT {url}");
        let body = BalanceUpdate {
            institution_id,
            starting_balance: balance,
            starting_balance_date: as_of,
        };
        let response = self.client.put(url).json(&body).send().await?;
        http::check(
            response,
            &format!("transaction account {transaction_account_id}"),
        )
        .await?;
        Ok(())
    }
}
