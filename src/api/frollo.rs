//! Implements the `Aggregator` trait against the Frollo aggregation API.

use crate::api::{http, oauth, Aggregator};
use crate::error::ApiResult;
use crate::model::source::TransactionPage;
use crate::model::{SourceAccount, SourceTransaction};
use anyhow::Context;
use chrono::NaiveDate;
use oauth2::AccessToken;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use tracing::{trace, warn};
use url::Url;

/// Frollo only serves clients that identify themselves like its own Android app.
const CLIENT_HEADERS: &[(&str, &str)] = &[
    ("x-api-version", "2.26"),
    ("x-bundle-id", "us.frollo.frollosdk"),
    ("x-device-version", "Android12"),
    ("x-software-version", "SDK3.28.0-B3270|APP2.26.0-B104594"),
];

const CLIENT_USER_AGENT: &str = "okhttp/4.12.0";

/// A logged-in Frollo client. The bearer token lives only in this struct.
pub(crate) struct FrolloClient {
    base: Url,
    page_size: u32,
    client: reqwest::Client,
}

impl FrolloClient {
    /// Logs in with `username` and `password` and returns a client that sends the resulting
    /// bearer token with every request.
    pub(crate) async fn login(
        api_url: &str,
        token_url: &str,
        username: &str,
        password: &str,
        page_size: u32,
    ) -> ApiResult<Self> {
        let token = oauth::login(token_url, username, password).await?;
        Ok(Self::new(api_url, &token, page_size)?)
    }

    fn new(api_url: &str, token: &AccessToken, page_size: u32) -> crate::Result<Self> {
        let base = Url::parse(api_url).with_context(|| format!("Invalid Frollo URL '{api_url}'"))?;
        let client = reqwest::Client::builder()
            .default_headers(default_headers(token)?)
            .build()
            .context("Unable to build the Frollo HTTP client")?;
        Ok(Self {
            base,
            page_size,
            client,
        })
    }

    fn url(&self, path: &str) -> crate::Result<Url> {
        self.base
            .join(path)
            .with_context(|| format!("Unable to build a Frollo URL for '{path}'"))
    }
}

#[async_trait::async_trait]
impl Aggregator for FrolloClient {
    async fn list_accounts(&self) -> ApiResult<Vec<SourceAccount>> {
        let url = self.url("aggregation/accounts")?;
        trace!("GET {url}");
        let response = self.client.get(url).send().await?;
        http::json(response, "accounts").await
    }

    async fn fetch_account(&self, account_id: u64) -> ApiResult<SourceAccount> {
        let url = self.url(&format!("aggregation/accounts/{account_id}"))?;
        trace!("GET {url}");
        let response = self.client.get(url).send().await?;
        http::json(response, &format!("account {account_id}")).await
    }

    async fn fetch_transactions(
        &self,
        account_id: u64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> ApiResult<Vec<SourceTransaction>> {
        let mut url = self.url("aggregation/transactions")?;
        url.query_pairs_mut()
            .append_pair("account_ids", &account_id.to_string())
            .append_pair("size", &self.page_size.to_string())
            .append_pair("from_date", &from.format("%Y-%m-%d").to_string())
            .append_pair("to_date", &to.format("%Y-%m-%d").to_string());
        trace!("GET {url}");
        let response = self.client.get(url).send().await?;
        let page: TransactionPage =
            http::json(response, &format!("transactions of account {account_id}")).await?;
        if page.data.len() >= self.page_size as usize {
            warn!(
                "Account {account_id} returned a full page of {} transactions for {from} -> {to}, \
                older transactions in this window may be missing",
                page.data.len()
            );
        }
        Ok(page.data)
    }

    async fn trigger_refresh(&self) -> ApiResult<serde_json::Value> {
        let url = self.url("aggregation/provideraccounts/sync")?;
        trace!("POST {url}");
        let response = self.client.post(url).send().await?;
        http::json(response, "provider account sync").await
    }
}

fn default_headers(token: &AccessToken) -> crate::Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let mut bearer = HeaderValue::from_str(&format!("Bearer {}", token.secret()))
        .context("The Frollo access token is not a valid header value")?;
    bearer.set_sensitive(true);
    headers.insert(AUTHORIZATION, bearer);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
    for &(name, value) in CLIENT_HEADERS {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
    Ok(headers)
}
