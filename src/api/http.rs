//! Response handling shared by the Frollo and PocketSmith clients.

use crate::error::{ApiError, ApiResult};
use anyhow::{anyhow, Context};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::trace;

/// Maps the status of `response` onto an `ApiError`. `what` names the thing being requested so
/// that a 404 reads as e.g. "account 42 not found".
pub(super) async fn check(response: Response, what: &str) -> ApiResult<Response> {
    let status = response.status();
    trace!("{what}: HTTP {status}");
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read response body".to_string());
    Err(match status {
        StatusCode::NOT_FOUND => ApiError::NotFound(what.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ApiError::Unauthorized(format!("{what}: HTTP {status}: {body}"))
        }
        _ => ApiError::Other(anyhow!("Request for {what} failed with HTTP {status}: {body}")),
    })
}

/// Checks the status of `response` and deserializes its JSON body.
pub(super) async fn json<T>(response: Response, what: &str) -> ApiResult<T>
where
    T: DeserializeOwned,
{
    let response = check(response, what).await?;
    let bytes = response
        .bytes()
        .await
        .with_context(|| format!("Unable to read the response body for {what}"))?;
    let value = serde_json::from_slice(&bytes)
        .with_context(|| format!("Unable to parse the response body for {what}"))?;
    Ok(value)
}
