//! Password-grant login against the Frollo identity service.
//!
//! Frollo's mobile apps exchange a username and password for a bearer token using a fixed client
//! id. The token is held in memory for the duration of the run and is never written to disk.

use crate::error::{ApiError, ApiResult};
use anyhow::{anyhow, Context};
use oauth2::basic::BasicClient;
use oauth2::{
    AccessToken, AuthType, ClientId, RequestTokenError, ResourceOwnerPassword,
    ResourceOwnerUsername, Scope, TokenResponse, TokenUrl,
};
use tracing::debug;

/// The public client id used by Frollo's own apps.
pub(crate) const CLIENT_ID: &str = "UCyPI63qO8fVsjnxNcEuVbHDOWSr8tQiDTrFsrb93o0";

/// The identity service requires the API audience as an extra parameter.
const AUDIENCE_DOMAIN: &str = "api.frollo.us";

const OAUTH_SCOPES: &[&str] = &["offline_access", "email", "openid"];

/// Exchanges `username` and `password` for an access token.
///
/// # Errors
/// - `ApiError::Unauthorized` if the identity service rejects the credentials.
/// - `ApiError::Other` for transport or parsing failures.
pub(crate) async fn login(token_url: &str, username: &str, password: &str) -> ApiResult<AccessToken> {
    let token_url = TokenUrl::new(token_url.to_string())
        .with_context(|| format!("Invalid Frollo token URL '{token_url}'"))?;
    let client = BasicClient::new(ClientId::new(CLIENT_ID.to_string()))
        .set_auth_type(AuthType::RequestBody)
        .set_token_uri(token_url);

    // The oauth2 crate recommends disabling redirects to avoid SSRF.
    let http = reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .context("Unable to build the HTTP client for login")?;

    debug!("Requesting a Frollo access token for {username}");
    let response = client
        .exchange_password(
            &ResourceOwnerUsername::new(username.to_string()),
            &ResourceOwnerPassword::new(password.to_string()),
        )
        .add_scopes(OAUTH_SCOPES.iter().map(|s| Scope::new(s.to_string())))
        .add_extra_param("domain", AUDIENCE_DOMAIN)
        .request_async(&http)
        .await
        .map_err(|e| match e {
            RequestTokenError::ServerResponse(response) => ApiError::Unauthorized(format!(
                "Frollo rejected the login for {username}: {response}"
            )),
            other => ApiError::Other(anyhow!("Frollo login failed: {other}")),
        })?;

    debug!("Frollo access token received");
    Ok(response.access_token().clone())
}
