//! OAuth token exchange
//!
//! Handles the two token endpoint interactions:
//! 1. Authorization code exchange (user just approved the app)
//! 2. Refresh token exchange (access token near expiry)
//!
//! Both POST a form body to the token endpoint with HTTP Basic client
//! authentication. This layer maps one request to one response: no retries,
//! no state.

use std::time::Duration;

use common::Secret;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Default per-request timeout for token endpoint calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// OAuth grant sent as `grant_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant {
    AuthorizationCode,
    RefreshToken,
}

impl Grant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Grant::AuthorizationCode => "authorization_code",
            Grant::RefreshToken => "refresh_token",
        }
    }
}

/// Response from the token endpoint for both grants.
///
/// `expires_in` is a delta in seconds from the response time. `refresh_token`
/// is always present for `authorization_code` and usually absent on refresh.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub expires_in: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Registered application credentials used for HTTP Basic auth.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: Secret<String>,
}

/// Client for the authorization server's token endpoint.
#[derive(Debug, Clone)]
pub struct TokenExchangeClient {
    http: reqwest::Client,
    token_endpoint: String,
    credentials: ClientCredentials,
    timeout: Duration,
}

impl TokenExchangeClient {
    pub fn new(
        http: reqwest::Client,
        token_endpoint: impl Into<String>,
        credentials: ClientCredentials,
    ) -> Self {
        Self {
            http,
            token_endpoint: token_endpoint.into(),
            credentials,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Exchange an authorization code for an access/refresh token pair.
    ///
    /// An empty code is rejected before anything is sent.
    pub async fn exchange_authorization_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse> {
        let code = code.trim();
        if code.is_empty() {
            return Err(Error::InvalidRequest("Code is required".into()));
        }

        self.request(
            Grant::AuthorizationCode,
            &[
                ("grant_type", Grant::AuthorizationCode.as_str()),
                ("code", code),
                ("redirect_uri", redirect_uri),
            ],
        )
        .await
    }

    /// Mint a new access token from a refresh token.
    pub async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<TokenResponse> {
        if refresh_token.is_empty() {
            return Err(Error::InvalidRequest("refresh token is empty".into()));
        }

        self.request(
            Grant::RefreshToken,
            &[
                ("grant_type", Grant::RefreshToken.as_str()),
                ("refresh_token", refresh_token),
            ],
        )
        .await
    }

    async fn request(&self, grant: Grant, form: &[(&str, &str)]) -> Result<TokenResponse> {
        debug!(grant = grant.as_str(), endpoint = %self.token_endpoint, "calling token endpoint");

        let response = self
            .http
            .post(&self.token_endpoint)
            .basic_auth(
                &self.credentials.client_id,
                Some(self.credentials.client_secret.expose()),
            )
            .form(form)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                record_exchange(grant, "transport_error");
                if e.is_timeout() {
                    Error::Transport(format!(
                        "token endpoint timed out after {}s",
                        self.timeout.as_secs()
                    ))
                } else {
                    Error::Transport(format!("token endpoint request failed: {e}"))
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            record_exchange(grant, "rejected");
            warn!(grant = grant.as_str(), status = status.as_u16(), "token endpoint rejected request");
            return Err(Error::Exchange {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await.map_err(|e| {
            record_exchange(grant, "transport_error");
            Error::Transport(format!("reading token response: {e}"))
        })?;

        let token = match serde_json::from_str::<TokenResponse>(&body) {
            Ok(token) => token,
            Err(e) => {
                record_exchange(grant, "invalid_response");
                warn!(grant = grant.as_str(), error = %e, "unparseable token response");
                return Err(Error::Exchange {
                    status: status.as_u16(),
                    body,
                });
            }
        };

        record_exchange(grant, "success");
        debug!(
            grant = grant.as_str(),
            expires_in = token.expires_in,
            rotated_refresh_token = token.refresh_token.is_some(),
            "token endpoint call succeeded"
        );
        Ok(token)
    }
}

fn record_exchange(grant: Grant, outcome: &'static str) {
    metrics::counter!(
        "spotify_token_exchanges_total",
        "grant" => grant.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}
