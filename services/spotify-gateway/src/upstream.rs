//! Web API calls made on behalf of the authorized user
//!
//! Only the two "top items" reads are exposed. The response body is handed
//! back verbatim; the gateway does not model Spotify's payloads.

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

use crate::metrics;

/// Number of items requested from the top-items endpoints.
pub const TOP_ITEMS_LIMIT: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopItems {
    Artists,
    Tracks,
}

impl TopItems {
    fn path(&self) -> &'static str {
        match self {
            TopItems::Artists => "/v1/me/top/artists",
            TopItems::Tracks => "/v1/me/top/tracks",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TopItems::Artists => "top_artists",
            TopItems::Tracks => "top_tracks",
        }
    }
}

#[derive(Error, Debug)]
pub enum UpstreamError {
    /// The API answered with a non-success status. `body` is verbatim.
    #[error("api returned {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("{0}")]
    Transport(String),
}

/// Authenticated client for the Web API.
#[derive(Debug, Clone)]
pub struct ResourceProxy {
    client: reqwest::Client,
    api_base_url: String,
    timeout: Duration,
}

impl ResourceProxy {
    pub fn new(client: reqwest::Client, api_base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// Fetch the user's top items, returning the raw JSON body on success.
    pub async fn fetch_top(&self, kind: TopItems, access_token: &str) -> Result<String, UpstreamError> {
        let url = format!(
            "{}{}?limit={TOP_ITEMS_LIMIT}",
            self.api_base_url,
            kind.path()
        );
        let start = Instant::now();

        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                let error_type = if e.is_timeout() { "timeout" } else { "connection" };
                metrics::record_upstream_error(kind.label(), error_type);
                warn!(resource = kind.label(), error = %e, "api request failed");
                if e.is_timeout() {
                    UpstreamError::Transport(format!(
                        "api request timed out after {}s",
                        self.timeout.as_secs()
                    ))
                } else {
                    UpstreamError::Transport(format!("api request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| UpstreamError::Transport(format!("reading api response: {e}")))?;
        let elapsed = start.elapsed().as_secs_f64();

        if !status.is_success() {
            metrics::record_upstream(kind.label(), "rejected", elapsed);
            warn!(resource = kind.label(), status = status.as_u16(), "api rejected request");
            return Err(UpstreamError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        metrics::record_upstream(kind.label(), "success", elapsed);
        debug!(resource = kind.label(), bytes = body.len(), "api request succeeded");
        Ok(body)
    }
}
