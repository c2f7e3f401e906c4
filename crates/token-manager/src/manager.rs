//! Token lifecycle manager
//!
//! Owns the single credential for a tenant and hands out access tokens that
//! are valid for at least the safety margin. Refresh is lazy: it happens on
//! the read that finds the token near expiry, not on a timer.
//!
//! The read-check-refresh-write sequence runs under a per-manager async mutex,
//! so concurrent readers near expiry produce one refresh call. Callers that
//! queued behind the lock re-read the credential and reuse the fresh token.
//! Exchanges and store writes run on a spawned task: a caller that gives up
//! mid-refresh does not cancel it, and the result is still persisted.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use spotify_auth::{Credential, CredentialStore, TokenExchangeClient};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::state::{CredentialState, expiry_from, needs_refresh};

/// Credential values returned by a successful authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizedCredential {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Access token values returned by a refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshedToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

/// What caused a refresh, for logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshTrigger {
    /// Explicit `force_refresh()` call; always hits the token endpoint.
    Forced,
    /// A read found the token inside the safety margin.
    NearExpiry,
}

impl RefreshTrigger {
    fn label(&self) -> &'static str {
        match self {
            RefreshTrigger::Forced => "forced",
            RefreshTrigger::NearExpiry => "near_expiry",
        }
    }
}

/// Lifecycle manager for one tenant's credential. Cheap to clone.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

struct Inner {
    tenant: String,
    store: Arc<CredentialStore>,
    exchange: TokenExchangeClient,
    safety_margin: Duration,
    /// Serializes writers: authorization and refresh.
    write_lock: Mutex<()>,
}

impl TokenManager {
    pub fn new(
        tenant: impl Into<String>,
        store: Arc<CredentialStore>,
        exchange: TokenExchangeClient,
        safety_margin: Duration,
    ) -> Self {
        let tenant = tenant.into();
        info!(
            tenant = %tenant,
            safety_margin_secs = safety_margin.num_seconds(),
            "token manager initialized"
        );
        Self {
            inner: Arc::new(Inner {
                tenant,
                store,
                exchange,
                safety_margin,
                write_lock: Mutex::new(()),
            }),
        }
    }

    pub fn tenant(&self) -> &str {
        &self.inner.tenant
    }

    /// Exchange an authorization code and store the resulting credential,
    /// replacing any previous one.
    ///
    /// On any failure the store is left as it was.
    pub async fn authorize(&self, code: &str, redirect_uri: &str) -> Result<AuthorizedCredential> {
        let inner = self.inner.clone();
        let code = code.to_owned();
        let redirect_uri = redirect_uri.to_owned();
        detached(async move { inner.authorize(&code, &redirect_uri).await }).await
    }

    /// Refresh the access token unconditionally.
    ///
    /// Fails with `NoCredential` if authorization never happened.
    pub async fn force_refresh(&self) -> Result<RefreshedToken> {
        let inner = self.inner.clone();
        detached(async move { inner.refresh(RefreshTrigger::Forced).await }).await
    }

    /// Return an access token valid for at least the safety margin,
    /// refreshing first if needed.
    pub async fn get_valid_access_token(&self) -> Result<String> {
        let tenant = &self.inner.tenant;
        let current = self
            .inner
            .store
            .get_current(tenant)
            .await
            .ok_or_else(|| Error::NoCredential(tenant.clone()))?;

        if !needs_refresh(current.expires_at, Utc::now(), self.inner.safety_margin) {
            return Ok(current.access_token);
        }

        debug!(tenant = %tenant, expires_at = %current.expires_at, "access token near expiry");
        let inner = self.inner.clone();
        let refreshed = detached(async move { inner.refresh(RefreshTrigger::NearExpiry).await }).await?;
        Ok(refreshed.access_token)
    }

    /// Current lifecycle state of the stored credential.
    pub async fn state(&self) -> CredentialState {
        let current = self.inner.store.get_current(&self.inner.tenant).await;
        CredentialState::classify(current.as_ref(), Utc::now(), self.inner.safety_margin)
    }
}

impl Inner {
    async fn authorize(&self, code: &str, redirect_uri: &str) -> Result<AuthorizedCredential> {
        let token = self
            .exchange
            .exchange_authorization_code(code, redirect_uri)
            .await?;
        let expires_at = expiry_from(Utc::now(), token.expires_in);

        let refresh_token = token.refresh_token.ok_or_else(|| Error::Exchange {
            status: 200,
            body: "authorization response did not include a refresh_token".into(),
        })?;

        let credential = Credential {
            access_token: token.access_token,
            refresh_token,
            expires_at,
        };

        let _guard = self.write_lock.lock().await;
        self.store
            .replace_all(&self.tenant, credential.clone())
            .await?;

        info!(tenant = %self.tenant, %expires_at, "authorization completed, credential stored");
        Ok(AuthorizedCredential {
            access_token: credential.access_token,
            refresh_token: credential.refresh_token,
            expires_at: credential.expires_at,
        })
    }

    async fn refresh(&self, trigger: RefreshTrigger) -> Result<RefreshedToken> {
        let _guard = self.write_lock.lock().await;

        let current = self
            .store
            .get_current(&self.tenant)
            .await
            .ok_or_else(|| Error::NoCredential(self.tenant.clone()))?;

        // Another caller may have refreshed while this one waited on the lock.
        if trigger == RefreshTrigger::NearExpiry
            && !needs_refresh(current.expires_at, Utc::now(), self.safety_margin)
        {
            debug!(tenant = %self.tenant, "token already refreshed by a concurrent caller");
            record_refresh(trigger, "coalesced");
            return Ok(RefreshedToken {
                access_token: current.access_token,
                expires_at: current.expires_at,
            });
        }

        let token = match self.exchange.exchange_refresh_token(&current.refresh_token).await {
            Ok(token) => token,
            Err(e) => {
                record_refresh(trigger, "failed");
                warn!(
                    tenant = %self.tenant,
                    trigger = trigger.label(),
                    error = %e,
                    "token refresh failed, stored credential unchanged"
                );
                return Err(e.into());
            }
        };
        let expires_at = expiry_from(Utc::now(), token.expires_in);
        let rotated = token.refresh_token.is_some();

        let updated = self
            .store
            .update_in_place(&self.tenant, token.access_token, expires_at, token.refresh_token)
            .await?;

        record_refresh(trigger, "success");
        info!(
            tenant = %self.tenant,
            trigger = trigger.label(),
            rotated,
            %expires_at,
            "token refresh succeeded"
        );
        Ok(RefreshedToken {
            access_token: updated.access_token,
            expires_at: updated.expires_at,
        })
    }
}

/// Run `task` on its own tokio task and wait for it.
///
/// Dropping the returned future does not cancel `task`.
async fn detached<T, F>(task: F) -> Result<T>
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(task)
        .await
        .map_err(|e| Error::Refresh(e.to_string()))?
}

fn record_refresh(trigger: RefreshTrigger, outcome: &'static str) {
    metrics::counter!(
        "spotify_token_refreshes_total",
        "trigger" => trigger.label(),
        "outcome" => outcome
    )
    .increment(1);
}
