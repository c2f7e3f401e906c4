//! Spotify Token Gateway
//!
//! Single-binary service that:
//! 1. Exchanges an authorization code for tokens and stores them on disk
//! 2. Refreshes the access token when it nears expiry
//! 3. Calls the Web API with a valid token on the caller's behalf
//! 4. Exposes health and Prometheus metrics

mod config;
mod error;
mod metrics;
mod routes;
mod upstream;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{MatchedPath, Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use spotify_auth::{ClientCredentials, CredentialStore, TokenExchangeClient};
use token_manager::TokenManager;
use tokio::net::TcpListener;
use tracing::{Instrument, error, info, info_span, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::routes::SpotifyState;
use crate::upstream::ResourceProxy;

/// Upper bound on how long in-flight requests may drain after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// State for the operational endpoints
#[derive(Clone)]
struct AppState {
    manager: TokenManager,
    started_at: Instant,
    prometheus: PrometheusHandle,
}

/// Build the full router: operational endpoints plus `/spotify/*`.
///
/// Every request passes through `track_requests` and the concurrency limit.
fn build_router(state: AppState, spotify: SpotifyState, max_connections: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .merge(routes::router(spotify))
        .layer(middleware::from_fn(track_requests))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting spotify-gateway");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder()?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(
        path = %config_path.path.display(),
        explicit = config_path.explicit,
        "loading configuration"
    );

    let config = Config::load(&config_path)
        .with_context(|| {
            format!(
                "failed to load config from {}",
                config_path.path.display()
            )
        })?;

    info!(
        listen_addr = %config.server.listen_addr,
        token_endpoint = %config.spotify.token_endpoint,
        api_base_url = %config.spotify.api_base_url,
        credentials_path = %config.credentials.path.display(),
        tenant = %config.credentials.tenant,
        "configuration loaded"
    );

    let store = CredentialStore::load(config.credentials.path.clone())
        .await
        .with_context(|| {
            format!(
                "failed to open credential store at {}",
                config.credentials.path.display()
            )
        })?;
    info!(path = %store.path().display(), "credential store ready");

    let http = reqwest::Client::builder()
        .build()
        .context("failed to build HTTP client")?;

    let exchange = TokenExchangeClient::new(
        http.clone(),
        config.spotify.token_endpoint.clone(),
        ClientCredentials {
            client_id: config.spotify.client_id.clone(),
            client_secret: config.spotify.client_secret.clone(),
        },
    )
    .with_timeout(config.server.timeout());

    let manager = TokenManager::new(
        config.credentials.tenant.clone(),
        Arc::new(store),
        exchange,
        config.credentials.safety_margin(),
    );
    info!(credential = manager.state().await.label(), "credential state at startup");

    let spotify_state = SpotifyState {
        manager: manager.clone(),
        resource: ResourceProxy::new(
            http,
            config.spotify.api_base_url.clone(),
            config.server.timeout(),
        ),
        redirect_uri: config.spotify.redirect_uri.clone(),
    };

    let app_state = AppState {
        manager,
        started_at: Instant::now(),
        prometheus: prometheus_handle,
    };

    let app = build_router(app_state, spotify_state, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    // The drain timeout starts when the shutdown signal fires, not when the
    // server starts.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => info!("all in-flight requests drained"),
        Ok(Ok(Err(e))) => error!(error = %e, "server error during shutdown"),
        Ok(Err(e)) => error!(error = %e, "server task panicked"),
        Err(_) => warn!(
            drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
            "drain timeout exceeded, forcing shutdown"
        ),
    }

    info!("shutdown complete");
    Ok(())
}

/// Tag each request with an id, record route metrics, and echo the id back
/// in `x-request-id`.
async fn track_requests(request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        route = %route
    );

    let start = Instant::now();
    let mut response = next.run(request).instrument(span).await;
    let status = response.status().as_u16();
    metrics::record_request(&route, status, start.elapsed().as_secs_f64());

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

/// Health endpoint: service status, credential lifecycle state, uptime.
///
/// Always 200; an uninitialized credential is a normal state before the first
/// authorization, not an outage.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let body = serde_json::json!({
        "status": "healthy",
        "credential": state.manager.state().await.label(),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    });

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
