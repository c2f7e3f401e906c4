//! `/spotify/*` HTTP handlers
//!
//! Thin adapters over `TokenManager` and `ResourceProxy`: extract the input,
//! call one operation, translate the result. Status code selection lives in
//! `crate::error`.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use token_manager::{AuthorizedCredential, RefreshedToken, TokenManager};
use tracing::info;

use crate::error::{ApiError, content_type_of};
use crate::upstream::{ResourceProxy, TopItems, UpstreamError};

/// State shared by the `/spotify` handlers.
#[derive(Clone)]
pub struct SpotifyState {
    pub manager: TokenManager,
    pub resource: ResourceProxy,
    pub redirect_uri: String,
}

pub fn router(state: SpotifyState) -> Router {
    Router::new()
        .route("/spotify/exchange-token", post(exchange_token))
        .route("/spotify/refresh-token", post(refresh_token))
        .route("/spotify/top-artists", get(top_artists))
        .route("/spotify/top-musics", get(top_musics))
        .with_state(state)
}

/// Pull the authorization code out of the request body.
///
/// Accepts a JSON string (`"abc"`), a JSON object with a `code` field, or the
/// code as raw text. Anything that yields no code becomes an empty string and
/// is rejected downstream.
fn authorization_code(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    match serde_json::from_str::<Value>(text) {
        Ok(Value::String(code)) => code,
        Ok(Value::Object(map)) => map
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        Ok(Value::Null) => String::new(),
        _ => text.to_string(),
    }
}

async fn exchange_token(
    State(state): State<SpotifyState>,
    body: Bytes,
) -> Result<Json<AuthorizedCredential>, ApiError> {
    let code = authorization_code(&body);
    let credential = state.manager.authorize(&code, &state.redirect_uri).await?;
    info!(tenant = state.manager.tenant(), expires_at = %credential.expires_at, "authorization stored");
    Ok(Json(credential))
}

async fn refresh_token(
    State(state): State<SpotifyState>,
) -> Result<Json<RefreshedToken>, ApiError> {
    Ok(Json(state.manager.force_refresh().await?))
}

async fn top_artists(State(state): State<SpotifyState>) -> Result<Response, ApiError> {
    fetch_top(&state, TopItems::Artists).await
}

async fn top_musics(State(state): State<SpotifyState>) -> Result<Response, ApiError> {
    fetch_top(&state, TopItems::Tracks).await
}

async fn fetch_top(state: &SpotifyState, kind: TopItems) -> Result<Response, ApiError> {
    let access_token = state
        .manager
        .get_valid_access_token()
        .await
        .map_err(ApiError::from_token_lookup)?;

    match state.resource.fetch_top(kind, &access_token).await {
        Ok(body) => Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, content_type_of(&body))],
            body,
        )
            .into_response()),
        Err(UpstreamError::Rejected { body, .. }) => Err(ApiError::BadRequest(body)),
        Err(UpstreamError::Transport(msg)) => Err(ApiError::BadGateway(msg)),
    }
}
