//! HTTP error responses
//!
//! Client-facing failures are plain `400` responses whose body is either a
//! short message or the authorization server's / API's raw error body.
//! Failures to reach those servers are `502`; local storage failures are `500`.

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

/// Body for `/spotify/refresh-token` when nothing has been authorized yet.
pub const TOKEN_NOT_FOUND: &str = "Token não encontrado.";

/// Body for the data endpoints when nothing has been authorized yet.
pub const AUTHENTICATE_FIRST: &str = "Token não encontrado. Faça a autenticação primeiro.";

/// Prefix for a failed lazy refresh on the data endpoints.
pub const REFRESH_FAILED_PREFIX: &str = "Erro ao atualizar token: ";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    BadGateway(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Map a lifecycle error raised while a data endpoint fetched its token.
    ///
    /// These responses carry a message rather than the raw exchange body.
    pub fn from_token_lookup(err: token_manager::Error) -> Self {
        match err {
            token_manager::Error::NoCredential(_) | token_manager::Error::NotFound(_) => {
                ApiError::BadRequest(AUTHENTICATE_FIRST.into())
            }
            token_manager::Error::Exchange { body, .. } => {
                ApiError::BadRequest(format!("{REFRESH_FAILED_PREFIX}{body}"))
            }
            other => other.into(),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<token_manager::Error> for ApiError {
    fn from(err: token_manager::Error) -> Self {
        match err {
            token_manager::Error::InvalidRequest(msg) => ApiError::BadRequest(msg),
            token_manager::Error::Exchange { body, .. } => ApiError::BadRequest(body),
            token_manager::Error::NoCredential(_) | token_manager::Error::NotFound(_) => {
                ApiError::BadRequest(TOKEN_NOT_FOUND.into())
            }
            token_manager::Error::Transport(msg) => ApiError::BadGateway(msg),
            token_manager::Error::Store(msg) | token_manager::Error::Refresh(msg) => {
                ApiError::Internal(msg)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "request failed");
        }

        let body = match self {
            ApiError::BadRequest(body) | ApiError::BadGateway(body) => body,
            // Storage details stay in the logs.
            ApiError::Internal(_) => "internal error".to_string(),
        };

        (status, [(header::CONTENT_TYPE, content_type_of(&body))], body).into_response()
    }
}

/// Raw upstream bodies are usually JSON; label them as such when they parse.
pub fn content_type_of(body: &str) -> &'static str {
    if serde_json::from_str::<serde::de::IgnoredAny>(body).is_ok() {
        "application/json"
    } else {
        "text/plain; charset=utf-8"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_of(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn exchange_rejection_is_400_with_raw_body() {
        let raw = r#"{"error":"invalid_grant","error_description":"Invalid authorization code"}"#;
        let err: ApiError = token_manager::Error::Exchange {
            status: 400,
            body: raw.into(),
        }
        .into();

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(body_of(response).await, raw);
    }

    #[tokio::test]
    async fn missing_code_is_400_plain_text() {
        let err: ApiError = token_manager::Error::InvalidRequest("Code is required".into()).into();

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
        assert_eq!(body_of(response).await, "Code is required");
    }

    #[test]
    fn no_credential_message_depends_on_caller() {
        let direct: ApiError = token_manager::Error::NoCredential("default".into()).into();
        assert!(matches!(direct, ApiError::BadRequest(ref m) if m == TOKEN_NOT_FOUND));

        let lookup =
            ApiError::from_token_lookup(token_manager::Error::NoCredential("default".into()));
        assert!(matches!(lookup, ApiError::BadRequest(ref m) if m == AUTHENTICATE_FIRST));
    }

    #[test]
    fn lazy_refresh_failure_is_prefixed() {
        let err = ApiError::from_token_lookup(token_manager::Error::Exchange {
            status: 400,
            body: r#"{"error":"invalid_grant"}"#.into(),
        });
        assert!(
            matches!(err, ApiError::BadRequest(ref m) if m == r#"Erro ao atualizar token: {"error":"invalid_grant"}"#)
        );
    }

    #[test]
    fn transport_is_502_and_store_is_500() {
        let transport: ApiError = token_manager::Error::Transport("timed out".into()).into();
        assert_eq!(transport.status(), StatusCode::BAD_GATEWAY);

        let store: ApiError = token_manager::Error::Store("disk full".into()).into();
        assert_eq!(store.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let lookup = ApiError::from_token_lookup(token_manager::Error::Transport("x".into()));
        assert_eq!(lookup.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn internal_error_body_hides_details() {
        let err: ApiError = token_manager::Error::Store("/var/lib/secret/path".into()).into();
        let body = body_of(err.into_response()).await;
        assert_eq!(body, "internal error");
    }
}
