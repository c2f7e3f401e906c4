//! Error types for token exchange and credential storage

/// Errors from the token endpoint and the credential file.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Required caller input was missing; raised before any network call.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The authorization server answered with a non-success status.
    /// `body` is the raw response body, kept verbatim for diagnostics.
    #[error("token endpoint returned {status}: {body}")]
    Exchange { status: u16, body: String },

    /// The authorization server could not be reached (connect, TLS, timeout).
    #[error("transport error: {0}")]
    Transport(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("not found: {0}")]
    NotFound(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
