//! Error taxonomy for lifecycle operations
//!
//! Variants are meant to be matched on. The HTTP layer picks status codes
//! and response bodies from the variant, never from the message text.

/// Errors from `TokenManager` operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Caller input was missing (e.g. empty authorization code).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The authorization server rejected the exchange. `body` is verbatim.
    #[error("token endpoint returned {status}: {body}")]
    Exchange { status: u16, body: String },

    /// The authorization server could not be reached or timed out.
    #[error("transport error: {0}")]
    Transport(String),

    /// No credential is stored for the tenant; authorization must happen first.
    #[error("no credential stored for tenant {0}, authorize first")]
    NoCredential(String),

    /// The store was asked to update a record that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("credential store error: {0}")]
    Store(String),

    /// The detached refresh task panicked or was aborted.
    #[error("refresh task failed: {0}")]
    Refresh(String),
}

impl From<spotify_auth::Error> for Error {
    fn from(err: spotify_auth::Error) -> Self {
        match err {
            spotify_auth::Error::InvalidRequest(msg) => Error::InvalidRequest(msg),
            spotify_auth::Error::Exchange { status, body } => Error::Exchange { status, body },
            spotify_auth::Error::Transport(msg) => Error::Transport(msg),
            spotify_auth::Error::NotFound(msg) => Error::NotFound(msg),
            spotify_auth::Error::Io(msg) | spotify_auth::Error::CredentialParse(msg) => {
                Error::Store(msg)
            }
        }
    }
}

/// Result alias for lifecycle operations.
pub type Result<T> = std::result::Result<T, Error>;
