//! Token lifecycle management for the Spotify gateway
//!
//! Decides when the stored access token must be refreshed and makes sure
//! callers only ever see a token that is valid for at least the safety margin.
//! Credential data lives in `spotify_auth::CredentialStore`; this crate owns
//! the policy around it.
//!
//! Lifecycle:
//! 1. `authorize()` exchanges an authorization code and replaces the stored credential
//! 2. `get_valid_access_token()` returns the stored token while it is `Valid`
//! 3. Once inside the safety margin (`NearExpiry`), the next read refreshes first
//! 4. `force_refresh()` refreshes regardless of expiry
//! 5. Any failure leaves the stored credential unchanged

pub mod error;
pub mod manager;
pub mod state;

pub use error::{Error, Result};
pub use manager::{AuthorizedCredential, RefreshedToken, TokenManager};
pub use state::{CredentialState, DEFAULT_SAFETY_MARGIN_SECS};
