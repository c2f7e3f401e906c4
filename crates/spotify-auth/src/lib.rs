//! Spotify OAuth primitives
//!
//! Token endpoint exchanges and durable credential storage for the gateway.
//! This crate has no notion of "valid" or "expired"; deciding when to refresh
//! is the job of `token-manager`.
//!
//! Credential flow:
//! 1. User approves the app and the frontend posts the authorization code
//! 2. `TokenExchangeClient::exchange_authorization_code()` trades it for tokens
//! 3. `CredentialStore::replace_all()` persists the initial credential
//! 4. Near expiry, `TokenExchangeClient::exchange_refresh_token()` mints a new access token
//! 5. `CredentialStore::update_in_place()` persists it, keeping the refresh token unless rotated

pub mod constants;
pub mod credentials;
pub mod error;
pub mod token;

pub use constants::*;
pub use credentials::{Credential, CredentialStore};
pub use error::{Error, Result};
pub use token::{ClientCredentials, Grant, TokenExchangeClient, TokenResponse};
