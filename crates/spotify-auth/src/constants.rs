//! Spotify endpoint defaults
//!
//! Both are overridable from the gateway config so tests and staging can point
//! at a local authorization server.

/// Token endpoint for the `authorization_code` and `refresh_token` grants
pub const TOKEN_ENDPOINT: &str = "https://accounts.spotify.com/api/token";

/// Base URL of the Web API used by the resource proxy
pub const API_BASE_URL: &str = "https://api.spotify.com";

/// Tenant key used while the gateway serves a single Spotify account
pub const DEFAULT_TENANT: &str = "default";
