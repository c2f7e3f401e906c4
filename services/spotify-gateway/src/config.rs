//! Configuration types and loading
//!
//! Config precedence: env vars > config file > defaults. The default file is
//! optional; a path named via `--config` or `CONFIG_PATH` must exist. A
//! deployment can run purely from `SPOTIFY_CLIENT_ID`,
//! `SPOTIFY_CLIENT_SECRET` and `SPOTIFY_REDIRECT_URI`. The client secret is
//! never read from the TOML itself, only from the env var or
//! `client_secret_file`.
//!
//! Everything is validated once in `Config::load`; the rest of the service
//! receives a fully-populated `Config` and never consults the environment.

use common::Secret;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_CLIENT_ID: &str = "SPOTIFY_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "SPOTIFY_CLIENT_SECRET";
pub const ENV_REDIRECT_URI: &str = "SPOTIFY_REDIRECT_URI";

/// Validated service configuration.
#[derive(Debug)]
pub struct Config {
    pub spotify: SpotifyConfig,
    pub server: ServerConfig,
    pub credentials: CredentialsConfig,
}

/// Spotify application registration and endpoints
#[derive(Debug)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub redirect_uri: String,
    pub token_endpoint: String,
    pub api_base_url: String,
}

/// HTTP listener settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Timeout for every outbound call (token endpoint and Web API)
    pub timeout_secs: u64,
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            timeout_secs: 10,
            max_connections: 1000,
        }
    }
}

impl ServerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Credential persistence and refresh policy
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub path: PathBuf,
    pub tenant: String,
    /// Seconds before expiry at which a token is refreshed on read
    pub safety_margin_secs: u64,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("credentials.json"),
            tenant: spotify_auth::DEFAULT_TENANT.to_string(),
            safety_margin_secs: token_manager::DEFAULT_SAFETY_MARGIN_SECS as u64,
        }
    }
}

impl CredentialsConfig {
    pub fn safety_margin(&self) -> chrono::Duration {
        // Bounded to one day by validation.
        chrono::Duration::seconds(self.safety_margin_secs as i64)
    }
}

/// On-disk shape of the config file. Every field is optional here;
/// requiredness is checked after the env overlay.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    spotify: FileSpotifyConfig,
    server: ServerConfig,
    credentials: CredentialsConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileSpotifyConfig {
    client_id: Option<String>,
    client_secret_file: Option<PathBuf>,
    redirect_uri: Option<String>,
    token_endpoint: Option<String>,
    api_base_url: Option<String>,
}

const MAX_SAFETY_MARGIN_SECS: u64 = 24 * 60 * 60;

const DEFAULT_CONFIG_PATH: &str = "spotify-gateway.toml";

/// Location of the config file and whether the operator named it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPath {
    pub path: PathBuf,
    /// Set via `--config` or `CONFIG_PATH`; a missing file is an error.
    pub explicit: bool,
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment
    /// variables and validate.
    ///
    /// Only the default path may be absent, in which case every file setting
    /// takes its default.
    pub fn load(source: &ConfigPath) -> common::Result<Self> {
        let path = source.path.as_path();
        let file = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str(&contents)?
        } else if source.explicit {
            return Err(common::Error::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        } else {
            FileConfig::default()
        };
        Self::from_parts(file, |key| std::env::var(key).ok())
    }

    /// Parse TOML text with an explicit environment lookup.
    pub fn from_toml(
        contents: &str,
        env: impl Fn(&str) -> Option<String>,
    ) -> common::Result<Self> {
        Self::from_parts(toml::from_str(contents)?, env)
    }

    fn from_parts(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> common::Result<Self> {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let client_id = env(ENV_CLIENT_ID)
            .or(file.spotify.client_id)
            .filter(|v| !v.trim().is_empty())
            .ok_or(common::Error::MissingSetting {
                setting: "spotify.client_id",
                env_var: ENV_CLIENT_ID,
            })?;

        let redirect_uri = env(ENV_REDIRECT_URI)
            .or(file.spotify.redirect_uri)
            .filter(|v| !v.trim().is_empty())
            .ok_or(common::Error::MissingSetting {
                setting: "spotify.redirect_uri",
                env_var: ENV_REDIRECT_URI,
            })?;

        // Secret resolution: env var takes precedence over file
        let client_secret = match env(ENV_CLIENT_SECRET) {
            Some(secret) => Secret::new(secret),
            None => match &file.spotify.client_secret_file {
                Some(secret_file) => {
                    let contents = std::fs::read_to_string(secret_file).map_err(|e| {
                        common::Error::Config(format!(
                            "failed to read client_secret_file {}: {e}",
                            secret_file.display()
                        ))
                    })?;
                    Secret::new(contents.trim().to_owned())
                }
                None => Secret::new(String::new()),
            },
        };
        if client_secret.is_blank() {
            return Err(common::Error::MissingSetting {
                setting: "spotify.client_secret",
                env_var: ENV_CLIENT_SECRET,
            });
        }

        let token_endpoint = file
            .spotify
            .token_endpoint
            .unwrap_or_else(|| spotify_auth::TOKEN_ENDPOINT.to_string());
        let api_base_url = file
            .spotify
            .api_base_url
            .unwrap_or_else(|| spotify_auth::API_BASE_URL.to_string());

        for (name, url) in [
            ("token_endpoint", &token_endpoint),
            ("api_base_url", &api_base_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(common::Error::Config(format!(
                    "{name} must start with http:// or https://, got: {url}"
                )));
            }
        }

        if file.server.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if file.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if file.credentials.tenant.trim().is_empty() {
            return Err(common::Error::Config("tenant must not be empty".into()));
        }

        if file.credentials.safety_margin_secs > MAX_SAFETY_MARGIN_SECS {
            return Err(common::Error::Config(format!(
                "safety_margin_secs must be at most {MAX_SAFETY_MARGIN_SECS}"
            )));
        }

        Ok(Config {
            spotify: SpotifyConfig {
                client_id,
                client_secret,
                redirect_uri,
                token_endpoint,
                api_base_url,
            },
            server: file.server,
            credentials: file.credentials,
        })
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> ConfigPath {
        let named = cli_path
            .map(PathBuf::from)
            .or_else(|| std::env::var("CONFIG_PATH").ok().map(PathBuf::from));
        match named {
            Some(path) => ConfigPath {
                path,
                explicit: true,
            },
            None => ConfigPath {
                path: PathBuf::from(DEFAULT_CONFIG_PATH),
                explicit: false,
            },
        }
    }
}
