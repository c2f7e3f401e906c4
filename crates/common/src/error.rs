//! Configuration and startup error types

use thiserror::Error;

/// Errors raised while loading and validating configuration.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    /// A required setting was absent from both the config file and the environment.
    #[error("Missing required setting {setting} (set {env_var})")]
    MissingSetting {
        setting: &'static str,
        env_var: &'static str,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result alias using common Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_setting_names_the_env_var() {
        let err = Error::MissingSetting {
            setting: "client_id",
            env_var: "SPOTIFY_CLIENT_ID",
        };
        assert_eq!(
            err.to_string(),
            "Missing required setting client_id (set SPOTIFY_CLIENT_ID)"
        );
    }

    #[test]
    fn error_display_includes_context() {
        let config_err = Error::Config("timeout_secs must be greater than 0".into());
        assert_eq!(
            config_err.to_string(),
            "Configuration error: timeout_secs must be greater than 0"
        );

        let io_err = Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "secret file not found",
        ));
        assert!(
            io_err.to_string().starts_with("I/O error:"),
            "got: {io_err}"
        );
    }
}
