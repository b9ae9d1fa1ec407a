//! Configuration loading, parsing, and validation
//!
//! The configuration is a small JSON document read once at startup and never
//! modified afterwards. Parse errors keep their source position so miette can
//! point at the offending byte.

mod error;

pub use error::{ConfigError, ConfigIssue, ConfigValidationError};

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Port the local OAuth callback listener binds to when none is configured
pub const DEFAULT_AUTH_HTTP_PORT: u16 = 49152;

/// Config file looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "spotify-keyfwd.json";

/// Immutable runtime configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Configuration {
    /// Spotify Connect device that receives the playback commands
    #[serde(rename = "deviceID", default)]
    pub device_id: String,
    #[serde(rename = "spotifyClientID", default)]
    pub client_id: String,
    #[serde(rename = "spotifySecretKey", default)]
    pub client_secret: String,
    #[serde(rename = "authHTTPPort", default = "default_auth_http_port")]
    pub auth_http_port: u16,
    /// Upper bound on the interactive browser consent step; unbounded when absent
    #[serde(rename = "authTimeoutSecs", default)]
    pub auth_timeout_secs: Option<u64>,
}

fn default_auth_http_port() -> u16 {
    DEFAULT_AUTH_HTTP_PORT
}

impl Configuration {
    pub fn auth_timeout(&self) -> Option<Duration> {
        self.auth_timeout_secs.map(Duration::from_secs)
    }

    /// Check that the fields needed to forward keys are present.
    ///
    /// `load` only checks the client credentials because device-listing mode
    /// exists precisely to discover the device id.
    pub fn require_device(&self, source_name: &str) -> Result<(), ConfigError> {
        if self.device_id.trim().is_empty() {
            return Err(ConfigValidationError::new(
                source_name,
                vec![ConfigIssue::missing(
                    "deviceID",
                    "run with --devices to list the ids of your Spotify devices",
                )],
            )
            .into());
        }
        Ok(())
    }

    fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        if self.client_id.trim().is_empty() {
            issues.push(ConfigIssue::missing(
                "spotifyClientID",
                "create an app at https://developer.spotify.com/dashboard and copy its client id",
            ));
        }
        if self.client_secret.trim().is_empty() {
            issues.push(ConfigIssue::missing(
                "spotifySecretKey",
                "copy the client secret from the same Spotify app",
            ));
        }
        issues
    }
}

/// Load and validate configuration from a file
pub fn load(path: impl AsRef<Path>) -> Result<Configuration, ConfigError> {
    let path = path.as_ref();
    let source_name = path.display().to_string();

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::io(&source_name, e))?;

    load_from_str(&source_name, content)
}

/// Load and validate configuration from a string
///
/// Useful for testing and when config content is already in memory.
pub fn load_from_str(source_name: &str, content: String) -> Result<Configuration, ConfigError> {
    let config: Configuration = match serde_json::from_str(&content) {
        Ok(config) => config,
        Err(e) => return Err(ConfigError::parse(source_name, content, e)),
    };

    let issues = config.validate();
    if !issues.is_empty() {
        return Err(ConfigValidationError::new(source_name, issues).into());
    }

    Ok(config)
}
