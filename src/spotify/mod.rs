//! Spotify Web API access
//!
//! `PlaybackApi` is the seam between the device controller and the remote
//! service. `WebApiClient` implements it over HTTPS with a bearer token; a
//! recording mock stands in for it in tests.

mod client;
mod error;
#[cfg(test)]
mod mock;

pub use client::WebApiClient;
pub use error::ApiError;
#[cfg(test)]
pub use mock::{ApiCall, MockApi, device as test_device};

use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;

/// Remote playback operations, each scoped to a device where applicable.
#[async_trait]
pub trait PlaybackApi: Send + Sync {
    /// Current playback state; `None` when no device is active.
    async fn player_state(&self) -> Result<Option<PlayerState>, ApiError>;

    async fn play(&self, device_id: &str) -> Result<(), ApiError>;

    async fn pause(&self, device_id: &str) -> Result<(), ApiError>;

    async fn next(&self, device_id: &str) -> Result<(), ApiError>;

    async fn previous(&self, device_id: &str) -> Result<(), ApiError>;

    /// All devices visible to the authenticated account
    async fn devices(&self) -> Result<Vec<Device>, ApiError>;
}

/// A Spotify Connect device
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Device {
    /// Absent for devices that cannot be targeted through the API
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub is_active: bool,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id.as_deref().unwrap_or("-"), self.name)
    }
}

/// Snapshot of the account's playback
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlayerState {
    /// Device currently holding the playback session
    pub device: Device,
    pub is_playing: bool,
}

impl PlayerState {
    /// True when `device_id` holds the session and is playing
    pub fn is_playing_on(&self, device_id: &str) -> bool {
        self.is_playing && self.device.id.as_deref() == Some(device_id)
    }
}

/// Access credential returned by the token endpoint
#[derive(Clone, Deserialize)]
pub struct Token {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Lifetime in seconds
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish()
    }
}
