//! reqwest-backed Web API client
//!
//! A `WebApiClient` is the authenticated session: it is built from the token
//! produced by the OAuth flow and attaches it to every request.

use super::{ApiError, Device, PlaybackApi, PlayerState, Token};
use async_trait::async_trait;
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Client, Method, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

/// Base URL of the Spotify Web API
const API_BASE_URL: &str = "https://api.spotify.com/v1";

#[derive(Debug, Deserialize)]
struct DeviceList {
    devices: Vec<Device>,
}

/// Authenticated Spotify Web API client
pub struct WebApiClient {
    client: Client,
    token: Token,
    base_url: String,
}

impl WebApiClient {
    pub fn new(token: Token) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            token,
            base_url: API_BASE_URL.to_string(),
        })
    }

    /// Build a request with the bearer token attached
    fn request(&self, method: Method, endpoint: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!("{} {}", method, url);
        self.client
            .request(method, url)
            .bearer_auth(&self.token.access_token)
    }

    /// Issue a device-scoped player command with an empty body
    async fn command(&self, method: Method, endpoint: &str, device_id: &str) -> Result<(), ApiError> {
        let response = self
            .request(method, endpoint)
            .query(&[("device_id", device_id)])
            // The player endpoints reject bodiless PUT/POST without a length
            .header(CONTENT_LENGTH, 0)
            .send()
            .await?;
        check_status(response).await.map(drop)
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<Option<T>, ApiError> {
        let response = check_status(self.request(Method::GET, endpoint).send().await?).await?;

        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        Ok(Some(response.json().await?))
    }
}

/// Turn non-2xx responses into `ApiError::Status`
async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!("API error ({}): {}", status.as_u16(), body.trim());
    Err(ApiError::from_status(status.as_u16(), &body))
}

#[async_trait]
impl PlaybackApi for WebApiClient {
    async fn player_state(&self) -> Result<Option<PlayerState>, ApiError> {
        self.get("/me/player").await
    }

    async fn play(&self, device_id: &str) -> Result<(), ApiError> {
        self.command(Method::PUT, "/me/player/play", device_id).await
    }

    async fn pause(&self, device_id: &str) -> Result<(), ApiError> {
        self.command(Method::PUT, "/me/player/pause", device_id).await
    }

    async fn next(&self, device_id: &str) -> Result<(), ApiError> {
        self.command(Method::POST, "/me/player/next", device_id).await
    }

    async fn previous(&self, device_id: &str) -> Result<(), ApiError> {
        self.command(Method::POST, "/me/player/previous", device_id).await
    }

    async fn devices(&self) -> Result<Vec<Device>, ApiError> {
        let list: Option<DeviceList> = self.get("/me/player/devices").await?;
        Ok(list.map(|list| list.devices).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::assert;

    fn token() -> Token {
        Token {
            access_token: "test_token".to_string(),
            token_type: "Bearer".to_string(),
            expires_in: 3600,
            refresh_token: None,
            scope: String::new(),
        }
    }

    #[test]
    fn test_client_creation() {
        let client = WebApiClient::new(token()).unwrap();
        assert!(client.base_url == API_BASE_URL);
    }

    #[test]
    fn test_command_request_is_device_scoped() {
        let client = WebApiClient::new(token()).unwrap();
        let request = client
            .request(Method::PUT, "/me/player/pause")
            .query(&[("device_id", "abc123")])
            .build()
            .unwrap();
        assert!(request.url().as_str() == "https://api.spotify.com/v1/me/player/pause?device_id=abc123");
        let auth = request.headers().get(reqwest::header::AUTHORIZATION).unwrap();
        assert!(auth.to_str().unwrap() == "Bearer test_token");
    }
}
