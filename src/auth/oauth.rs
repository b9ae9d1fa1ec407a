use super::{AuthError, AuthState, OAuthProvider};
use crate::spotify::Token;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Permissions requested: read playback state and control playback
pub const SCOPES: [&str; 2] = ["user-read-playback-state", "user-modify-playback-state"];

/// Error body of the accounts service
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Spotify accounts service client for the authorization-code grant
pub struct Authenticator {
    client: Client,
    client_id: String,
    client_secret: String,
}

impl Authenticator {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Result<Self, AuthError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        })
    }
}

#[async_trait]
impl OAuthProvider for Authenticator {
    fn authorize_url(&self, state: &AuthState, redirect_uri: &str) -> Result<String, AuthError> {
        let scope = SCOPES.join(" ");
        let request = self
            .client
            .get(AUTHORIZE_URL)
            .query(&[
                ("client_id", self.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", redirect_uri),
                ("state", state.as_str()),
                ("scope", scope.as_str()),
            ])
            .build()?;
        Ok(request.url().to_string())
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<Token, AuthError> {
        debug!("exchanging authorization code");
        let response = self
            .client
            .post(TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<OAuthErrorBody>(&body) {
                Ok(OAuthErrorBody {
                    error,
                    error_description: Some(description),
                }) => format!("{error}: {description}"),
                Ok(OAuthErrorBody { error, .. }) => error,
                Err(_) => body,
            };
            return Err(AuthError::Exchange {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }
}
