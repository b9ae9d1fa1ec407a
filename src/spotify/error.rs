use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Spotify API returned {status}: {message}")]
    Status { status: u16, message: String },
}

/// Error envelope used by the Web API: `{"error": {"status": 404, "message": "..."}}`
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl ApiError {
    /// Build a status error, preferring the message from Spotify's error body
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<ErrorEnvelope>(body)
            .map(|envelope| envelope.error.message)
            .unwrap_or_else(|_| body.trim().to_string());
        Self::Status { status, message }
    }
}
