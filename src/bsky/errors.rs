//! Error types for the Bluesky network client

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BskyError {
    #[error("API request failed ({status}): {error}: {message}")]
    ApiError {
        status: u16,
        error: String,
        message: String,
    },

    #[error("Token has expired")]
    ExpiredToken,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitError(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Missing access token, please login first")]
    MissingToken,
}

impl BskyError {
    /// Whether this error means the stored credential can no longer be used
    pub fn is_expired_token(&self) -> bool {
        matches!(self, BskyError::ExpiredToken)
    }

    /// Whether retrying the same request may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            BskyError::RateLimitError(_) => true,
            BskyError::ApiError { status, .. } => *status >= 500 || *status == 408,
            BskyError::HttpError(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().map_or(false, |status| {
                        status.is_server_error() || status == 429 || status == 408
                    })
            }
            _ => false,
        }
    }
}

pub type BskyResult<T> = Result<T, BskyError>;
