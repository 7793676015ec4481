//! Error types for the Slack binding and token store.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for Slack API calls.
pub type Result<T> = std::result::Result<T, SlackError>;

/// Errors returned by the Slack Web API binding.
#[derive(Debug, Error)]
pub enum SlackError {
    /// HTTP transport failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL construction failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Slack answered with `"ok": false`.
    #[error("Slack API error in {method}: {error}")]
    Api { method: String, error: String },

    /// Slack answered with a non-success HTTP status.
    #[error("Slack API {method} returned HTTP {status}")]
    Status { method: String, status: u16 },

    /// The response body did not have the expected shape.
    #[error("Unexpected response from {method}: {message}")]
    Decode { method: String, message: String },
}

impl SlackError {
    /// Check if Slack rejected the call because of rate limiting.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SlackError::Status { status: 429, .. })
            || matches!(self, SlackError::Api { error, .. } if error == "ratelimited")
    }

    pub(crate) fn decode(method: &str, message: impl Into<String>) -> Self {
        SlackError::Decode {
            method: method.to_string(),
            message: message.into(),
        }
    }
}

/// Errors reading or writing `tokens.json`.
#[derive(Debug, Error)]
pub enum TokenStoreError {
    /// No token file at the expected location.
    #[error("token store not found at {}", .0.display())]
    NotFound(PathBuf),

    /// The token file exists but holds no tokens.
    #[error("token store at {} contains no tokens", .0.display())]
    Empty(PathBuf),

    /// Filesystem error.
    #[error("failed to access token store {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The token file is not a JSON object of strings.
    #[error("failed to parse token store {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// The token set could not be encoded for writing.
    #[error("failed to serialize token store {}: {source}", path.display())]
    Serialize {
        path: PathBuf,
        source: serde_json::Error,
    },
}
