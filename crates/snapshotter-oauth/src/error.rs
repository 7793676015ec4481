//! Error types for the collection service.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use snapshotter_slack::{SlackError, TokenStoreError};
use thiserror::Error;

use crate::tunnel::TunnelError;

/// Startup configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is unset or empty.
    #[error("{0} unset or empty")]
    MissingEnv(&'static str),
}

/// Collection service error.
///
/// Handshake variants carry the reason shown to the member's browser.
#[derive(Debug, Error)]
pub enum OAuthError {
    /// Slack redirected back with an `error` parameter.
    #[error("forbidden by Slack API ({0})")]
    Denied(String),

    #[error("request state parameter is not provided")]
    MissingState,

    /// Never issued, or already redeemed.
    #[error("request state parameter is not valid")]
    InvalidState,

    #[error("request state parameter is expired")]
    ExpiredState,

    #[error("request code parameter is not provided")]
    MissingCode,

    /// No public URL has been published yet.
    #[error("public URL is not available yet")]
    TunnelUnavailable,

    /// Code exchange or member count failed upstream.
    #[error("Slack API request failed: {0}")]
    Exchange(#[source] SlackError),

    #[error(transparent)]
    TokenStore(#[from] TokenStoreError),

    #[error("Tunnel error: {0}")]
    Tunnel(#[from] TunnelError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for collection service operations.
pub type Result<T> = std::result::Result<T, OAuthError>;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable reason.
    pub reason: String,
}

impl OAuthError {
    /// HTTP status and error code for this error.
    pub fn status(&self) -> (StatusCode, &'static str) {
        match self {
            OAuthError::Denied(_) => (StatusCode::FORBIDDEN, "access_denied"),
            OAuthError::MissingState => (StatusCode::BAD_REQUEST, "missing_state"),
            OAuthError::InvalidState => (StatusCode::FORBIDDEN, "invalid_state"),
            OAuthError::ExpiredState => (StatusCode::FORBIDDEN, "expired_state"),
            OAuthError::MissingCode => (StatusCode::BAD_REQUEST, "missing_code"),
            OAuthError::TunnelUnavailable => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
            }
            OAuthError::Exchange(_) => (StatusCode::BAD_GATEWAY, "upstream_error"),
            OAuthError::TokenStore(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
            OAuthError::Tunnel(_) => (StatusCode::INTERNAL_SERVER_ERROR, "tunnel_error"),
            OAuthError::InvalidUrl(_) | OAuthError::Io(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        }
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();
        let reason = self.to_string();

        if status.is_server_error() {
            tracing::error!(status = %status, code, error = %reason, "Server error");
        } else {
            tracing::warn!(status = %status, code, error = %reason, "Client error");
        }

        let body = ErrorResponse {
            code: code.to_string(),
            reason,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reasons() {
        assert_eq!(
            OAuthError::Denied("access_denied".into()).to_string(),
            "forbidden by Slack API (access_denied)"
        );
        assert_eq!(
            OAuthError::ExpiredState.to_string(),
            "request state parameter is expired"
        );
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(OAuthError::MissingState.status().0, StatusCode::BAD_REQUEST);
        assert_eq!(OAuthError::InvalidState.status().0, StatusCode::FORBIDDEN);
        assert_eq!(
            OAuthError::Exchange(SlackError::Status {
                method: "oauth.v2.access".into(),
                status: 500
            })
            .status()
            .0,
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            OAuthError::TunnelUnavailable.status().0,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
