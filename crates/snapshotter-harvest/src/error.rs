//! Error types for the harvester.

use std::path::PathBuf;

use snapshotter_slack::{SlackError, TokenStoreError};
use thiserror::Error;

/// Result type alias for harvester operations.
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Errors that abort a harvest run.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// Token store missing, empty or unreadable.
    #[error(transparent)]
    TokenStore(#[from] TokenStoreError),

    /// A Slack API call failed; the run is not retried.
    #[error(transparent)]
    Slack(#[from] SlackError),

    /// Writing the snapshot failed.
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Serializing a record failed.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// The token set handed to the harvester was empty.
    #[error("no tokens to harvest with")]
    NoTokens,

    /// The API returned a non-object where a record was expected.
    #[error("{kind} record is not a JSON object")]
    NotAnObject { kind: &'static str },

    /// A record lacks a field needed to place it in the snapshot.
    #[error("{kind} record without '{field}'")]
    MissingField { kind: &'static str, field: &'static str },

    /// An identifier is not safe to use as a path component.
    #[error("refusing to use {kind} identifier {value:?} as a directory name")]
    InvalidIdentifier { kind: &'static str, value: String },
}
