//! On-disk snapshot layout.
//!
//! ```text
//! <root>/<team>/members.json
//! <root>/<team>/<channel>/metadata.json
//! <root>/<team>/<channel>/messages.json
//! ```

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{HarvestError, Result};

pub const MEMBERS_FILE: &str = "members.json";
pub const METADATA_FILE: &str = "metadata.json";
pub const MESSAGES_FILE: &str = "messages.json";

/// Writes redacted records into the snapshot tree.
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    root: PathBuf,
}

impl SnapshotWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn team_dir(&self, team_id: &str) -> Result<PathBuf> {
        Ok(self.root.join(checked("team", team_id)?))
    }

    pub fn channel_dir(&self, team_id: &str, channel_id: &str) -> Result<PathBuf> {
        Ok(self.team_dir(team_id)?.join(checked("channel", channel_id)?))
    }

    /// Write `<team>/members.json`.
    pub async fn write_members<T: Serialize>(&self, team_id: &str, members: &T) -> Result<PathBuf> {
        let path = self.team_dir(team_id)?.join(MEMBERS_FILE);
        write_json(&path, members).await?;
        Ok(path)
    }

    /// Write `<team>/<channel>/metadata.json`.
    pub async fn write_channel<T: Serialize>(
        &self,
        team_id: &str,
        channel_id: &str,
        metadata: &T,
    ) -> Result<PathBuf> {
        let path = self.channel_dir(team_id, channel_id)?.join(METADATA_FILE);
        write_json(&path, metadata).await?;
        Ok(path)
    }

    /// Write `<team>/<channel>/messages.json`.
    pub async fn write_messages<T: Serialize>(
        &self,
        team_id: &str,
        channel_id: &str,
        messages: &[T],
    ) -> Result<PathBuf> {
        let path = self.channel_dir(team_id, channel_id)?.join(MESSAGES_FILE);
        write_json(&path, messages).await?;
        Ok(path)
    }
}

/// Slack identifiers are uppercase alphanumerics; anything else could
/// escape the snapshot root.
fn checked<'a>(kind: &'static str, id: &'a str) -> Result<&'a str> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(id)
    } else {
        Err(HarvestError::InvalidIdentifier {
            kind,
            value: id.to_string(),
        })
    }
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let io_err = |source| HarvestError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }

    let json = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(path, json).await.map_err(io_err)?;

    tracing::debug!(path = %path.display(), "Wrote snapshot file");
    Ok(())
}
