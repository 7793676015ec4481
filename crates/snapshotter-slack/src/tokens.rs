//! Persistence for collected user tokens.
//!
//! `tokens.json` maps a Slack user ID to that user's access token. It is
//! written once when the collection service shuts down and read once when
//! the harvester starts. It holds live credentials, so it is written with
//! owner-only permissions where the platform supports them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::TokenStoreError;

/// File name of the token store inside the working directory.
pub const TOKEN_FILE: &str = "tokens.json";

/// A user access token and the Slack user it belongs to.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub owner_id: String,
    pub secret: String,
}

impl AccessToken {
    pub fn new(owner_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            secret: secret.into(),
        }
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("owner_id", &self.owner_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Tokens keyed by owner ID, in owner ID order.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSet(BTreeMap<String, String>);

impl TokenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a token, replacing any previous token of the same owner.
    ///
    /// Returns `true` if the owner was not present before.
    pub fn insert(&mut self, token: AccessToken) -> bool {
        self.0.insert(token.owner_id, token.secret).is_none()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, owner_id: &str) -> bool {
        self.0.contains_key(owner_id)
    }

    pub fn get(&self, owner_id: &str) -> Option<&str> {
        self.0.get(owner_id).map(String::as_str)
    }

    /// Iterate over tokens in owner ID order.
    pub fn iter(&self) -> impl Iterator<Item = AccessToken> + '_ {
        self.0
            .iter()
            .map(|(owner, secret)| AccessToken::new(owner.clone(), secret.clone()))
    }

    /// Owner IDs in order.
    pub fn owners(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}

impl FromIterator<AccessToken> for TokenSet {
    fn from_iter<I: IntoIterator<Item = AccessToken>>(iter: I) -> Self {
        let mut set = TokenSet::new();
        for token in iter {
            set.insert(token);
        }
        set
    }
}

/// File-backed token store.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    /// Token store at `<dir>/tokens.json`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(TOKEN_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load tokens, rejecting a missing or empty store.
    pub fn load(&self) -> Result<TokenSet, TokenStoreError> {
        if !self.path.exists() {
            return Err(TokenStoreError::NotFound(self.path.clone()));
        }

        let content = std::fs::read_to_string(&self.path).map_err(|source| TokenStoreError::Io {
            path: self.path.clone(),
            source,
        })?;

        let tokens: TokenSet =
            serde_json::from_str(&content).map_err(|source| TokenStoreError::Parse {
                path: self.path.clone(),
                source,
            })?;

        if tokens.is_empty() {
            return Err(TokenStoreError::Empty(self.path.clone()));
        }

        tracing::debug!(path = %self.path.display(), count = tokens.len(), "Loaded tokens");
        Ok(tokens)
    }

    /// Write the full token set, replacing any previous file.
    pub fn save(&self, tokens: &TokenSet) -> Result<(), TokenStoreError> {
        let io_err = |source| TokenStoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let json =
            serde_json::to_string_pretty(tokens).map_err(|source| TokenStoreError::Serialize {
                path: self.path.clone(),
                source,
            })?;

        write_private(&self.path, json.as_bytes()).map_err(io_err)?;

        tracing::info!(path = %self.path.display(), count = tokens.len(), "Tokens saved");
        Ok(())
    }
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // mode() only applies on creation
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    file.write_all(contents)
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, contents)
}
