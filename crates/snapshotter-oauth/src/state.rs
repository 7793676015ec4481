//! Application state shared across handlers and background tasks.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use snapshotter_slack::SlackClient;
use tokio_util::sync::CancellationToken;

use crate::challenge::ChallengeRegistry;
use crate::config::OAuthConfig;
use crate::ledger::TokenLedger;

/// Shared collection state.
///
/// Locks are held only for short synchronous sections, never across `.await`.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Arc<OAuthConfig>,

    /// Slack Web API client used for code exchange and member counting.
    pub slack: SlackClient,

    /// Issued, not yet redeemed state parameters.
    pub challenges: Arc<Mutex<ChallengeRegistry>>,

    /// Collected tokens and the member quota.
    pub ledger: Arc<Mutex<TokenLedger>>,

    /// Public URL of the tunnel, once connected.
    public_url: Arc<RwLock<Option<String>>>,

    /// Cancelled once to stop the service.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: OAuthConfig, slack: SlackClient) -> Self {
        let challenges = ChallengeRegistry::new(config.challenge_ttl);
        Self {
            config: Arc::new(config),
            slack,
            challenges: Arc::new(Mutex::new(challenges)),
            ledger: Arc::new(Mutex::new(TokenLedger::new())),
            public_url: Arc::new(RwLock::new(None)),
            shutdown: CancellationToken::new(),
        }
    }

    /// Publish the public URL used as the OAuth redirect URI.
    pub fn publish_url(&self, url: impl Into<String>) {
        *self.public_url.write() = Some(url.into());
    }

    pub fn public_url(&self) -> Option<String> {
        self.public_url.read().clone()
    }

    /// The link handed out to members, once a public URL is published.
    pub fn install_url(&self) -> Option<String> {
        self.public_url().map(|url| format!("{}/install", url))
    }
}
