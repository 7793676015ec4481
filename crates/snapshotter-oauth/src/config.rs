//! Collection service configuration.

use std::time::Duration;

use snapshotter_slack::DEFAULT_PAGE_DELAY;
use url::Url;

use crate::error::ConfigError;

/// Environment variable holding the Slack app client ID.
pub const CLIENT_ID_ENV: &str = "SLACK_CLIENT_ID";

/// Environment variable holding the Slack app client secret.
pub const CLIENT_SECRET_ENV: &str = "SLACK_CLIENT_SECRET";

/// Slack's user authorization page.
pub const SLACK_AUTHORIZE_URL: &str = "https://slack.com/oauth/v2/authorize";

/// User scopes needed to read members and every conversation kind.
pub const USER_SCOPES: &[&str] = &[
    "users:read",
    "im:history",
    "im:read",
    "mpim:history",
    "mpim:read",
    "channels:history",
    "channels:read",
    "groups:history",
    "groups:read",
];

/// Lifetime of an issued state parameter (10 minutes).
pub const DEFAULT_CHALLENGE_TTL: Duration = Duration::from_secs(600);

/// Completion watcher tick.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// OAuth collection configuration.
#[derive(Clone)]
pub struct OAuthConfig {
    /// Slack app client ID.
    pub client_id: String,

    /// Slack app client secret. Never logged.
    pub client_secret: String,

    /// Authorization endpoint members are redirected to.
    pub authorize_url: String,

    /// Requested user scopes.
    pub user_scopes: Vec<String>,

    /// How long an issued state stays redeemable.
    pub challenge_ttl: Duration,

    /// How often the completion watcher checks progress.
    pub poll_interval: Duration,

    /// Delay between `users.list` pages when counting members.
    pub page_delay: Duration,
}

impl std::fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("authorize_url", &self.authorize_url)
            .field("user_scopes", &self.user_scopes)
            .field("challenge_ttl", &self.challenge_ttl)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl OAuthConfig {
    /// Create a config with Slack defaults for the given app credentials.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            authorize_url: SLACK_AUTHORIZE_URL.to_string(),
            user_scopes: USER_SCOPES.iter().map(|s| s.to_string()).collect(),
            challenge_ttl: DEFAULT_CHALLENGE_TTL,
            poll_interval: DEFAULT_POLL_INTERVAL,
            page_delay: DEFAULT_PAGE_DELAY,
        }
    }

    /// Read app credentials from `SLACK_CLIENT_ID` and `SLACK_CLIENT_SECRET`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let require = |key: &'static str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or(ConfigError::MissingEnv(key))
        };

        let client_id = require(CLIENT_ID_ENV)?;
        let client_secret = require(CLIENT_SECRET_ENV)?;
        Ok(Self::new(client_id, client_secret))
    }

    pub fn with_challenge_ttl(mut self, ttl: Duration) -> Self {
        self.challenge_ttl = ttl;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    /// Comma-separated `user_scope` parameter.
    pub fn user_scope(&self) -> String {
        self.user_scopes.join(",")
    }

    /// Build the authorization URL for one handshake.
    pub fn authorization_url(&self, state: &str, redirect_uri: &str) -> Result<Url, url::ParseError> {
        let scope = self.user_scope();
        Url::parse_with_params(
            &self.authorize_url,
            [
                ("state", state),
                ("client_id", self.client_id.as_str()),
                ("user_scope", scope.as_str()),
                ("redirect_uri", redirect_uri),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_from_lookup() {
        let config =
            OAuthConfig::from_lookup(lookup(&[(CLIENT_ID_ENV, "cid"), (CLIENT_SECRET_ENV, "s")]))
                .unwrap();
        assert_eq!(config.client_id, "cid");
        assert_eq!(config.client_secret, "s");
        assert_eq!(config.challenge_ttl, DEFAULT_CHALLENGE_TTL);
    }

    #[test]
    fn test_missing_secret() {
        let err = OAuthConfig::from_lookup(lookup(&[(CLIENT_ID_ENV, "cid")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnv(CLIENT_SECRET_ENV)));
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        let err = OAuthConfig::from_lookup(lookup(&[(CLIENT_ID_ENV, ""), (CLIENT_SECRET_ENV, "s")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnv(CLIENT_ID_ENV)));
    }

    #[test]
    fn test_authorization_url() {
        let config = OAuthConfig::new("cid", "secret");
        let url = config
            .authorization_url("abc", "https://tunnel.example.test")
            .unwrap();
        assert!(url.as_str().starts_with(SLACK_AUTHORIZE_URL));

        let params: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["state"], "abc");
        assert_eq!(params["client_id"], "cid");
        assert_eq!(params["redirect_uri"], "https://tunnel.example.test");
        assert_eq!(params["user_scope"], USER_SCOPES.join(","));
    }

    #[test]
    fn test_debug_hides_secret() {
        let debug = format!("{:?}", OAuthConfig::new("cid", "hunter2"));
        assert!(!debug.contains("hunter2"));
    }
}
