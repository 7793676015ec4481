//! Local OAuth service collecting Slack user tokens from workspace members.
//!
//! Members open `<public URL>/install`, authorize the app on Slack and are
//! redirected back to `/`. Each successful handshake records one user token.
//! The first handshake also counts how many members can authorize at all;
//! once that many tokens are held, the service writes `tokens.json` and
//! stops itself.
//!
//! ```text
//! browser ── GET /install ──▶ 307 slack.com/oauth/v2/authorize?state=..
//! slack   ── GET /?code&state ──▶ oauth.v2.access ──▶ TokenLedger
//! watcher ── every 500 ms ──▶ Progress ──▶ tokens.json + shutdown
//! ```
//!
//! # Components
//!
//! - [`challenge`]: single-use state parameters with a 10 minute TTL
//! - [`ledger`]: collected tokens and the member quota
//! - [`routes`]: axum handlers for the handshake
//! - [`server`]: service lifecycle, tunnel and completion watcher
//! - [`tunnel`]: public URL providers (ngrok agent, static URL)

pub mod challenge;
pub mod config;
pub mod error;
pub mod ledger;
pub mod routes;
pub mod server;
pub mod state;
pub mod tunnel;

pub use challenge::{ChallengeRegistry, generate_state};
pub use config::{
    CLIENT_ID_ENV, CLIENT_SECRET_ENV, DEFAULT_CHALLENGE_TTL, DEFAULT_POLL_INTERVAL, OAuthConfig,
    SLACK_AUTHORIZE_URL, USER_SCOPES,
};
pub use error::{ConfigError, ErrorResponse, OAuthError, Result};
pub use ledger::{Progress, TokenLedger};
pub use routes::{CallbackParams, count_eligible_members, router};
pub use server::{CollectionOutcome, CollectionServer};
pub use state::AppState;
pub use tunnel::{
    DEFAULT_NGROK_API_URL, NGROK_API_URL_ENV, NgrokTunnel, StaticTunnel, Tunnel, TunnelError,
};
