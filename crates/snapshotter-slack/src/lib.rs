//! Slack Web API plumbing for snapshotter.
//!
//! # Components
//!
//! - [`client`]: reqwest-based binding for the handful of Web API methods we use
//! - [`paginate`]: cursor-following page stream over any [`PagedRpc`]
//! - [`tokens`]: `tokens.json` persistence for collected user tokens
//! - [`types`]: response types and the member eligibility rule

pub mod client;
pub mod error;
pub mod paginate;
pub mod tokens;
pub mod types;

pub use client::{ClientBuilder, SLACK_API_URL, SlackClient, SlackMethod};
pub use error::{Result, SlackError, TokenStoreError};
pub use paginate::{DEFAULT_PAGE_DELAY, Page, PageStream, PagedRpc, paginate};
pub use tokens::{AccessToken, TOKEN_FILE, TokenSet, TokenStore};
pub use types::{AuthTest, AuthedUser, OAuthAccess, Record, SLACKBOT_ID, is_eligible_member};
