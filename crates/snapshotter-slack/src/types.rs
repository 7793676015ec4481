//! Response types for the Slack Web API methods we call.

use serde::Deserialize;
use serde_json::Value;

use crate::tokens::AccessToken;

/// A raw Slack object (member, channel, message) as returned by the API.
pub type Record = serde_json::Map<String, Value>;

/// Member ID of the built-in Slackbot account.
pub const SLACKBOT_ID: &str = "USLACKBOT";

/// Response of `oauth.v2.access` when user scopes were requested.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthAccess {
    pub authed_user: AuthedUser,
}

/// The individual who authorized the app, with their user token.
#[derive(Clone, Deserialize)]
pub struct AuthedUser {
    pub id: String,
    pub access_token: String,
}

impl std::fmt::Debug for AuthedUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthedUser")
            .field("id", &self.id)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

impl AuthedUser {
    /// Convert into the token record kept by the collection service.
    pub fn into_token(self) -> AccessToken {
        AccessToken::new(self.id, self.access_token)
    }
}

/// Response of `auth.test`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthTest {
    pub team_id: String,
    pub user_id: String,
}

/// Whether a `users.list` member is expected to grant access.
///
/// Slackbot, bots, app users, pending invitations and guests can never
/// complete the user OAuth flow, so they do not count towards the quota.
pub fn is_eligible_member(member: &Value) -> bool {
    let flag = |key: &str| member.get(key).and_then(Value::as_bool).unwrap_or(false);

    let is_slackbot = member.get("id").and_then(Value::as_str) == Some(SLACKBOT_ID);

    !(is_slackbot
        || flag("is_bot")
        || flag("is_app_user")
        || flag("is_invited_user")
        || flag("is_restricted")
        || flag("is_ultra_restricted"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_regular_member_is_eligible() {
        assert!(is_eligible_member(&json!({"id": "U1", "is_bot": false})));
        assert!(is_eligible_member(&json!({"id": "U2"})));
    }

    #[test]
    fn test_ineligible_members() {
        assert!(!is_eligible_member(&json!({"id": "USLACKBOT"})));
        assert!(!is_eligible_member(&json!({"id": "B1", "is_bot": true})));
        assert!(!is_eligible_member(&json!({"id": "U3", "is_app_user": true})));
        assert!(!is_eligible_member(&json!({"id": "U4", "is_invited_user": true})));
        assert!(!is_eligible_member(&json!({"id": "U5", "is_restricted": true})));
        assert!(!is_eligible_member(&json!({"id": "U6", "is_ultra_restricted": true})));
    }

    #[test]
    fn test_authed_user_debug_hides_token() {
        let user = AuthedUser {
            id: "U1".to_string(),
            access_token: "xoxp-secret".to_string(),
        };
        let debug = format!("{:?}", user);
        assert!(debug.contains("U1"));
        assert!(!debug.contains("xoxp-secret"));
    }

    #[test]
    fn test_oauth_access_parses() {
        let access: OAuthAccess = serde_json::from_value(json!({
            "ok": true,
            "authed_user": {"id": "U1", "access_token": "xoxp-1", "scope": "users:read"},
            "team": {"id": "T1"}
        }))
        .unwrap();
        assert_eq!(access.authed_user.id, "U1");
        assert_eq!(access.authed_user.into_token().secret, "xoxp-1");
    }
}
