//! Slack Web API client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::error::{Result, SlackError};
use crate::paginate::{Page, PagedRpc};
use crate::types::{AuthTest, OAuthAccess};

/// Slack Web API base URL.
pub const SLACK_API_URL: &str = "https://slack.com/api/";

/// Default timeout for requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Page size requested from cursor-paged methods.
const PAGE_LIMIT: &str = "200";

/// Slack Web API client.
///
/// Cheap to clone; clones share one connection pool.
///
/// # Example
///
/// ```no_run
/// use snapshotter_slack::SlackClient;
///
/// # async fn example() -> snapshotter_slack::Result<()> {
/// let client = SlackClient::builder().build()?;
/// let identity = client.auth_test("xoxp-...").await?;
/// println!("{}", identity.team_id);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SlackClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl std::fmt::Debug for SlackClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackClient")
            .field("base_url", &self.inner.base_url.as_str())
            .finish()
    }
}

impl SlackClient {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    fn url(&self, method: &str) -> Result<Url> {
        self.inner.base_url.join(method).map_err(SlackError::from)
    }

    /// Call a read method on behalf of `token`.
    pub async fn call(&self, method: &str, token: &str, params: &[(&str, &str)]) -> Result<Value> {
        let url = self.url(method)?;
        tracing::trace!(method, "Slack API call");
        let response = self
            .inner
            .http
            .get(url)
            .bearer_auth(token)
            .query(params)
            .timeout(self.inner.timeout)
            .send()
            .await?;
        self.handle_response(method, response).await
    }

    /// Call a method with a form body and no bearer token.
    async fn post_form(&self, method: &str, form: &[(&str, &str)]) -> Result<Value> {
        let url = self.url(method)?;
        tracing::trace!(method, "Slack API call");
        let response = self
            .inner
            .http
            .post(url)
            .form(form)
            .timeout(self.inner.timeout)
            .send()
            .await?;
        self.handle_response(method, response).await
    }

    /// Check the HTTP status and Slack's `ok` flag.
    async fn handle_response(&self, method: &str, response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            return Err(SlackError::Status {
                method: method.to_string(),
                status: status.as_u16(),
            });
        }

        let body: Value = response.json().await?;
        if body.get("ok").and_then(Value::as_bool) == Some(true) {
            Ok(body)
        } else {
            let error = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error")
                .to_string();
            Err(SlackError::Api {
                method: method.to_string(),
                error,
            })
        }
    }

    fn decode<T: DeserializeOwned>(method: &str, body: Value) -> Result<T> {
        serde_json::from_value(body).map_err(|e| SlackError::decode(method, e.to_string()))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Exchange an authorization code for a user token (`oauth.v2.access`).
    pub async fn oauth_v2_access(
        &self,
        client_id: &str,
        client_secret: &str,
        code: &str,
        redirect_uri: &str,
    ) -> Result<OAuthAccess> {
        const METHOD: &str = "oauth.v2.access";
        let body = self
            .post_form(
                METHOD,
                &[
                    ("code", code),
                    ("client_id", client_id),
                    ("client_secret", client_secret),
                    ("redirect_uri", redirect_uri),
                ],
            )
            .await?;
        Self::decode(METHOD, body)
    }

    /// Resolve the identity behind a token (`auth.test`).
    pub async fn auth_test(&self, token: &str) -> Result<AuthTest> {
        const METHOD: &str = "auth.test";
        let body = self.call(METHOD, token, &[]).await?;
        Self::decode(METHOD, body)
    }

    /// Paged `users.list`.
    pub fn users_list(&self, token: &str) -> SlackMethod {
        SlackMethod::new(self.clone(), "users.list", "members", token)
    }

    /// Paged `users.conversations` restricted to `types`.
    pub fn users_conversations(&self, token: &str, types: &str) -> SlackMethod {
        SlackMethod::new(self.clone(), "users.conversations", "channels", token)
            .with_param("types", types)
    }

    /// Paged `conversations.history` of one channel.
    pub fn conversations_history(&self, token: &str, channel: &str) -> SlackMethod {
        SlackMethod::new(self.clone(), "conversations.history", "messages", token)
            .with_param("channel", channel)
    }
}

/// A cursor-paged Slack method bound to a token and fixed parameters.
#[derive(Clone)]
pub struct SlackMethod {
    client: SlackClient,
    method: &'static str,
    items_key: &'static str,
    token: String,
    params: Vec<(String, String)>,
}

impl std::fmt::Debug for SlackMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackMethod")
            .field("method", &self.method)
            .field("params", &self.params)
            .finish()
    }
}

impl SlackMethod {
    fn new(client: SlackClient, method: &'static str, items_key: &'static str, token: &str) -> Self {
        Self {
            client,
            method,
            items_key,
            token: token.to_string(),
            params: vec![("limit".to_string(), PAGE_LIMIT.to_string())],
        }
    }

    /// Add a fixed query parameter.
    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        self.params.push((key.to_string(), value.to_string()));
        self
    }

    pub fn method(&self) -> &str {
        self.method
    }
}

#[async_trait]
impl PagedRpc for SlackMethod {
    async fn fetch(&self, cursor: Option<&str>) -> Result<Page> {
        let mut params: Vec<(&str, &str)> = self
            .params
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor));
        }

        let body = self.client.call(self.method, &self.token, &params).await?;
        Page::from_response(self.method, self.items_key, body)
    }
}

/// Builder for creating a [`SlackClient`].
#[derive(Debug)]
pub struct ClientBuilder {
    base_url: String,
    timeout: Duration,
    user_agent: Option<String>,
}

impl ClientBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            base_url: SLACK_API_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: None,
        }
    }

    /// Override the API base URL (used against mock servers).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set a custom user agent.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<SlackClient> {
        let mut base = self.base_url;
        // Url::join drops the last path segment unless it ends with '/'
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)?;

        let mut headers = HeaderMap::new();
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| format!("snapshotter/{}", env!("CARGO_PKG_VERSION")));
        if let Ok(value) = HeaderValue::from_str(&user_agent) {
            headers.insert(USER_AGENT, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(SlackClient {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                timeout: self.timeout,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
