//! Public URL providers for the local collection service.
//!
//! Slack must be able to redirect members back to the service, so the local
//! listener is exposed through a [`Tunnel`]. [`NgrokTunnel`] drives a running
//! ngrok agent over its local REST API; [`StaticTunnel`] is for services
//! already reachable behind a reverse proxy.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

/// Default ngrok agent API address.
pub const DEFAULT_NGROK_API_URL: &str = "http://127.0.0.1:4040";

/// Environment variable overriding the ngrok agent API address.
pub const NGROK_API_URL_ENV: &str = "NGROK_API_URL";

/// Tunnel errors.
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("tunnel agent unreachable: {0}")]
    Http(#[from] reqwest::Error),

    #[error("tunnel agent returned {status}: {message}")]
    Agent { status: u16, message: String },

    #[error("tunnel {0} has no public URL")]
    NoPublicUrl(String),
}

/// Exposes a local address under a public URL.
#[async_trait]
pub trait Tunnel: Send + Sync {
    /// Open the tunnel and return its public URL.
    async fn connect(&self, local_addr: SocketAddr) -> Result<String, TunnelError>;

    /// Close the tunnel previously opened for `public_url`.
    async fn disconnect(&self, public_url: &str) -> Result<(), TunnelError>;
}

/// A fixed public URL managed outside this process.
#[derive(Debug, Clone)]
pub struct StaticTunnel {
    public_url: String,
}

impl StaticTunnel {
    pub fn new(public_url: impl Into<String>) -> Self {
        let public_url: String = public_url.into();
        Self {
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Tunnel for StaticTunnel {
    async fn connect(&self, _local_addr: SocketAddr) -> Result<String, TunnelError> {
        Ok(self.public_url.clone())
    }

    async fn disconnect(&self, _public_url: &str) -> Result<(), TunnelError> {
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TunnelInfo {
    name: String,
    #[serde(default)]
    public_url: String,
}

#[derive(Debug, Deserialize)]
struct TunnelList {
    tunnels: Vec<TunnelInfo>,
}

/// HTTP tunnel through a locally running ngrok agent.
#[derive(Debug, Clone)]
pub struct NgrokTunnel {
    http: reqwest::Client,
    api_url: String,
    name: String,
}

impl NgrokTunnel {
    pub fn new(api_url: impl Into<String>) -> Self {
        let api_url: String = api_url.into();
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            name: format!("snapshotter-{}", std::process::id()),
        }
    }

    /// Agent at `NGROK_API_URL`, or the default local address.
    pub fn from_env() -> Self {
        let api_url = std::env::var(NGROK_API_URL_ENV)
            .ok()
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_NGROK_API_URL.to_string());
        Self::new(api_url)
    }

    /// Override the tunnel name registered with the agent.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/tunnels{}", self.api_url, path)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, TunnelError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(TunnelError::Agent {
            status: status.as_u16(),
            message,
        })
    }

    /// Look the tunnel up in the agent's list; HTTPS URLs are preferred.
    async fn lookup(&self) -> Result<String, TunnelError> {
        let response = self.http.get(self.endpoint("")).send().await?;
        let list: TunnelList = Self::check(response).await?.json().await?;

        let mut urls: Vec<String> = list
            .tunnels
            .into_iter()
            .filter(|t| t.name == self.name || t.name.starts_with(&format!("{} ", self.name)))
            .map(|t| t.public_url)
            .filter(|url| !url.is_empty())
            .collect();
        urls.sort_by_key(|url| !url.starts_with("https://"));

        urls.into_iter()
            .next()
            .ok_or_else(|| TunnelError::NoPublicUrl(self.name.clone()))
    }
}

#[async_trait]
impl Tunnel for NgrokTunnel {
    async fn connect(&self, local_addr: SocketAddr) -> Result<String, TunnelError> {
        let body = json!({
            "name": self.name,
            "proto": "http",
            "addr": local_addr.to_string(),
        });

        let response = self
            .http
            .post(self.endpoint(""))
            .json(&body)
            .timeout(Duration::from_secs(10))
            .send()
            .await?;
        let created: TunnelInfo = Self::check(response).await?.json().await?;
        tracing::debug!(name = %created.name, addr = %local_addr, "Tunnel created");

        if created.public_url.is_empty() {
            self.lookup().await
        } else {
            Ok(created.public_url)
        }
    }

    async fn disconnect(&self, public_url: &str) -> Result<(), TunnelError> {
        let response = self
            .http
            .delete(self.endpoint(&format!("/{}", self.name)))
            .timeout(Duration::from_secs(5))
            .send()
            .await?;
        Self::check(response).await?;
        tracing::debug!(url = public_url, "Tunnel closed");
        Ok(())
    }
}
