//! End-to-end collection over a real listener against a mock Slack API.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::json;
use snapshotter_oauth::{
    AppState, CollectionOutcome, CollectionServer, OAuthConfig, Progress, StaticTunnel,
};
use snapshotter_slack::{SlackClient, TokenStore};
use tokio::net::TcpListener;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PUBLIC_URL: &str = "https://collector.example.test";

async fn mount_access(slack: &MockServer, members: usize) {
    for n in 1..=members {
        Mock::given(method("POST"))
            .and(path("/api/oauth.v2.access"))
            .and(body_string_contains(format!("code=code-{}&", n)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "authed_user": {"id": format!("U{}", n), "access_token": format!("xoxp-{}", n)}
            })))
            .expect(1)
            .mount(slack)
            .await;
    }
}

async fn mount_slack(slack: &MockServer, members: usize) {
    mount_access(slack, members).await;

    Mock::given(method("GET"))
        .and(path("/api/users.list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "members": [
                {"id": "U1"}, {"id": "U2"}, {"id": "U3"},
                {"id": "USLACKBOT"},
                {"id": "B1", "is_bot": true},
                {"id": "G1", "is_restricted": true}
            ]
        })))
        .expect(1)
        .mount(slack)
        .await;
}

struct Running {
    addr: SocketAddr,
    state: AppState,
    progress: tokio::sync::watch::Receiver<Progress>,
    handle: tokio::task::JoinHandle<snapshotter_oauth::Result<CollectionOutcome>>,
}

fn config() -> OAuthConfig {
    OAuthConfig::new("cid", "secret")
        .with_poll_interval(Duration::from_millis(10))
        .with_page_delay(Duration::from_millis(1))
}

async fn start(slack: &MockServer, store: TokenStore) -> Result<Running> {
    start_with(slack, store, config()).await
}

async fn start_with(slack: &MockServer, store: TokenStore, config: OAuthConfig) -> Result<Running> {
    let client = SlackClient::builder()
        .base_url(format!("{}/api", slack.uri()))
        .build()?;

    let server = CollectionServer::new(config, client, store, Arc::new(StaticTunnel::new(PUBLIC_URL)));
    let state = server.state().clone();
    let progress = server.subscribe();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(server.run(listener));

    for _ in 0..100 {
        if state.public_url().is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    anyhow::ensure!(state.public_url().is_some(), "public URL never published");

    Ok(Running {
        addr,
        state,
        progress,
        handle,
    })
}

fn browser() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()?)
}

/// Visit /install and return the issued state.
async fn install(http: &reqwest::Client, addr: SocketAddr) -> Result<String> {
    let response = http.get(format!("http://{}/install", addr)).send().await?;
    anyhow::ensure!(response.status() == 307, "unexpected status {}", response.status());

    let location = response
        .headers()
        .get("location")
        .context("no location header")?
        .to_str()?;
    let params: HashMap<_, _> = url::Url::parse(location)?
        .query_pairs()
        .into_owned()
        .collect();
    assert_eq!(params["redirect_uri"], PUBLIC_URL);
    params.get("state").cloned().context("no state in redirect")
}

async fn callback(
    http: &reqwest::Client,
    addr: SocketAddr,
    code: &str,
    state: &str,
) -> Result<reqwest::Response> {
    Ok(http
        .get(format!("http://{}/", addr))
        .query(&[("code", code), ("state", state)])
        .send()
        .await?)
}

#[tokio::test]
async fn test_collection_completes_after_every_member() -> Result<()> {
    let slack = MockServer::start().await;
    mount_slack(&slack, 3).await;
    let dir = tempfile::tempdir()?;
    let running = start(&slack, TokenStore::in_dir(dir.path())).await?;
    let http = browser()?;

    for n in 1..=3 {
        let state = install(&http, running.addr).await?;
        let response = callback(&http, running.addr, &format!("code-{}", n), &state).await?;
        assert_eq!(response.status(), 200);
        assert_eq!(response.headers()["cache-control"], "no-store");
        assert!(response.text().await?.contains("token acquired"));

        if n < 3 {
            assert!(!running.state.shutdown.is_cancelled());
        }
    }

    let outcome = tokio::time::timeout(Duration::from_secs(5), running.handle).await???;
    assert_eq!(outcome, CollectionOutcome::Complete);
    assert_eq!(running.state.ledger.lock().expected_total(), Some(3));
    assert_eq!(*running.progress.borrow(), Progress::Complete);

    let tokens = TokenStore::in_dir(dir.path()).load()?;
    assert_eq!(tokens.len(), 3);
    assert_eq!(tokens.get("U2"), Some("xoxp-2"));
    Ok(())
}

#[tokio::test]
async fn test_replayed_callback_is_rejected() -> Result<()> {
    let slack = MockServer::start().await;
    mount_slack(&slack, 1).await;
    let dir = tempfile::tempdir()?;
    let running = start(&slack, TokenStore::in_dir(dir.path())).await?;
    let http = browser()?;

    let state = install(&http, running.addr).await?;
    assert_eq!(callback(&http, running.addr, "code-1", &state).await?.status(), 200);

    let replay = callback(&http, running.addr, "code-1", &state).await?;
    assert_eq!(replay.status(), 403);
    let body: serde_json::Value = replay.json().await?;
    assert_eq!(body["code"], "invalid_state");
    assert_eq!(body["reason"], "request state parameter is not valid");

    running.state.shutdown.cancel();
    let outcome = running.handle.await??;
    assert_eq!(outcome, CollectionOutcome::Interrupted);
    assert_eq!(TokenStore::in_dir(dir.path()).load()?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_expired_callback_reports_expiry_while_running() -> Result<()> {
    let slack = MockServer::start().await;
    let dir = tempfile::tempdir()?;
    let config = config().with_challenge_ttl(Duration::from_millis(300));
    let running = start_with(&slack, TokenStore::in_dir(dir.path()), config).await?;
    let http = browser()?;

    let state = install(&http, running.addr).await?;
    // Past the TTL but well within the purge window, with many watcher ticks in between.
    tokio::time::sleep(Duration::from_millis(450)).await;

    let response = callback(&http, running.addr, "code-1", &state).await?;
    assert_eq!(response.status(), 403);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["code"], "expired_state");
    assert_eq!(body["reason"], "request state parameter is expired");

    running.state.shutdown.cancel();
    let outcome = running.handle.await??;
    assert_eq!(outcome, CollectionOutcome::Interrupted);
    assert!(!TokenStore::in_dir(dir.path()).exists());
    Ok(())
}

#[tokio::test]
async fn test_zero_member_count_is_recounted() -> Result<()> {
    let slack = MockServer::start().await;
    mount_access(&slack, 2).await;

    Mock::given(method("GET"))
        .and(path("/api/users.list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "members": [{"id": "B1", "is_bot": true}]
        })))
        .up_to_n_times(1)
        .with_priority(1)
        .expect(1)
        .mount(&slack)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/users.list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "members": [{"id": "U1"}, {"id": "U2"}, {"id": "B1", "is_bot": true}]
        })))
        .expect(1)
        .mount(&slack)
        .await;

    let dir = tempfile::tempdir()?;
    let running = start(&slack, TokenStore::in_dir(dir.path())).await?;
    let http = browser()?;

    let state = install(&http, running.addr).await?;
    assert_eq!(callback(&http, running.addr, "code-1", &state).await?.status(), 200);
    assert_eq!(running.state.ledger.lock().expected_total(), Some(0));
    assert!(!running.state.shutdown.is_cancelled());

    let state = install(&http, running.addr).await?;
    assert_eq!(callback(&http, running.addr, "code-2", &state).await?.status(), 200);

    let outcome = tokio::time::timeout(Duration::from_secs(5), running.handle).await???;
    assert_eq!(outcome, CollectionOutcome::Complete);
    assert_eq!(running.state.ledger.lock().expected_total(), Some(2));
    assert_eq!(TokenStore::in_dir(dir.path()).load()?.len(), 2);
    Ok(())
}
