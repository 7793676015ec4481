//! The collection service: router, tunnel lifecycle and completion watcher.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use snapshotter_slack::{SlackClient, TokenStore};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::OAuthConfig;
use crate::error::Result;
use crate::ledger::Progress;
use crate::routes;
use crate::state::AppState;
use crate::tunnel::Tunnel;

/// How a collection run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionOutcome {
    /// Every eligible member authorized.
    Complete,
    /// Stopped before completion; whatever was collected has been saved.
    Interrupted,
}

/// Local OAuth service collecting one user token per workspace member.
pub struct CollectionServer {
    state: AppState,
    store: TokenStore,
    tunnel: Arc<dyn Tunnel>,
    progress: watch::Sender<Progress>,
}

impl CollectionServer {
    pub fn new(
        config: OAuthConfig,
        slack: SlackClient,
        store: TokenStore,
        tunnel: Arc<dyn Tunnel>,
    ) -> Self {
        let (progress, _) = watch::channel(Progress::Waiting);
        Self {
            state: AppState::new(config, slack),
            store,
            tunnel,
            progress,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Token that stops the service when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.state.shutdown.clone()
    }

    /// Subscribe to progress updates.
    pub fn subscribe(&self) -> watch::Receiver<Progress> {
        self.progress.subscribe()
    }

    /// Build the axum router.
    pub fn router(&self) -> Router {
        routes::router(self.state.clone())
    }

    /// Serve on `listener` until every member authorized or the shutdown
    /// token is cancelled, then save the collected tokens.
    pub async fn run(self, listener: TcpListener) -> Result<CollectionOutcome> {
        let local_addr = listener.local_addr()?;
        let shutdown = self.state.shutdown.clone();
        info!(addr = %local_addr, "Starting collection service");

        let serve = async {
            axum::serve(listener, self.router())
                .with_graceful_shutdown(shutdown.clone().cancelled_owned())
                .await
        };
        let tunnel = run_tunnel(self.tunnel.clone(), self.state.clone(), local_addr);
        let watcher = watch_completion(self.state.clone(), self.store.clone(), self.progress.clone());

        let (served, tunneled, saved) = tokio::join!(serve, tunnel, watcher);
        let saved = saved?;
        if !saved {
            self.save_partial()?;
        }
        served?;
        tunneled?;

        Ok(if saved {
            CollectionOutcome::Complete
        } else {
            CollectionOutcome::Interrupted
        })
    }

    /// Write whatever was collected before the service stopped.
    fn save_partial(&self) -> Result<()> {
        let tokens = self.state.ledger.lock().tokens().clone();
        if tokens.is_empty() {
            info!("Collection interrupted before any token was acquired");
            return Ok(());
        }

        self.store.save(&tokens)?;
        warn!(
            collected = tokens.len(),
            path = %self.store.path().display(),
            "Collection interrupted, partial tokens saved"
        );
        Ok(())
    }
}

/// Connect the tunnel, publish its URL, and disconnect on shutdown.
async fn run_tunnel(tunnel: Arc<dyn Tunnel>, state: AppState, local_addr: SocketAddr) -> Result<()> {
    let connected = tokio::select! {
        connected = tunnel.connect(local_addr) => connected,
        _ = state.shutdown.cancelled() => return Ok(()),
    };

    let public_url = match connected {
        Ok(url) => url,
        Err(e) => {
            error!(error = %e, "Tunnel connection failed");
            state.shutdown.cancel();
            return Err(e.into());
        }
    };

    state.publish_url(public_url.clone());
    info!(url = %public_url, "Public URL published");

    state.shutdown.cancelled().await;

    if let Err(e) = tunnel.disconnect(&public_url).await {
        debug!(error = %e, "Tunnel disconnect failed");
    }
    Ok(())
}

/// Publish progress every tick; on completion save the tokens and shut down.
///
/// Returns whether the tokens were saved here.
async fn watch_completion(
    state: AppState,
    store: TokenStore,
    progress: watch::Sender<Progress>,
) -> Result<bool> {
    let mut ticker = tokio::time::interval(state.config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => return Ok(false),
            _ = ticker.tick() => {}
        }

        let purged = state.challenges.lock().purge_expired(Instant::now());
        if purged > 0 {
            debug!(purged, "Expired handshake states dropped");
        }

        let (current, completed) = {
            let ledger = state.ledger.lock();
            let completed = ledger.is_complete().then(|| ledger.tokens().clone());
            (ledger.progress(), completed)
        };
        progress.send_if_modified(|published| {
            let changed = *published != current;
            *published = current;
            changed
        });

        if let Some(tokens) = completed {
            let saved = store.save(&tokens);
            state.shutdown.cancel();
            saved?;

            progress.send_replace(Progress::Complete);
            info!(
                collected = tokens.len(),
                path = %store.path().display(),
                "All tokens received"
            );
            return Ok(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OAuthError;
    use crate::tunnel::{StaticTunnel, TunnelError};
    use async_trait::async_trait;
    use snapshotter_slack::AccessToken;
    use std::time::Duration;

    /// Tunnel whose agent never hands out a public URL.
    struct UnreachableTunnel;

    #[async_trait]
    impl Tunnel for UnreachableTunnel {
        async fn connect(
            &self,
            _local_addr: SocketAddr,
        ) -> std::result::Result<String, TunnelError> {
            Err(TunnelError::NoPublicUrl("agent has no tunnels".to_string()))
        }

        async fn disconnect(&self, _public_url: &str) -> std::result::Result<(), TunnelError> {
            Ok(())
        }
    }

    fn server_with(dir: &std::path::Path, tunnel: Arc<dyn Tunnel>) -> CollectionServer {
        let config = OAuthConfig::new("cid", "secret").with_poll_interval(Duration::from_millis(5));
        let slack = SlackClient::builder()
            .base_url("http://127.0.0.1:9/api")
            .build()
            .unwrap();
        CollectionServer::new(config, slack, TokenStore::in_dir(dir), tunnel)
    }

    fn server(dir: &std::path::Path) -> CollectionServer {
        server_with(
            dir,
            Arc::new(StaticTunnel::new("https://collector.example.test")),
        )
    }

    async fn listener() -> TcpListener {
        TcpListener::bind("127.0.0.1:0").await.unwrap()
    }

    #[tokio::test]
    async fn test_completion_saves_and_stops() {
        let temp = tempfile::tempdir().unwrap();
        let server = server(temp.path());
        let state = server.state().clone();
        let progress = server.subscribe();
        {
            let mut ledger = state.ledger.lock();
            ledger.set_expected_total(2);
            ledger.record(AccessToken::new("U1", "a"));
            ledger.record(AccessToken::new("U2", "b"));
        }

        let outcome = tokio::time::timeout(Duration::from_secs(5), server.run(listener().await))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcome, CollectionOutcome::Complete);
        assert!(state.shutdown.is_cancelled());
        assert_eq!(*progress.borrow(), Progress::Complete);

        let saved = TokenStore::in_dir(temp.path()).load().unwrap();
        assert_eq!(saved.len(), 2);
    }

    #[tokio::test]
    async fn test_interrupt_saves_partial_tokens() {
        let temp = tempfile::tempdir().unwrap();
        let server = server(temp.path());
        let state = server.state().clone();
        {
            let mut ledger = state.ledger.lock();
            ledger.set_expected_total(3);
            ledger.record(AccessToken::new("U1", "a"));
        }

        let handle = tokio::spawn(server.run(listener().await));
        tokio::time::sleep(Duration::from_millis(50)).await;
        state.shutdown.cancel();

        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome, CollectionOutcome::Interrupted);
        let saved = TokenStore::in_dir(temp.path()).load().unwrap();
        assert_eq!(saved.owners().collect::<Vec<_>>(), vec!["U1"]);
    }

    #[tokio::test]
    async fn test_interrupt_without_tokens_writes_nothing() {
        let temp = tempfile::tempdir().unwrap();
        let server = server(temp.path());
        server.shutdown_token().cancel();

        let outcome = server.run(listener().await).await.unwrap();
        assert_eq!(outcome, CollectionOutcome::Interrupted);
        assert!(!TokenStore::in_dir(temp.path()).exists());
    }

    #[tokio::test]
    async fn test_failed_run_still_saves_partial_tokens() {
        let temp = tempfile::tempdir().unwrap();
        let server = server_with(temp.path(), Arc::new(UnreachableTunnel));
        server
            .state()
            .ledger
            .lock()
            .record(AccessToken::new("U1", "a"));

        let result = tokio::time::timeout(Duration::from_secs(5), server.run(listener().await))
            .await
            .unwrap();

        assert!(matches!(result, Err(OAuthError::Tunnel(_))));
        let saved = TokenStore::in_dir(temp.path()).load().unwrap();
        assert_eq!(saved.get("U1"), Some("a"));
    }
}
