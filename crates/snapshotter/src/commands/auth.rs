//! Auth command - runs the token collection service.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::Args;
use console::Style;
use indicatif::{ProgressBar, ProgressStyle};
use snapshotter_oauth::{
    AppState, CollectionOutcome, CollectionServer, NgrokTunnel, OAuthConfig, Progress,
    StaticTunnel, Tunnel,
};
use snapshotter_slack::{SlackClient, TokenStore};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::Context;

/// Arguments for the auth command.
#[derive(Args, Debug)]
pub struct AuthArgs {
    /// Address to listen on
    #[arg(default_value = "localhost")]
    pub host: String,

    /// Port to listen on
    #[arg(default_value_t = 8080)]
    pub port: u16,

    /// Directory where tokens.json is written
    #[arg(long = "keys-file", value_name = "PATH", default_value = ".")]
    pub keys_file: PathBuf,

    /// Use this public URL instead of opening an ngrok tunnel
    #[arg(long, value_name = "URL")]
    pub public_url: Option<String>,
}

/// Run the auth command.
pub async fn run(args: AuthArgs, ctx: &Context) -> Result<()> {
    let config = OAuthConfig::from_env().context("Slack app credentials are required")?;

    std::fs::create_dir_all(&args.keys_file)
        .with_context(|| format!("Failed to create {}", args.keys_file.display()))?;
    let store = TokenStore::in_dir(&args.keys_file);

    let tunnel: Arc<dyn Tunnel> = match &args.public_url {
        Some(url) => Arc::new(StaticTunnel::new(url.as_str())),
        None => Arc::new(NgrokTunnel::from_env()),
    };

    let listener = TcpListener::bind((args.host.as_str(), args.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", args.host, args.port))?;

    let server = CollectionServer::new(config, SlackClient::builder().build()?, store.clone(), tunnel);
    let state = server.state().clone();
    let progress = server.subscribe();
    let shutdown = server.shutdown_token();

    let interrupt = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("Interrupt received");
            interrupt.cancel();
        }
    });

    let render = render_progress(state.clone(), progress, shutdown, ctx.verbose);
    let (outcome, ()) = tokio::join!(server.run(listener), render);
    let outcome = outcome.context("Collection service failed")?;

    let collected = state.ledger.lock().collected();
    let dim = Style::new().dim();
    println!();
    match outcome {
        CollectionOutcome::Complete => {
            let green = Style::new().green().bold();
            println!("{}", green.apply_to("All tokens received, first stage completed"));
            println!(
                "  {} {}",
                dim.apply_to("Saved:"),
                store.path().display()
            );
            println!();
            println!(
                "Now run {} in this directory to begin the workspace snapshot.",
                Style::new().cyan().apply_to("snapshotter collect")
            );
        }
        CollectionOutcome::Interrupted => {
            let yellow = Style::new().yellow();
            println!(
                "{}",
                yellow.apply_to(format!("Collection interrupted with {} token(s)", collected))
            );
            if collected > 0 {
                println!(
                    "  {} {}",
                    dim.apply_to("Saved:"),
                    store.path().display()
                );
            }
        }
    }
    println!();

    Ok(())
}

fn print_banner(public_url: &str, install_url: &str) {
    let bold = Style::new().bold();
    let dim = Style::new().dim();
    println!();
    println!(
        "  {} {}  {}",
        bold.apply_to("Base URL: "),
        public_url,
        dim.apply_to("<- add it as a Redirect URL at the app management page")
    );
    println!(
        "  {} {}  {}",
        bold.apply_to("OAuth URL:"),
        install_url,
        dim.apply_to("<- give it to your workspace's members")
    );
    println!();
}

/// Render watcher updates until the service stops.
async fn render_progress(
    state: AppState,
    mut progress: watch::Receiver<Progress>,
    shutdown: CancellationToken,
    verbose: bool,
) {
    let spinner = if verbose {
        ProgressBar::hidden()
    } else {
        ProgressBar::new_spinner()
    };
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner.set_message("opening tunnel...");

    let mut announced = false;
    loop {
        if !announced
            && let Some(url) = state.public_url()
            && let Some(install_url) = state.install_url()
        {
            spinner.suspend(|| print_banner(&url, &install_url));
            announced = true;
        }

        let current = *progress.borrow_and_update();
        let message = match current {
            Progress::Waiting if announced => "waiting for authorizations...".to_string(),
            Progress::Waiting => "opening tunnel...".to_string(),
            Progress::Collecting {
                collected,
                expected,
            } => format!("access granted by {}/{} members", collected, expected),
            Progress::Complete => break,
        };
        spinner.set_message(message);

        tokio::select! {
            changed = progress.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(Duration::from_millis(250)) => {}
        }
    }

    spinner.finish_and_clear();
}
