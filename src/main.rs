use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use review_relay::analysis::{AnalysisClient, GeminiBackend};
use review_relay::bitbucket::BitbucketClient;
use review_relay::config::Config;
use review_relay::pipeline::Pipeline;
use review_relay::server::{AppState, build_router};
use review_relay::webhooks::parse_pull_request_payload;
use review_relay::worker::{Dispatcher, WorkerPool};

/// Reviews Bitbucket pull requests with Gemini and posts the result as a comment.
#[derive(Parser, Debug)]
#[command(name = "review-relay", version, about)]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the webhook server (default).
    Serve,

    /// Run the review pipeline once for a saved webhook payload, bypassing
    /// deduplication and the journal.
    Replay {
        #[arg(value_name = "PAYLOAD_JSON")]
        payload: PathBuf,
    },

    /// Analyze a diff file and print the report without posting it.
    Analyze {
        #[arg(value_name = "DIFF")]
        diff: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "review_relay=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(cli.config).await,
        Command::Replay { payload } => replay(&cli.config, &payload).await,
        Command::Analyze { diff } => analyze(&cli.config, &diff).await,
    }
}

fn build_pipeline(config: &Config) -> Result<Pipeline<BitbucketClient, GeminiBackend>> {
    let host = BitbucketClient::new(config.bitbucket()).context("building Bitbucket client")?;
    let backend = GeminiBackend::new(config.gemini()).context("building Gemini client")?;
    Ok(Pipeline::new(
        host,
        AnalysisClient::with_retry(backend, config.retry()),
    ))
}

async fn serve(config: Config) -> Result<()> {
    let missing = config.missing_credentials();
    if !missing.is_empty() {
        warn!(missing = ?missing, "Credentials not configured, reviews will fail until they are set");
    }

    let (dedupe, journal) = config.open_stores().context("opening state stores")?;
    let journal = Arc::new(journal);
    info!(
        state_dir = ?config.state_dir,
        markers = dedupe.len(),
        records = journal.len(),
        "Stores ready"
    );

    let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
    let pipeline = Arc::new(build_pipeline(&config)?);
    let pool = WorkerPool::spawn(config.workers, rx, pipeline, journal.clone());
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(dedupe), journal, tx));

    let state = AppState::new(dispatcher.clone(), missing, config.webhook_secret());
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    info!("listening on {}", config.bind);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    info!("HTTP server stopped, draining workers");
    dispatcher.close();
    pool.shutdown(config.shutdown_grace()).await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

async fn replay(config: &Config, payload: &Path) -> Result<()> {
    let body = std::fs::read(payload).with_context(|| format!("reading {}", payload.display()))?;
    let event = parse_pull_request_payload(&body).context("decoding payload")?;
    info!(pr = %event.pr, key = %event.idempotency_key(), state = %event.state, "Replaying event");

    if !event.is_open() {
        println!("Pull request {} is {}, nothing to do.", event.pr, event.state);
        return Ok(());
    }

    let completion = build_pipeline(config)?.run(&event).await;
    println!("{}", serde_json::to_string_pretty(&completion)?);
    Ok(())
}

async fn analyze(config: &Config, diff: &Path) -> Result<()> {
    let diff = std::fs::read_to_string(diff).with_context(|| format!("reading {}", diff.display()))?;
    let backend = GeminiBackend::new(config.gemini()).context("building Gemini client")?;
    let retry = config.retry();
    info!(
        has_api_key = backend.has_api_key(),
        attempts = retry.max_attempts,
        max_backoff_secs = retry.total_max_wait().as_secs(),
        "Analyzing diff"
    );
    let report = AnalysisClient::with_retry(backend, retry)
        .analyze(&diff)
        .await;
    println!("{}", report);
    if report.is_error() {
        anyhow::bail!("analysis failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::parse_from(["review-relay"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.config.bind.port(), 5000);
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = Cli::parse_from(["review-relay", "serve", "--workers", "8"]);
        assert!(matches!(cli.command, Some(Command::Serve)));
        assert_eq!(cli.config.workers, 8);
    }

    #[test]
    fn replay_takes_a_payload_path() {
        let cli = Cli::parse_from(["review-relay", "replay", "payload.json"]);
        match cli.command {
            Some(Command::Replay { payload }) => assert_eq!(payload, PathBuf::from("payload.json")),
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
