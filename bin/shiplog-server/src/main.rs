//! shiplog-server – entry point.
//!
//! Startup order:
//! 1. Parse configuration from environment variables.
//! 2. Initialise structured tracing (JSON in production, pretty in dev).
//! 3. Open the SQLite database and run pending migrations.
//! 4. Fail jobs orphaned by a previous process.
//! 5. Build the external collaborators (GitHub, summarizer, renderer).
//! 6. Build the Axum router and start the HTTP server with graceful shutdown.

mod config;
mod entities;
mod error;
mod jobs;
mod middleware;
mod pipeline;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

use shiplog_github::GithubStatsFetcher;
use shiplog_narrate::GenAiSummarizer;
use shiplog_render::{HttpRenderBackend, RenderOrchestrator};

use crate::config::Config;
use crate::entities::{JobStore, SqliteStore};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Configuration ───────────────────────────────────────────────────────
    let cfg = Config::from_env();

    // ── 2. Tracing ─────────────────────────────────────────────────────────────
    // Build the log-level filter, warning loudly if the configured value is
    // not a valid tracing filter expression.
    let env_filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match cfg.log_level.parse::<tracing_subscriber::EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: SHIPLOG_LOG='{}' is not a valid tracing filter ({}); \
                     falling back to 'info'",
                    cfg.log_level, e
                );
                tracing_subscriber::EnvFilter::new("info")
            }
        },
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);

    if cfg.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!(version = env!("CARGO_PKG_VERSION"), "shiplog-server starting");

    // ── 3. Database ────────────────────────────────────────────────────────────
    let store = SqliteStore::connect(&cfg.database_url).await?;
    info!(database_url = %cfg.database_url, "database ready");

    // ── 4. Orphaned jobs ───────────────────────────────────────────────────────
    // Jobs left queued/processing by a previous process can never make
    // progress again; fail them so callers see a terminal state.
    let interrupted = store.fail_interrupted_jobs().await?;
    if interrupted > 0 {
        warn!(interrupted, "failed jobs orphaned by a previous run");
    }

    // ── 5. Collaborators ───────────────────────────────────────────────────────
    let stats = GithubStatsFetcher::new(cfg.github_api.clone(), cfg.github_token.clone());
    let summarizer = GenAiSummarizer::new(cfg.model.clone());
    let renderer = RenderOrchestrator::new(HttpRenderBackend::new(
        cfg.render_url.clone(),
        cfg.render_token.clone(),
    ));

    // ── 6. Shared application state ────────────────────────────────────────────
    let state = Arc::new(AppState {
        config: Arc::new(cfg.clone()),
        store: Arc::new(store),
        stats: Arc::new(stats),
        summarizer: Arc::new(summarizer),
        renderer: Arc::new(renderer),
        http: reqwest::Client::new(),
    });

    // ── 7. HTTP server with graceful shutdown ──────────────────────────────────
    let app = routes::build(Arc::clone(&state));
    let addr: SocketAddr = cfg.bind_address.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shiplog-server stopped");
    Ok(())
}

/// Returns a future that resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
