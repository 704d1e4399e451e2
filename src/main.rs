// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Form Shield Service
//!
//! Serves sessions to the browser-side form script and gates form
//! submissions behind a honeypot, a single-use token and a rate limit.
//!
//! ## Configuration
//!
//! Configuration is read from an optional file (`--config`) and then from
//! `FORM_SHIELD__*` environment variables, e.g.:
//!
//! - `FORM_SHIELD__BIND_ADDR`: Server bind address (default: 0.0.0.0:8080)
//! - `FORM_SHIELD__SESSION__TTL_SECS`: Session TTL (default: 600)
//! - `FORM_SHIELD__RATE_LIMIT__MAX_REQUESTS`: Submissions per window (default: 100)
//! - `FORM_SHIELD__RATE_LIMIT__WINDOW_SECS`: Window length (default: 3600)
//! - `FORM_SHIELD__SINK__PATH`: JSON-lines file for classified submissions
//!
//! A `.env` file in the working directory is loaded first if present.

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use form_shield::{
    config::Config,
    handlers::{router, AppState},
    sink::{JsonLinesSink, MemorySink, SubmissionSink},
    store::MemoryStore,
};

#[derive(Parser, Debug)]
#[command(
    name = "form-shield",
    version,
    about = "Honeypot and rate-limit gate for form submissions"
)]
struct Args {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the bind address
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let dotenv = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    if let Ok(path) = dotenv {
        debug!(path = %path.display(), "Loaded .env file");
    }

    // Load configuration
    let mut config = Config::load(args.config.as_deref()).context("invalid configuration")?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    info!(
        bind_addr = %config.bind_addr,
        session_ttl_secs = config.session.ttl_secs,
        max_requests = config.rate_limit.max_requests,
        window_secs = config.rate_limit.window_secs,
        honeypot_enabled = config.security.honeypot_enabled,
        "Starting form shield"
    );

    let store = MemoryStore::new();
    let sink: Arc<dyn SubmissionSink> = match &config.sink.path {
        Some(path) => {
            let sink = JsonLinesSink::open(path)
                .await
                .with_context(|| format!("cannot open sink file {}", path.display()))?;
            info!(path = %path.display(), "Recording submissions to JSON lines");
            Arc::new(sink)
        }
        None => {
            warn!("No sink path configured; classified submissions are kept in memory only");
            Arc::new(MemorySink::new())
        }
    };

    // Spawn cleanup task
    let cleanup_store = store.clone();
    let cleanup_interval = config.store.cleanup_interval().max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_interval);
        loop {
            interval.tick().await;
            let removed = cleanup_store.cleanup().await;
            if removed > 0 {
                debug!(removed, "Expired store entries removed");
            }
        }
    });

    let addr: SocketAddr = config.bind_addr.parse()?;
    let state = Arc::new(AppState::new(Arc::new(store), sink, config)?);
    let app = router(state);

    // Start server
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
