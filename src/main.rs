use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn, Level};
use tracing_subscriber;

use tollgate::config::TollgateConfig;
use tollgate::http::{AppState, HttpServer};
use tollgate::ratelimit::{RateLimitCoordinator, RateLimitPolicy};
use tollgate::store::{KeyValueStore, MemoryStore, RedisStore};

#[derive(Parser, Debug)]
#[command(name = "tollgate", about = "Visitor rate limiting service", version)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .init();

    info!("Starting Tollgate Rate Limiting Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => TollgateConfig::from_file(path)?,
        None => TollgateConfig::default(),
    };
    info!(http_addr = %config.server.http_addr, "Configuration loaded");

    // Connect the store: remote when configured, process-local otherwise.
    let store: Arc<dyn KeyValueStore> = match &config.store.url {
        Some(url) => {
            let store = RedisStore::connect(url)
                .await
                .map_err(|e| anyhow::anyhow!("failed to connect to store: {e}"))?;
            info!("Connected to remote store");
            Arc::new(store)
        }
        None => {
            warn!("No store URL configured, quota counters are per-process only");
            Arc::new(MemoryStore::new())
        }
    };

    let coordinator = Arc::new(RateLimitCoordinator::new(store));
    let policy: RateLimitPolicy = config.policy.clone().into();
    info!(
        limit_key = %policy.limit_key,
        max_requests = policy.max_requests,
        window_ms = policy.window_ms,
        "Rate limit coordinator initialized"
    );

    let state = AppState {
        coordinator,
        policy: Arc::new(policy),
        admin_key: config.server.admin_key.as_deref().map(Arc::from),
    };
    let server = HttpServer::new(config.server.http_addr, state);

    // Run the server with graceful shutdown on Ctrl+C
    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Tollgate Rate Limiting Service stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
