use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::signal;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cvguard::config::GuardConfig;
use cvguard::http::{admin_router, decision_router, GuardState, HttpServer};
use cvguard::ratelimit::RateLimiter;

/// Rate limit decision service for the CV builder.
#[derive(Parser, Debug)]
#[command(name = "cvguard", version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    info!("Starting cvguard rate limiting service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = GuardConfig::load(args.config.as_deref())?;
    info!(
        http_addr = %config.server.http_addr,
        admin_addr = %config.server.admin_addr,
        trust_forwarded_headers = config.server.trust_forwarded_headers,
        "Configuration loaded"
    );

    let rules = config.rate_limiting.load_rules()?;
    info!(routes = rules.routes.len(), default = ?rules.default, "Route rules loaded");

    // Initialize the rate limiter and its sweep
    let rate_limiter = Arc::new(RateLimiter::new());
    rate_limiter.start_cleanup_sweep(config.rate_limiting.cleanup_interval())?;

    let state = GuardState::new(
        Arc::clone(&rate_limiter),
        rules,
        config.server.trust_forwarded_headers,
    );

    let decision = HttpServer::new("decision", config.server.http_addr, decision_router(state.clone()));
    let admin = HttpServer::new("admin", config.server.admin_addr, admin_router(state));

    // Both servers drain on the same signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let result = tokio::try_join!(
        decision.serve_with_shutdown(wait_for(shutdown_rx.clone())),
        admin.serve_with_shutdown(wait_for(shutdown_rx)),
    );

    rate_limiter.stop_cleanup_sweep().await;
    result?;

    info!("cvguard rate limiting service stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn wait_for(mut shutdown: watch::Receiver<bool>) {
    // A dropped sender also means shut down.
    let _ = shutdown.wait_for(|stop| *stop).await;
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
