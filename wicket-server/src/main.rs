// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Wicket — instrumented HTTP handler demo server
//
//  Handlers:  return errors, wrapped by StdService for logging,
//             error responses, panic recovery and counters
//  Metrics:   prometheus text at the configured path
//  Config:    YAML file + WICKET_ env overrides
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

mod app;
mod handlers;

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use wicket_core::WicketConfig;
use wicket_http::DebugAccessPolicy;
use wicket_observability::MetricsCollector;

#[derive(Parser, Debug)]
#[command(name = "wicket", version, about = "Wicket — instrumented HTTP handler demo server")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "wicket.yaml")]
    config: PathBuf,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ── Config ──
    let config_found = cli.config.exists();
    let config = if config_found {
        WicketConfig::load(&cli.config)?
    } else {
        WicketConfig::default()
    };

    // ── Tracing ──
    init_tracing(&cli.log_level, cli.json_logs || config.server.json_logs);

    info!(version = env!("CARGO_PKG_VERSION"), "Wicket starting");
    if config_found {
        info!(path = %cli.config.display(), "Loaded config file");
    } else {
        info!("No config file found, using defaults");
    }

    // ── Metrics + debug access ──
    let metrics = Arc::new(MetricsCollector::new(config.metrics.enabled)?);
    let debug = DebugAccessPolicy::from_config(&config.debug)?;

    let app = app::build_router(&config, metrics, Arc::new(debug))?;

    let listener = tokio::net::TcpListener::bind(&config.server.addr).await?;
    info!(addr = %config.server.addr, "Serving");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Wicket stopped");
    Ok(())
}

fn init_tracing(level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
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
    info!("Shutdown signal received, stopping...");
}
