//! HA logs proxy server.

use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use tracing::{error, info};

use ha_logs_proxy::config::{Config, Overrides};
use ha_logs_proxy::{create_app, logging};
use ha_logs_types::LogCategory;

/// HTTP and WebSocket proxy for the logs of the Home Assistant CLI
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "HA_LOGS_PORT")]
    port: Option<u16>,

    /// Address to bind to
    #[arg(long)]
    bind: Option<IpAddr>,

    /// Executable to invoke instead of `ha`
    #[arg(long)]
    command: Option<String>,

    /// Extra TOML config file, applied after the default locations
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter (e.g. "debug" or "ha_logs_proxy=trace")
    #[arg(long)]
    log_level: Option<String>,

    /// Also write logs to this file (rotated daily)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl From<Args> for Overrides {
    fn from(args: Args) -> Self {
        Overrides {
            config_file: args.config,
            port: args.port,
            bind: args.bind,
            command: args.command,
            log_level: args.log_level,
            log_file: args.log_file,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::from_figment(args.into())?;

    // Initialize logging before the runtime starts its worker threads
    let _log_guard = logging::init(config.log_level.as_deref(), config.log_file.as_deref())?;

    run(config)
}

#[tokio::main]
async fn run(config: Config) -> anyhow::Result<()> {
    let app = create_app(&config);
    let addr = config.socket_addr();

    info!("Starting HA Logs Proxy on {}", addr);
    info!("Invoking '{}' for log requests", config.command);
    info!("Available endpoints:");
    info!("  GET /api/logs - List all endpoints");
    for category in LogCategory::ALL {
        info!("  GET {} - {} logs", category.path(), category);
    }
    info!("  WS  /api/logs/*/follow - Stream logs (WebSocket)");
    info!("  GET /health - Health check");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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

    info!("Shutdown signal received, shutting down gracefully...");
}
