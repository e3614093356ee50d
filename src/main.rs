use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ratewarden::app::Dependencies;
use ratewarden::config::{AppConfig, LoggingConfig, StoreBackend};
use ratewarden::http::HttpServer;

/// Fixed-window HTTP rate limiting service.
#[derive(Parser, Debug)]
#[command(name = "ratewarden", version, about)]
struct Args {
    /// Path to a configuration file (YAML, TOML or JSON)
    #[arg(short, long)]
    config: Option<String>,

    /// Override the HTTP listen address
    #[arg(long)]
    addr: Option<std::net::SocketAddr>,

    /// Override the counter store backend
    #[arg(long, value_enum)]
    store: Option<StoreBackend>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(addr) = args.addr {
        config.server.http_addr = addr;
    }
    if let Some(store) = args.store {
        config.store = store;
    }

    init_tracing(&config.logging);

    info!("Starting Ratewarden");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        http_addr = %config.server.http_addr,
        store = ?config.store,
        "Configuration loaded"
    );

    let addr = config.server.http_addr;
    let deps = Dependencies::build(config).await?;

    HttpServer::new(addr, deps.router)
        .serve_with_shutdown(shutdown_signal())
        .await?;

    info!("Ratewarden stopped");
    Ok(())
}

/// Initialize tracing; `RUST_LOG` takes precedence over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init();
    }
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
