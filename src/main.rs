use anyhow::Context;
use clap::Parser;
use solilog::config::DEFAULT_CONFIG_PATH;
use solilog::{logging, Connector, Listener, RelayConfig, SoliDbConnector};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "solilog")]
#[command(about = "solilog - relay length-prefixed JSON log records into SoliDB", long_about = None)]
struct Args {
    /// Configuration file (.json or .toml)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = RelayConfig::load(&args.config)?;
    logging::init(&config)?;
    let config = Arc::new(config);

    let connector: Arc<dyn Connector> = Arc::new(SoliDbConnector::new());
    let listener = Listener::new(config.clone(), connector);

    let socket = listener
        .bind()
        .await
        .with_context(|| format!("Cannot listen on port {}", config.listen_port))?;
    tracing::info!(
        "Relay listening on {}, store at {}:{}",
        socket.local_addr()?,
        config.store_host,
        config.store_port
    );

    tokio::select! {
        result = listener.serve(socket) => {
            result.context("Accept loop failed")?;
        }
        _ = shutdown_signal() => {}
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
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
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
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

    tracing::info!("Shutdown signal received, no longer accepting connections");
}
