//! linechat daemon
//!
//! Runs the chat server until Ctrl+C or SIGTERM, then shuts it down cleanly.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use linechat_broadcaster::ChatServer;
use linechat_daemon::cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = args.resolve_config()
        .context("Failed to load configuration")?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(config.max_level()?)
        .init();

    info!("Starting linechat daemon v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from {}", config.config_path.display());

    let server = ChatServer::new(config.server.clone());
    let addr = server.start().await
        .context("Failed to start chat server")?;

    println!("[server] listening on {}:{}. Press Ctrl+C to stop.", addr.ip(), addr.port());

    shutdown_signal().await?;
    info!("Received shutdown signal");

    server.stop().await
        .context("Failed to stop chat server")?;

    info!("linechat daemon stopped");
    Ok(())
}

/// Resolve on Ctrl+C, or SIGTERM on Unix
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())
            .context("Failed to install SIGTERM handler")?;

        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context("Failed to listen for Ctrl+C")?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    Ok(())
}
