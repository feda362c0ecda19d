mod commands;
mod connection;
mod protocol;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing_subscriber::EnvFilter;

use locustgen_core::archive::{FileArchive, TestArchive};
use locustgen_core::config::{Config, LoggingConfig};
use locustgen_core::runner::RunOrchestrator;
use locustgen_core::session::SessionLimits;

use crate::commands::CommandState;
use crate::server::SessionManager;

/// Locust load-test generator served over WebSocket.
#[derive(Debug, Parser)]
#[command(name = "locustgen-mcp", version, about)]
struct Cli {
    /// TOML configuration file (defaults to ./locustgen.toml when present).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to bind, overriding the configuration.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, overriding the configuration.
    #[arg(long)]
    port: Option<u16>,
}

/// Logs go to stderr. `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .context("invalid log level")?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = if logging.format == "json" {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    config.validate()?;

    init_tracing(&config.logging)?;

    let archive = Arc::new(FileArchive::open(&config.archive.root).await?);
    let orchestrator = Arc::new(RunOrchestrator::from_config(&config.runner));
    let manager = Arc::new(SessionManager::new(
        SessionLimits::from(&config.session),
        CommandState::new(archive.clone(), orchestrator.clone()),
    ));

    let shutdown = CancellationToken::new();
    let sweeper = tokio::spawn(
        manager
            .clone()
            .run_sweeper(config.session.sweep_interval(), shutdown.clone()),
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(
        url = %format!("ws://{addr}{}", connection::ENDPOINT_PATH),
        archive = %archive.root().display(),
        locust = %orchestrator.executable(),
        "server listening"
    );

    let connections = TaskTracker::new();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!(open_sessions = manager.live_sessions().await, "shutdown requested");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    connections.spawn(connection::serve_connection(
                        stream,
                        peer,
                        manager.clone(),
                        shutdown.clone(),
                    ));
                }
                Err(e) => tracing::warn!(error = %e, "failed to accept connection"),
            },
        }
    }

    shutdown.cancel();
    connections.close();
    connections.wait().await;
    if let Err(e) = sweeper.await {
        tracing::warn!(error = %e, "liveness sweeper ended abnormally");
    }
    archive.close().await?;
    tracing::info!("server stopped");
    Ok(())
}
