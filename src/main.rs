mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use clusterscope_k8s::KubeClient;
use clusterscope_server::AppState;
use clusterscope_snapshot::{NodeSnapshotBuilder, PodSnapshotBuilder, Reconciler, SnapshotStore};

use crate::config::{Config, LogLevel};

/// Clusterscope - cached cluster summaries and live namespace logs over HTTP
#[derive(Parser, Debug)]
#[command(name = "clusterscope")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config file (missing file means defaults)
    #[arg(long, default_value = "clusterscope.toml")]
    config: PathBuf,

    /// Address to listen on, overrides the config file and PORT
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let result = match load_config(&args) {
        Ok(config) => {
            init_tracing(&config.log_level)?;
            run(config).await
        }
        Err(err) => Err(err),
    };

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

/// File, then PORT, then command line
fn load_config(args: &Args) -> Result<Config> {
    let mut config = Config::load(&args.config)?;
    config.apply_port(std::env::var("PORT").ok().as_deref())?;

    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(level) = &args.log_level {
        config.log_level = LogLevel(level.clone());
    }

    config.validate()?;
    Ok(config)
}

fn init_tracing(level: &LogLevel) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&level.0).context("Invalid log level")?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

async fn run(config: Config) -> Result<()> {
    let shutdown = CancellationToken::new();
    let client = KubeClient::connect().await?;

    let nodes = Arc::new(SnapshotStore::new());
    let pods = Arc::new(SnapshotStore::new());
    let refresh = config.snapshot.refresh_interval();

    let reconcilers = [
        tokio::spawn(
            Reconciler::new("nodes", NodeSnapshotBuilder::new(client.clone()), nodes.clone(), refresh)
                .run(shutdown.child_token()),
        ),
        tokio::spawn(
            Reconciler::new("pods", PodSnapshotBuilder::new(client.clone()), pods.clone(), refresh)
                .run(shutdown.child_token()),
        ),
    ];

    let state = AppState::new(
        client,
        nodes,
        pods,
        config.logs.stream_config(),
        config.logs.snapshot_tail_lines,
        shutdown.child_token(),
    );

    let listener = TcpListener::bind(config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            info!("Shutdown signal received");
            shutdown.cancel();
        }
    });

    let mut server = tokio::spawn(clusterscope_server::serve(listener, state, shutdown.clone()));
    let grace = Duration::from_secs(config.server.shutdown_grace_secs);

    let served = tokio::select! {
        served = &mut server => served,
        _ = shutdown.cancelled() => match tokio::time::timeout(grace, &mut server).await {
            Ok(served) => served,
            Err(_) => {
                warn!(grace_secs = grace.as_secs(), "Connections still open after grace period");
                server.abort();
                Ok(Ok(()))
            }
        },
    };

    shutdown.cancel();
    for reconciler in reconcilers {
        let _ = reconciler.await;
    }

    served.context("HTTP server task failed")?.context("HTTP server failed")?;
    info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
