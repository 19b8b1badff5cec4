//! # Bazaar Sync Daemon
//!
//! Runs the marketplace sync loops until stopped.
//!
//! ```text
//! sync-daemon                       run forever, one loop per platform
//! sync-daemon --once                run a single cycle of every platform
//! sync-daemon --dry-run --once      same, against a throwaway in-memory store
//! sync-daemon --config ./sync.toml  explicit config file
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use bazaar_db::{DbConfig, MemoryStore, RecordStore, SqliteStore};
use bazaar_sync::{Alerts, SyncConfig, SyncScheduler};

#[derive(Debug, Parser)]
#[command(name = "sync-daemon", version, about = "Marketplace order and chat sync")]
struct Cli {
    /// Config file (defaults to sync.toml in the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run one cycle per platform and exit
    #[arg(long)]
    once: bool,

    /// Use an in-memory store instead of the configured database
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    let cli = Cli::parse();
    info!(version = env!("CARGO_PKG_VERSION"), "Starting Bazaar sync daemon");

    let config = SyncConfig::load(cli.config).context("loading configuration")?;

    let store: Arc<dyn RecordStore> = if cli.dry_run {
        warn!("Dry run: writing to an in-memory store");
        Arc::new(MemoryStore::new())
    } else {
        let store = SqliteStore::new(DbConfig::new(config.database.path.clone()))
            .await
            .with_context(|| format!("opening {}", config.database.path.display()))?;
        Arc::new(store)
    };

    let alerts = Alerts::from_settings(&config.notify, config.sync.request_timeout())
        .context("configuring alerts")?;
    if !alerts.is_enabled() {
        info!("Alerts disabled");
    }

    let scheduler = SyncScheduler::from_config(&config, store, alerts);
    if scheduler.is_empty() {
        bail!("no marketplace is configured; add a [platforms.*] section or BAZAAR_* variables");
    }
    info!(platforms = ?scheduler.platforms(), "Platforms ready");

    if cli.once {
        for report in scheduler.run_once().await {
            info!(
                platform = %report.platform,
                orders = ?report.orders,
                chats = ?report.chats,
                relay = ?report.relay,
                errors = report.errors.len(),
                skipped = report.skipped,
                "Cycle finished"
            );
        }
        return Ok(());
    }

    let handle = scheduler.start();
    shutdown_signal().await?;
    handle.shutdown().await;

    info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() -> anyhow::Result<()> {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .context("installing Ctrl+C handler")
    };

    #[cfg(unix)]
    let terminate = async {
        let mut signal =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .context("installing SIGTERM handler")?;
        signal.recv().await;
        Ok::<(), anyhow::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<anyhow::Result<()>>();

    tokio::select! {
        result = ctrl_c => result?,
        result = terminate => result?,
    }

    info!("Shutdown signal received, finishing running cycles");
    Ok(())
}
