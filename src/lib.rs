pub mod cache;
pub mod config;
pub mod db;
pub mod errors;
pub mod filter;
pub mod models;
pub mod reminders;
pub mod scheduler;
pub mod stats;
pub mod store;
pub mod tracker;

use crate::config::DataPaths;
use crate::scheduler::ReminderScheduler;
use crate::tracker::TrackerCore;
use anyhow::Context;
use std::path::Path;
use tokio::sync::broadcast::error::RecvError;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// Headless entry point: opens the store under the data directory, runs the
/// reminder loop and relays alerts until Ctrl-C.
pub async fn run() -> anyhow::Result<()> {
    let (paths, defaulted) = DataPaths::from_env();
    std::fs::create_dir_all(&paths.root)
        .with_context(|| format!("creating data directory {}", paths.root.display()))?;
    init_tracing(&paths.logs()).map_err(anyhow::Error::msg)?;
    if defaulted {
        tracing::info!("{} not set, using default: {}", config::DATA_DIR_ENV, paths.root.display());
    } else {
        tracing::info!(data_dir = %paths.root.display(), "using data directory");
    }

    let core = TrackerCore::open(paths).context("opening request store")?;
    let scheduler = ReminderScheduler::new(core.clone()).start();

    let relay = tokio::spawn({
        let mut alerts = core.subscribe_alerts();
        async move {
            loop {
                match alerts.recv().await {
                    Ok(event) => {
                        tracing::info!(
                            notification_id = %event.notification.id,
                            play_sound = event.play_sound,
                            desktop = event.desktop,
                            "alert ready for delivery"
                        );
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "alert relay lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    });

    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    tracing::info!("shutdown requested");
    scheduler.abort();
    relay.abort();
    Ok(())
}

pub fn init_tracing(log_dir: &Path) -> Result<(), String> {
    std::fs::create_dir_all(log_dir).map_err(|error| error.to_string())?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "tracker.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| error.to_string())
}
