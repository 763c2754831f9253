//! Background maintenance: periodic full index rebuilds and dirty snapshot
//! flushes. Both loops stop when the shared cancellation token fires.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::MaintenanceConfig;
use crate::storage::Catalog;

/// Handle to the running maintenance tasks.
pub struct MaintenanceHandle {
    catalog: Arc<Catalog>,
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// Spawn the rebuild and flush loops on the current tokio runtime.
pub fn start(catalog: Arc<Catalog>, config: &MaintenanceConfig) -> MaintenanceHandle {
    let token = CancellationToken::new();

    let tasks = vec![
        tokio::spawn(rebuild_loop(
            Arc::clone(&catalog),
            config.rebuild_interval,
            token.clone(),
        )),
        tokio::spawn(flush_loop(
            Arc::clone(&catalog),
            config.snapshot_interval,
            token.clone(),
        )),
    ];

    info!(
        rebuild_interval_secs = config.rebuild_interval.as_secs(),
        snapshot_interval_secs = config.snapshot_interval.as_secs(),
        "Maintenance tasks started"
    );

    MaintenanceHandle {
        catalog,
        token,
        tasks,
    }
}

impl MaintenanceHandle {
    /// A token that is cancelled when shutdown begins.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Stop both loops, wait for them to finish, then write the snapshot one
    /// last time if anything is still unsaved.
    pub async fn shutdown(self) {
        self.token.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Maintenance task ended abnormally");
            }
        }

        let catalog = Arc::clone(&self.catalog);
        match tokio::task::spawn_blocking(move || catalog.flush_snapshot()).await {
            Ok(Ok(true)) => info!("Final index snapshot saved"),
            Ok(Ok(false)) => {}
            Ok(Err(e)) => error!(error = %e, "Final index snapshot failed"),
            Err(e) => error!(error = %e, "Final index snapshot task panicked"),
        }
        info!("Maintenance tasks stopped");
    }
}

/// Long-running task: rebuild every index from the metadata files every `interval`.
async fn rebuild_loop(catalog: Arc<Catalog>, interval: Duration, token: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; startup already loaded or rebuilt.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let catalog = Arc::clone(&catalog);
        match tokio::task::spawn_blocking(move || catalog.rebuild_indexes()).await {
            Ok(Ok(stats)) => info!(records = stats.records, "Periodic index rebuild finished"),
            Ok(Err(e)) => error!(error = %e, "Periodic index rebuild failed"),
            Err(e) => error!(error = %e, "Periodic index rebuild task panicked"),
        }
    }
}

/// Long-running task: persist the index snapshot every `interval` if dirty.
async fn flush_loop(catalog: Arc<Catalog>, interval: Duration, token: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if !catalog.is_dirty() {
            continue;
        }

        let catalog = Arc::clone(&catalog);
        match tokio::task::spawn_blocking(move || catalog.flush_snapshot()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => error!(error = %e, "Index snapshot save failed"),
            Err(e) => error!(error = %e, "Index snapshot task panicked"),
        }
    }
}
