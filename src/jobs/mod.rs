//! Background ingestion worker
//!
//! A single task drives the whole ingestion side of the service: poll
//! tracked streamers for new VODs, sweep out expired ones, sleep, and
//! go again. The task stops promptly when asked, including mid-sleep.

pub mod retention;
pub mod vod_poller;

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::db::Database;
use crate::services::TwitchClient;

/// Handle to the running ingestion worker
pub struct VodWorker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl VodWorker {
    /// Spawn the worker task. It runs a cycle immediately, then one per
    /// poll interval until shut down.
    pub fn spawn(
        db: Database,
        twitch: TwitchClient,
        poll_interval: Duration,
        retention_days: i64,
    ) -> Self {
        let cancel = CancellationToken::new();
        let loop_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            run_loop(db, twitch, poll_interval, retention_days, loop_cancel).await;
        });

        Self { cancel, handle }
    }

    /// Request a stop and wait for the worker to wind down
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            error!(error = %e, "Ingestion worker task failed to join");
        }
    }
}

async fn run_loop(
    db: Database,
    twitch: TwitchClient,
    poll_interval: Duration,
    retention_days: i64,
    cancel: CancellationToken,
) {
    info!(
        poll_interval_secs = poll_interval.as_secs(),
        retention_days, "Ingestion worker started"
    );

    loop {
        if cancel.is_cancelled() {
            break;
        }

        run_cycle(&db, &twitch, retention_days, &cancel).await;

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }

    info!("Ingestion worker stopped");
}

/// One full cycle: discover new VODs, then purge expired ones. Either
/// half failing is logged and never takes the loop down.
async fn run_cycle(
    db: &Database,
    twitch: &TwitchClient,
    retention_days: i64,
    cancel: &CancellationToken,
) {
    if let Err(e) = vod_poller::poll_streamers(db, twitch, cancel).await {
        error!(job = "vod_poller", error = %e, "Poll cycle failed");
    }

    if cancel.is_cancelled() {
        return;
    }

    if let Err(e) = retention::purge_expired(db, retention_days).await {
        error!(job = "retention", error = %e, "Retention sweep failed");
    }
}
