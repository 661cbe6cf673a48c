//! Sync scheduling - manual and periodic modes.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, error, info};

use reportsync_common::{Error, Result};
use reportsync_local::SyncAuditRecord;

/// Sync mode configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    /// Runs only when requested.
    Manual,
    /// Runs at regular intervals, plus on request.
    Periodic { interval: Duration },
}

/// Sync request types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncRequest {
    /// Full sync, optionally on behalf of a user.
    Full { initiated_by: Option<i64> },
    /// Shutdown the scheduler.
    Shutdown,
}

type Envelope = (SyncRequest, oneshot::Sender<Result<SyncAuditRecord>>);

/// Scheduler for managing sync timing and requests.
///
/// Requests and periodic ticks are handled by a single task, one at a time,
/// so two runs never overlap.
pub struct SyncScheduler {
    /// Current sync mode.
    mode: Arc<RwLock<SyncMode>>,
    /// Channel to send sync requests.
    request_tx: mpsc::Sender<Envelope>,
}

impl SyncScheduler {
    /// Create a new scheduler with the given mode.
    pub fn new(mode: SyncMode) -> (Self, SyncSchedulerHandle) {
        let (request_tx, request_rx) = mpsc::channel(100);
        let mode = Arc::new(RwLock::new(mode));

        let scheduler = Self {
            mode: mode.clone(),
            request_tx,
        };
        let handle = SyncSchedulerHandle { mode, request_rx };

        (scheduler, handle)
    }

    /// Request a full sync and wait for its audit record.
    pub async fn request_sync(&self, initiated_by: Option<i64>) -> Result<SyncAuditRecord> {
        let (response_tx, response_rx) = oneshot::channel();

        self.request_tx
            .send((SyncRequest::Full { initiated_by }, response_tx))
            .await
            .map_err(|_| Error::Storage("Scheduler not running".to_string()))?;

        response_rx
            .await
            .map_err(|_| Error::Storage("Failed to receive sync result".to_string()))?
    }

    /// Change the sync mode.
    pub async fn set_mode(&self, mode: SyncMode) {
        *self.mode.write().await = mode;
    }

    /// Get current sync mode.
    pub async fn get_mode(&self) -> SyncMode {
        self.mode.read().await.clone()
    }

    /// Shutdown the scheduler.
    pub async fn shutdown(&self) {
        let (response_tx, _) = oneshot::channel();
        let _ = self
            .request_tx
            .send((SyncRequest::Shutdown, response_tx))
            .await;
    }
}

/// Handle for the scheduler background task.
pub struct SyncSchedulerHandle {
    mode: Arc<RwLock<SyncMode>>,
    request_rx: mpsc::Receiver<Envelope>,
}

impl SyncSchedulerHandle {
    /// Run the scheduler background task.
    ///
    /// This should be spawned in a tokio task. `sync_fn` is called for every
    /// requested or periodic run. The task ends on shutdown or once every
    /// [`SyncScheduler`] is dropped.
    pub async fn run<F, Fut>(mut self, sync_fn: F)
    where
        F: Fn(Option<i64>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<SyncAuditRecord>> + Send,
    {
        let mut current = self.mode.read().await.clone();
        let mut periodic = Self::periodic_interval(&current);

        info!("Sync scheduler started ({:?})", current);

        loop {
            tokio::select! {
                request = self.request_rx.recv() => {
                    match request {
                        Some((SyncRequest::Full { initiated_by }, response_tx)) => {
                            debug!("Processing sync request from {:?}", initiated_by);
                            let result = sync_fn(initiated_by).await;
                            let _ = response_tx.send(result);
                        }
                        Some((SyncRequest::Shutdown, _)) => {
                            info!("Received shutdown request");
                            break;
                        }
                        None => {
                            info!("All schedulers dropped, stopping");
                            break;
                        }
                    }
                }

                _ = Self::wait_for_periodic(&mut periodic) => {
                    debug!("Triggering periodic sync");
                    match sync_fn(None).await {
                        Ok(record) => info!(
                            "Periodic sync finished ({}): {} pulled, {} pushed",
                            record.status, record.records_pulled, record.records_pushed
                        ),
                        Err(e) => error!("Periodic sync failed: {}", e),
                    }
                }
            }

            // Recreate interval if mode changed
            let mode = self.mode.read().await.clone();
            if mode != current {
                debug!("Sync mode changed to {:?}", mode);
                periodic = Self::periodic_interval(&mode);
                current = mode;
            }
        }
    }

    fn periodic_interval(mode: &SyncMode) -> Option<Interval> {
        match mode {
            SyncMode::Periodic { interval: duration } => {
                let mut ticker = interval(*duration);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                Some(ticker)
            }
            SyncMode::Manual => None,
        }
    }

    async fn wait_for_periodic(interval: &mut Option<Interval>) {
        match interval {
            Some(interval) => {
                interval.tick().await;
            }
            // Manual mode never ticks
            None => std::future::pending::<()>().await,
        }
    }
}
