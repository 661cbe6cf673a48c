//! Core sync engine that orchestrates all sync operations.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use reportsync_common::{Error, Result};
use reportsync_local::{AuditStatus, LocalStore, SyncAuditRecord};
use reportsync_remote::{Connector, DocumentStore};

use crate::connection::RemoteConnection;
use crate::retry::{RetryConfig, RetryError, RetryExecutor};
use crate::state::SyncState;
use crate::summary::SyncSummary;
use crate::{pull, push};

/// Kind recorded on audit records written by [`SyncEngine::sync_all`].
pub const FULL_SYNC_KIND: &str = "full";

/// Configuration for the sync engine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Collection holding user documents.
    pub users_collection: String,
    /// Collection holding report documents.
    pub reports_collection: String,
    /// Pause before the single retry that follows a rebuilt connection.
    pub retry_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            users_collection: "users".to_string(),
            reports_collection: "reports".to_string(),
            retry_delay: RetryConfig::default().initial_delay,
        }
    }
}

/// A top-level operation: one transaction, one retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    PullUsers,
    PullReports,
    PushUsers,
    PushReports,
    PullAll,
    PushAll,
    Full,
}

/// Main sync engine between the document store and the relational store.
pub struct SyncEngine {
    /// Relational store.
    local: Arc<dyn LocalStore>,
    /// Owner of the document store handle.
    connection: RemoteConnection,
    /// Retry executor.
    retry_executor: RetryExecutor,
    /// Orchestrator run state.
    state: Arc<RwLock<SyncState>>,
    /// Configuration.
    config: SyncConfig,
}

impl SyncEngine {
    /// Create a new sync engine. No connection is made until the first run.
    pub fn new(local: Arc<dyn LocalStore>, connector: Arc<dyn Connector>, config: SyncConfig) -> Self {
        Self {
            local,
            connection: RemoteConnection::new(connector),
            retry_executor: RetryExecutor::new(
                RetryConfig::default().with_initial_delay(config.retry_delay),
            ),
            state: Arc::new(RwLock::new(SyncState::new())),
            config,
        }
    }

    /// Get a reference to the run state.
    pub fn state(&self) -> Arc<RwLock<SyncState>> {
        self.state.clone()
    }

    /// Get the document store connection manager.
    pub fn connection(&self) -> &RemoteConnection {
        &self.connection
    }

    /// Get the relational store.
    pub fn local(&self) -> &dyn LocalStore {
        self.local.as_ref()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Import user documents. Returns the number of rows created.
    pub async fn pull_users(&self) -> Result<u32> {
        Ok(self.run(Step::PullUsers).await?.users_pulled)
    }

    /// Import report documents and their photos. Returns the number of rows created.
    pub async fn pull_reports(&self) -> Result<u32> {
        Ok(self.run(Step::PullReports).await?.reports_pulled)
    }

    /// Publish users. Returns the number of documents created.
    pub async fn push_users(&self) -> Result<u32> {
        Ok(self.run(Step::PushUsers).await?.users_pushed)
    }

    /// Publish reports. Returns the number of documents created.
    pub async fn push_reports(&self) -> Result<u32> {
        Ok(self.run(Step::PushReports).await?.reports_pushed)
    }

    /// Import users, then reports, in one transaction.
    pub async fn pull_all(&self) -> Result<SyncSummary> {
        Ok(self.run(Step::PullAll).await?)
    }

    /// Publish users, then reports, in one transaction.
    pub async fn push_all(&self) -> Result<SyncSummary> {
        Ok(self.run(Step::PushAll).await?)
    }

    /// Run a full bidirectional sync and record it in the audit log.
    ///
    /// Runs pull users, push users, pull reports and push reports inside one
    /// relational transaction. A failed run is rolled back and recorded with
    /// its error; the counters of a failed run are not kept.
    ///
    /// # Errors
    /// Only when the audit record itself cannot be written. A failed sync is
    /// reported through the returned record. An initiator without a local row
    /// is dropped from the record.
    pub async fn sync_all(&self, initiated_by: Option<i64>) -> Result<SyncAuditRecord> {
        let initiated_by = match initiated_by {
            Some(id) if self.local.user(id)?.is_none() => {
                warn!("Initiating user {} not found; recording sync without initiator", id);
                None
            }
            other => other,
        };

        let mut record = SyncAuditRecord::start(FULL_SYNC_KIND, initiated_by);
        if let Err(e) = self.state.write().await.mark_running(record.started_at) {
            warn!("{}", e);
        }

        info!("Starting full sync");
        match self.run(Step::Full).await {
            Ok(summary) => {
                record.records_pulled = summary.pulled();
                record.records_pushed = summary.pushed();
                record.conflicts = 0;
                record.status = AuditStatus::Success;
                info!(
                    "Full sync completed: {} pulled, {} pushed",
                    record.records_pulled, record.records_pushed
                );
                self.state.write().await.mark_succeeded(summary);
            }
            Err(err) => {
                if err.retried() {
                    warn!("Full sync failed even after rebuilding the document store connection");
                }
                let message = err.to_string();
                error!("Full sync failed: {}", message);
                record.status = AuditStatus::Failed;
                record.error_message = Some(message.clone());
                self.state.write().await.mark_failed(message);
            }
        }

        self.local.save_audit(&record)
    }

    /// Audit records, newest first, optionally filtered by status.
    pub fn history(&self, status: Option<AuditStatus>) -> Result<Vec<SyncAuditRecord>> {
        self.local.audits(status)
    }

    /// A single audit record.
    pub fn audit(&self, id: i64) -> Result<SyncAuditRecord> {
        self.local
            .audit(id)?
            .ok_or_else(|| Error::NotFound(format!("Sync log {}", id)))
    }

    /// The most recent audit record, if any run was recorded.
    pub fn last_run(&self) -> Result<Option<SyncAuditRecord>> {
        Ok(self.local.audits(None)?.into_iter().next())
    }

    /// Close the document store handle.
    pub async fn shutdown(&self) -> Result<()> {
        self.connection.close().await
    }

    /// Run a step with one retry after reinitializing the connection.
    async fn run(&self, step: Step) -> std::result::Result<SyncSummary, RetryError> {
        self.retry_executor
            .execute_with_recovery(
                || self.attempt(step),
                Error::is_connection_invalidated,
                || async { self.connection.reinitialize().await.map(|_| ()) },
            )
            .await
    }

    /// One attempt of a step inside a relational transaction.
    async fn attempt(&self, step: Step) -> Result<SyncSummary> {
        let remote = self.connection.live().await?;

        self.local.begin()?;
        let result = self
            .run_steps(remote.as_ref(), step)
            .await
            .and_then(|summary| self.local.commit().map(|()| summary));

        match result {
            Ok(summary) => Ok(summary),
            Err(err) => {
                debug!("Rolling back {:?}: {}", step, err);
                if let Err(rollback_err) = self.local.rollback() {
                    error!("Rollback failed: {}", rollback_err);
                }
                Err(err)
            }
        }
    }

    async fn run_steps(&self, remote: &dyn DocumentStore, step: Step) -> Result<SyncSummary> {
        let local = self.local.as_ref();
        let users = self.config.users_collection.as_str();
        let reports = self.config.reports_collection.as_str();
        let mut summary = SyncSummary::default();

        if matches!(step, Step::PullUsers | Step::PullAll | Step::Full) {
            summary.users_pulled = pull::pull_users(remote, local, users).await?.created;
        }
        if matches!(step, Step::PushUsers | Step::PushAll | Step::Full) {
            summary.users_pushed = push::push_users(remote, local, users).await?.created;
        }
        if matches!(step, Step::PullReports | Step::PullAll | Step::Full) {
            summary.reports_pulled = pull::pull_reports(remote, local, reports).await?.created;
        }
        if matches!(step, Step::PushReports | Step::PushAll | Step::Full) {
            summary.reports_pushed = push::push_reports(remote, local, reports).await?.created;
        }

        Ok(summary)
    }
}
