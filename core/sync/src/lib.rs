//! reportsync Sync Engine
//!
//! This module reconciles the document store and the relational store:
//! - Identity resolution between document IDs and relational rows
//! - Pull (remote to local) and push (local to remote) procedures
//! - Photo list reconciliation for report documents
//! - A connection manager that rebuilds an invalidated document store handle
//! - The orchestrator, its audit log and a scheduler for periodic runs

pub mod config;
pub mod connection;
pub mod engine;
pub mod photos;
pub mod pull;
pub mod push;
pub mod resolver;
pub mod retry;
pub mod scheduler;
pub mod state;
pub mod summary;

// Re-export main types
pub use config::{RemoteSettings, RetrySettings, ScheduleSettings, SyncSettings};
pub use connection::RemoteConnection;
pub use engine::{SyncConfig, SyncEngine, FULL_SYNC_KIND};
pub use photos::PhotoEntry;
pub use resolver::{IdentityResolver, ReportMatch, UserMatch};
pub use retry::{RetryConfig, RetryError, RetryExecutor};
pub use scheduler::{SyncMode, SyncRequest, SyncScheduler, SyncSchedulerHandle};
pub use state::{RunState, SyncState};
pub use summary::{Outcome, StepCounts, SyncSummary};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_exports() {
        let _config = SyncConfig::default();
        let _retry_config = RetryConfig::default();
        let _state = SyncState::new();
        let _settings = SyncSettings::default();
    }
}
