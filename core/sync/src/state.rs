//! Run state of the sync orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use reportsync_common::{Error, Result};

use crate::summary::SyncSummary;

/// Lifecycle of an orchestrator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RunState {
    /// No run has started yet.
    #[default]
    Idle,
    /// A run is in progress.
    Running,
    /// The last run finished successfully.
    Succeeded,
    /// The last run failed.
    Failed,
}

/// Tracks the current and last orchestrator run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncState {
    pub status: RunState,
    pub last_started: Option<DateTime<Utc>>,
    pub last_finished: Option<DateTime<Utc>>,
    pub last_summary: Option<SyncSummary>,
    pub last_error: Option<String>,
    /// Number of finished runs.
    pub runs: u64,
}

impl SyncState {
    /// Create an idle state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter `Running`.
    ///
    /// # Errors
    /// - A run is already in progress
    pub fn mark_running(&mut self, started_at: DateTime<Utc>) -> Result<()> {
        if self.status == RunState::Running {
            return Err(Error::InvalidInput("A sync run is already in progress".to_string()));
        }
        self.status = RunState::Running;
        self.last_started = Some(started_at);
        Ok(())
    }

    /// Finish the current run successfully.
    pub fn mark_succeeded(&mut self, summary: SyncSummary) {
        self.finish(RunState::Succeeded);
        self.last_summary = Some(summary);
        self.last_error = None;
    }

    /// Finish the current run with an error.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.finish(RunState::Failed);
        self.last_summary = None;
        self.last_error = Some(error.into());
    }

    fn finish(&mut self, status: RunState) {
        self.status = status;
        self.last_finished = Some(Utc::now());
        self.runs += 1;
    }

    pub fn is_running(&self) -> bool {
        self.status == RunState::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_lifecycle() {
        let mut state = SyncState::new();
        assert_eq!(state.status, RunState::Idle);

        state.mark_running(Utc::now()).unwrap();
        assert!(state.is_running());
        assert!(state.mark_running(Utc::now()).is_err());

        state.mark_failed("boom");
        assert_eq!(state.status, RunState::Failed);
        assert_eq!(state.last_error.as_deref(), Some("boom"));

        state.mark_running(Utc::now()).unwrap();
        state.mark_succeeded(SyncSummary::default());
        assert_eq!(state.status, RunState::Succeeded);
        assert!(state.last_error.is_none());
        assert_eq!(state.runs, 2);
    }
}
