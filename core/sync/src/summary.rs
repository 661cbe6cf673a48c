//! Counters reported by pull and push steps.

use serde::{Deserialize, Serialize};
use tracing::warn;

use reportsync_common::{Error, Result};

/// What happened to a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A new row or document was created.
    Created,
    /// An existing row or document was updated or linked.
    Updated,
    /// A prerequisite was missing; nothing was written.
    Skipped,
}

/// Per-step counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCounts {
    pub created: u32,
    pub updated: u32,
    pub skipped: u32,
    /// Photo rows imported along the way (report pulls only).
    pub photos: u32,
}

impl StepCounts {
    /// Count one record's outcome.
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Created => self.created += 1,
            Outcome::Updated => self.updated += 1,
            Outcome::Skipped => self.skipped += 1,
        }
    }

    /// Fold a per-record result into the counters.
    ///
    /// Transport failures (an invalidated connection or a network error) are
    /// returned so the whole step stops; any other error only skips the record.
    pub fn absorb(&mut self, what: &str, result: Result<Outcome>) -> Result<()> {
        match result {
            Ok(outcome) => {
                self.record(outcome);
                Ok(())
            }
            Err(err) if is_transport_failure(&err) => Err(err),
            Err(err) => {
                warn!("Skipping {}: {}", what, err);
                self.skipped += 1;
                Ok(())
            }
        }
    }
}

fn is_transport_failure(err: &Error) -> bool {
    err.is_connection_invalidated() || matches!(err, Error::Network(_))
}

/// Created counts of a combined run, per direction and entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub users_pulled: u32,
    pub reports_pulled: u32,
    pub users_pushed: u32,
    pub reports_pushed: u32,
}

impl SyncSummary {
    /// Rows created locally.
    pub fn pulled(&self) -> u32 {
        self.users_pulled + self.reports_pulled
    }

    /// Documents created remotely.
    pub fn pushed(&self) -> u32 {
        self.users_pushed + self.reports_pushed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absorb_isolates_record_errors() {
        let mut counts = StepCounts::default();
        counts.absorb("doc a", Ok(Outcome::Created)).unwrap();
        counts
            .absorb("doc b", Err(Error::Database("UNIQUE constraint failed".to_string())))
            .unwrap();

        assert_eq!(counts.created, 1);
        assert_eq!(counts.skipped, 1);
    }

    #[test]
    fn test_absorb_propagates_transport_errors() {
        let mut counts = StepCounts::default();
        let closed = counts.absorb(
            "doc",
            Err(Error::Storage("client has already been closed".to_string())),
        );
        assert!(closed.is_err());
        assert!(counts
            .absorb("doc", Err(Error::Network("timeout".to_string())))
            .is_err());
    }

    #[test]
    fn test_summary_totals() {
        let summary = SyncSummary {
            users_pulled: 1,
            reports_pulled: 2,
            users_pushed: 3,
            reports_pushed: 4,
        };
        assert_eq!(summary.pulled(), 3);
        assert_eq!(summary.pushed(), 7);
    }
}
