//! Row types of the relational store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use reportsync_common::{usable_remote_id, Error, ReportStatus, Result};

/// Role given to users imported without one.
pub const DEFAULT_ROLE: &str = "utilisateur";

/// A user row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Primary key, `None` until inserted.
    pub id: Option<i64>,
    /// Linked remote document ID (may be a local placeholder).
    pub remote_uid: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create an unsaved user.
    pub fn new(email: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            remote_uid: None,
            email: Some(email.into()),
            first_name: None,
            last_name: None,
            role: DEFAULT_ROLE.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Create an unsaved user linked to a remote document, without email.
    pub fn linked(remote_uid: impl Into<String>) -> Self {
        Self {
            remote_uid: Some(remote_uid.into()),
            email: None,
            ..Self::new("")
        }
    }

    /// Remote ID if it can address the document store.
    pub fn usable_remote_uid(&self) -> Option<&str> {
        usable_remote_id(self.remote_uid.as_deref())
    }

    /// "First Last" with missing parts left blank.
    pub fn display_name(&self) -> String {
        format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        )
    }
}

/// An incident report row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Primary key, `None` until inserted.
    pub id: Option<i64>,
    /// Linked remote document ID. `None` means local-only.
    pub remote_id: Option<String>,
    /// Owning user.
    pub user_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub description: Option<String>,
    pub status: ReportStatus,
    pub surface: Option<f64>,
    pub budget: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Last time either sync direction touched the row.
    pub synced_at: Option<DateTime<Utc>>,
}

impl Report {
    /// Create an unsaved report.
    pub fn new(user_id: i64, latitude: f64, longitude: f64) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            remote_id: None,
            user_id,
            latitude,
            longitude,
            description: None,
            status: ReportStatus::default(),
            surface: None,
            budget: None,
            created_at: now,
            updated_at: now,
            synced_at: None,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A photo attached to a report. The URL is unique across all reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    pub id: Option<i64>,
    pub report_id: i64,
    pub url: String,
    pub caption: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

impl Photo {
    /// Create an unsaved photo stamped now.
    pub fn new(report_id: i64, url: impl Into<String>, caption: Option<String>) -> Self {
        Self {
            id: None,
            report_id,
            url: url.into(),
            caption,
            uploaded_at: Utc::now(),
        }
    }
}

/// Outcome of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    /// Run in progress. Never persisted.
    Running,
    Success,
    Failed,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Running => "running",
            AuditStatus::Success => "success",
            AuditStatus::Failed => "failed",
        }
    }
}

impl FromStr for AuditStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(AuditStatus::Running),
            "success" => Ok(AuditStatus::Success),
            "failed" => Ok(AuditStatus::Failed),
            other => Err(Error::InvalidInput(format!("Unknown sync status: {}", other))),
        }
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One orchestrator run, written once when the run ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncAuditRecord {
    pub id: Option<i64>,
    /// Kind of run, `full` for the orchestrator.
    pub kind: String,
    pub started_at: DateTime<Utc>,
    pub records_pulled: u32,
    pub records_pushed: u32,
    pub conflicts: u32,
    pub status: AuditStatus,
    pub error_message: Option<String>,
    /// User who asked for the run, if any.
    pub initiated_by: Option<i64>,
}

impl SyncAuditRecord {
    /// Start a record in the running state.
    pub fn start(kind: impl Into<String>, initiated_by: Option<i64>) -> Self {
        Self {
            id: None,
            kind: kind.into(),
            started_at: Utc::now(),
            records_pulled: 0,
            records_pushed: 0,
            conflicts: 0,
            status: AuditStatus::Running,
            error_message: None,
            initiated_by,
        }
    }

    /// Whether the run ended successfully.
    pub fn is_success(&self) -> bool {
        self.status == AuditStatus::Success
    }
}
