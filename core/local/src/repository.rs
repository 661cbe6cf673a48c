//! Repository traits over the relational store.

use reportsync_common::Result;

use crate::models::{AuditStatus, Photo, Report, SyncAuditRecord, User};

/// User rows.
pub trait UserRepository {
    /// All users, in primary-key order.
    fn users(&self) -> Result<Vec<User>>;

    fn user(&self, id: i64) -> Result<Option<User>>;

    fn user_by_remote_uid(&self, remote_uid: &str) -> Result<Option<User>>;

    fn user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Insert (no ID) or update (ID set) a user.
    ///
    /// # Errors
    /// - Email or remote UID already used by another row
    fn save_user(&self, user: &User) -> Result<User>;
}

/// Report rows.
pub trait ReportRepository {
    /// All reports, in primary-key order.
    fn reports(&self) -> Result<Vec<Report>>;

    fn report_by_remote_id(&self, remote_id: &str) -> Result<Option<Report>>;

    /// Report of `user_id` with exactly this position and description.
    ///
    /// A `None` description only matches rows without one.
    fn report_by_natural_key(
        &self,
        user_id: i64,
        latitude: f64,
        longitude: f64,
        description: Option<&str>,
    ) -> Result<Option<Report>>;

    /// Insert (no ID) or update (ID set) a report.
    fn save_report(&self, report: &Report) -> Result<Report>;
}

/// Photo rows.
pub trait PhotoRepository {
    /// Photo with this URL, whatever report owns it.
    fn photo_by_url(&self, url: &str) -> Result<Option<Photo>>;

    fn photos_for_report(&self, report_id: i64) -> Result<Vec<Photo>>;

    fn save_photo(&self, photo: &Photo) -> Result<Photo>;
}

/// Sync audit log.
pub trait AuditRepository {
    /// Insert a finished run.
    ///
    /// # Errors
    /// - The record already has an ID (records are never updated)
    fn save_audit(&self, record: &SyncAuditRecord) -> Result<SyncAuditRecord>;

    /// Runs, newest first, optionally filtered by status.
    fn audits(&self, status: Option<AuditStatus>) -> Result<Vec<SyncAuditRecord>>;

    fn audit(&self, id: i64) -> Result<Option<SyncAuditRecord>>;
}

/// Transaction boundary around a top-level operation.
pub trait Transactional {
    fn begin(&self) -> Result<()>;

    fn commit(&self) -> Result<()>;

    fn rollback(&self) -> Result<()>;
}

/// Everything the sync engine needs from the relational store.
pub trait LocalStore:
    UserRepository + ReportRepository + PhotoRepository + AuditRepository + Transactional + Send + Sync
{
}

impl<T> LocalStore for T where
    T: UserRepository
        + ReportRepository
        + PhotoRepository
        + AuditRepository
        + Transactional
        + Send
        + Sync
{
}
