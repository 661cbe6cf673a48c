//! Relational store for reportsync.
//!
//! Rows carry auto-increment numeric IDs and the remote identifiers they are
//! linked to. The sync engine reaches them only through the repository traits
//! in [`repository`]; [`SqliteStore`] is the bundled implementation.

pub mod models;
pub mod repository;
pub mod sqlite;

pub use models::{AuditStatus, Photo, Report, SyncAuditRecord, User, DEFAULT_ROLE};
pub use repository::{
    AuditRepository, LocalStore, PhotoRepository, ReportRepository, Transactional,
    UserRepository,
};
pub use sqlite::SqliteStore;
