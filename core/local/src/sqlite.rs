//! SQLite implementation of the repository traits.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use reportsync_common::{Error, ReportStatus, Result};

use crate::models::{AuditStatus, Photo, Report, SyncAuditRecord, User};
use crate::repository::{
    AuditRepository, PhotoRepository, ReportRepository, Transactional, UserRepository,
};

const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    remote_uid TEXT UNIQUE,
    email TEXT UNIQUE,
    first_name TEXT,
    last_name TEXT,
    role TEXT NOT NULL DEFAULT 'utilisateur',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS reports (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    remote_id TEXT UNIQUE,
    user_id INTEGER NOT NULL REFERENCES users(id),
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    description TEXT,
    status TEXT NOT NULL DEFAULT 'nouveau',
    surface REAL,
    budget REAL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    synced_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_reports_natural_key
    ON reports(user_id, latitude, longitude);

CREATE TABLE IF NOT EXISTS photos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    report_id INTEGER NOT NULL REFERENCES reports(id),
    url TEXT NOT NULL UNIQUE,
    caption TEXT,
    uploaded_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS sync_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sync_type TEXT NOT NULL,
    started_at INTEGER NOT NULL,
    records_pulled INTEGER NOT NULL DEFAULT 0,
    records_pushed INTEGER NOT NULL DEFAULT 0,
    conflicts INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL,
    error_message TEXT,
    synced_by INTEGER REFERENCES users(id)
);
"#;

const USER_COLUMNS: &str =
    "id, remote_uid, email, first_name, last_name, role, created_at, updated_at";
const REPORT_COLUMNS: &str = "id, remote_id, user_id, latitude, longitude, description, status, \
     surface, budget, created_at, updated_at, synced_at";
const PHOTO_COLUMNS: &str = "id, report_id, url, caption, uploaded_at";
const AUDIT_COLUMNS: &str = "id, sync_type, started_at, records_pulled, records_pushed, \
     conflicts, status, error_message, synced_by";

/// Converts rusqlite results into the common error type.
trait SqlResultExt<T> {
    fn db(self) -> Result<T>;
}

impl<T> SqlResultExt<T> for rusqlite::Result<T> {
    fn db(self) -> Result<T> {
        self.map_err(|e| Error::Database(e.to_string()))
    }
}

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let millis: i64 = row.get(idx)?;
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Integer,
            Box::new(Error::InvalidInput(format!("Timestamp out of range: {}", millis))),
        )
    })
}

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = Error>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: Some(row.get(0)?),
        remote_uid: row.get(1)?,
        email: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        role: row.get(5)?,
        created_at: from_millis(row, 6)?,
        updated_at: from_millis(row, 7)?,
    })
}

fn report_from_row(row: &Row<'_>) -> rusqlite::Result<Report> {
    let synced_at: Option<i64> = row.get(11)?;
    Ok(Report {
        id: Some(row.get(0)?),
        remote_id: row.get(1)?,
        user_id: row.get(2)?,
        latitude: row.get(3)?,
        longitude: row.get(4)?,
        description: row.get(5)?,
        status: parse_column::<ReportStatus>(row, 6)?,
        surface: row.get(7)?,
        budget: row.get(8)?,
        created_at: from_millis(row, 9)?,
        updated_at: from_millis(row, 10)?,
        synced_at: synced_at.and_then(DateTime::from_timestamp_millis),
    })
}

fn photo_from_row(row: &Row<'_>) -> rusqlite::Result<Photo> {
    Ok(Photo {
        id: Some(row.get(0)?),
        report_id: row.get(1)?,
        url: row.get(2)?,
        caption: row.get(3)?,
        uploaded_at: from_millis(row, 4)?,
    })
}

fn audit_from_row(row: &Row<'_>) -> rusqlite::Result<SyncAuditRecord> {
    Ok(SyncAuditRecord {
        id: Some(row.get(0)?),
        kind: row.get(1)?,
        started_at: from_millis(row, 2)?,
        records_pulled: row.get(3)?,
        records_pushed: row.get(4)?,
        conflicts: row.get(5)?,
        status: parse_column::<AuditStatus>(row, 6)?,
        error_message: row.get(7)?,
        initiated_by: row.get(8)?,
    })
}

/// Relational store backed by a single SQLite connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Create or open a store database.
    ///
    /// # Errors
    /// - Database creation or migration failure
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref()).db()?;
        let store = Self::init(conn)?;
        info!("Relational store opened at {}", db_path.as_ref().display());
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().db()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).db()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Database("Connection lock poisoned".to_string()))
    }

    fn find_user(&self, clause: &str, value: &dyn rusqlite::ToSql) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE {} = ?1", USER_COLUMNS, clause);
        self.conn()?
            .query_row(&sql, [value], user_from_row)
            .optional()
            .db()
    }
}

impl UserRepository for SqliteStore {
    fn users(&self) -> Result<Vec<User>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS))
            .db()?;
        let users = stmt
            .query_map([], user_from_row)
            .db()?
            .collect::<rusqlite::Result<Vec<_>>>()
            .db()?;
        Ok(users)
    }

    fn user(&self, id: i64) -> Result<Option<User>> {
        self.find_user("id", &id)
    }

    fn user_by_remote_uid(&self, remote_uid: &str) -> Result<Option<User>> {
        self.find_user("remote_uid", &remote_uid)
    }

    fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.find_user("email", &email)
    }

    fn save_user(&self, user: &User) -> Result<User> {
        let mut saved = user.clone();
        saved.updated_at = Utc::now();
        let conn = self.conn()?;

        match user.id {
            Some(id) => {
                let rows = conn
                    .execute(
                        "UPDATE users SET remote_uid = ?1, email = ?2, first_name = ?3, \
                         last_name = ?4, role = ?5, updated_at = ?6 WHERE id = ?7",
                        params![
                            saved.remote_uid,
                            saved.email,
                            saved.first_name,
                            saved.last_name,
                            saved.role,
                            to_millis(saved.updated_at),
                            id,
                        ],
                    )
                    .db()?;
                if rows == 0 {
                    return Err(Error::NotFound(format!("User {}", id)));
                }
            }
            None => {
                conn.execute(
                    "INSERT INTO users (remote_uid, email, first_name, last_name, role, \
                     created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        saved.remote_uid,
                        saved.email,
                        saved.first_name,
                        saved.last_name,
                        saved.role,
                        to_millis(saved.created_at),
                        to_millis(saved.updated_at),
                    ],
                )
                .db()?;
                saved.id = Some(conn.last_insert_rowid());
                debug!("Inserted user {:?}", saved.id);
            }
        }

        Ok(saved)
    }
}

impl ReportRepository for SqliteStore {
    fn reports(&self) -> Result<Vec<Report>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {} FROM reports ORDER BY id", REPORT_COLUMNS))
            .db()?;
        let reports = stmt
            .query_map([], report_from_row)
            .db()?
            .collect::<rusqlite::Result<Vec<_>>>()
            .db()?;
        Ok(reports)
    }

    fn report_by_remote_id(&self, remote_id: &str) -> Result<Option<Report>> {
        let sql = format!("SELECT {} FROM reports WHERE remote_id = ?1", REPORT_COLUMNS);
        self.conn()?
            .query_row(&sql, [remote_id], report_from_row)
            .optional()
            .db()
    }

    fn report_by_natural_key(
        &self,
        user_id: i64,
        latitude: f64,
        longitude: f64,
        description: Option<&str>,
    ) -> Result<Option<Report>> {
        let sql = format!(
            "SELECT {} FROM reports WHERE user_id = ?1 AND latitude = ?2 AND longitude = ?3 \
             AND description IS ?4 ORDER BY id LIMIT 1",
            REPORT_COLUMNS
        );
        self.conn()?
            .query_row(
                &sql,
                params![user_id, latitude, longitude, description],
                report_from_row,
            )
            .optional()
            .db()
    }

    fn save_report(&self, report: &Report) -> Result<Report> {
        let mut saved = report.clone();
        saved.updated_at = Utc::now();
        let conn = self.conn()?;

        match report.id {
            Some(id) => {
                let rows = conn
                    .execute(
                        "UPDATE reports SET remote_id = ?1, user_id = ?2, latitude = ?3, \
                         longitude = ?4, description = ?5, status = ?6, surface = ?7, \
                         budget = ?8, updated_at = ?9, synced_at = ?10 WHERE id = ?11",
                        params![
                            saved.remote_id,
                            saved.user_id,
                            saved.latitude,
                            saved.longitude,
                            saved.description,
                            saved.status.as_str(),
                            saved.surface,
                            saved.budget,
                            to_millis(saved.updated_at),
                            saved.synced_at.map(to_millis),
                            id,
                        ],
                    )
                    .db()?;
                if rows == 0 {
                    return Err(Error::NotFound(format!("Report {}", id)));
                }
            }
            None => {
                conn.execute(
                    "INSERT INTO reports (remote_id, user_id, latitude, longitude, description, \
                     status, surface, budget, created_at, updated_at, synced_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    params![
                        saved.remote_id,
                        saved.user_id,
                        saved.latitude,
                        saved.longitude,
                        saved.description,
                        saved.status.as_str(),
                        saved.surface,
                        saved.budget,
                        to_millis(saved.created_at),
                        to_millis(saved.updated_at),
                        saved.synced_at.map(to_millis),
                    ],
                )
                .db()?;
                saved.id = Some(conn.last_insert_rowid());
                debug!("Inserted report {:?}", saved.id);
            }
        }

        Ok(saved)
    }
}

impl PhotoRepository for SqliteStore {
    fn photo_by_url(&self, url: &str) -> Result<Option<Photo>> {
        let sql = format!("SELECT {} FROM photos WHERE url = ?1", PHOTO_COLUMNS);
        self.conn()?
            .query_row(&sql, [url], photo_from_row)
            .optional()
            .db()
    }

    fn photos_for_report(&self, report_id: i64) -> Result<Vec<Photo>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM photos WHERE report_id = ?1 ORDER BY id",
                PHOTO_COLUMNS
            ))
            .db()?;
        let photos = stmt
            .query_map([report_id], photo_from_row)
            .db()?
            .collect::<rusqlite::Result<Vec<_>>>()
            .db()?;
        Ok(photos)
    }

    fn save_photo(&self, photo: &Photo) -> Result<Photo> {
        let mut saved = photo.clone();
        let conn = self.conn()?;

        match photo.id {
            Some(id) => {
                conn.execute(
                    "UPDATE photos SET report_id = ?1, url = ?2, caption = ?3, uploaded_at = ?4 \
                     WHERE id = ?5",
                    params![
                        saved.report_id,
                        saved.url,
                        saved.caption,
                        to_millis(saved.uploaded_at),
                        id
                    ],
                )
                .db()?;
            }
            None => {
                conn.execute(
                    "INSERT INTO photos (report_id, url, caption, uploaded_at) \
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        saved.report_id,
                        saved.url,
                        saved.caption,
                        to_millis(saved.uploaded_at)
                    ],
                )
                .db()?;
                saved.id = Some(conn.last_insert_rowid());
            }
        }

        Ok(saved)
    }
}

impl AuditRepository for SqliteStore {
    fn save_audit(&self, record: &SyncAuditRecord) -> Result<SyncAuditRecord> {
        if let Some(id) = record.id {
            return Err(Error::AlreadyExists(format!("Sync log {} is immutable", id)));
        }

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sync_log (sync_type, started_at, records_pulled, records_pushed, \
             conflicts, status, error_message, synced_by) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.kind,
                to_millis(record.started_at),
                record.records_pulled,
                record.records_pushed,
                record.conflicts,
                record.status.as_str(),
                record.error_message,
                record.initiated_by,
            ],
        )
        .db()?;

        let mut saved = record.clone();
        saved.id = Some(conn.last_insert_rowid());
        Ok(saved)
    }

    fn audits(&self, status: Option<AuditStatus>) -> Result<Vec<SyncAuditRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM sync_log WHERE (?1 IS NULL OR status = ?1) \
                 ORDER BY started_at DESC, id DESC",
                AUDIT_COLUMNS
            ))
            .db()?;
        let records = stmt
            .query_map([status.map(|s| s.as_str())], audit_from_row)
            .db()?
            .collect::<rusqlite::Result<Vec<_>>>()
            .db()?;
        Ok(records)
    }

    fn audit(&self, id: i64) -> Result<Option<SyncAuditRecord>> {
        let sql = format!("SELECT {} FROM sync_log WHERE id = ?1", AUDIT_COLUMNS);
        self.conn()?
            .query_row(&sql, [id], audit_from_row)
            .optional()
            .db()
    }
}

impl Transactional for SqliteStore {
    fn begin(&self) -> Result<()> {
        self.conn()?.execute_batch("BEGIN").db()
    }

    fn commit(&self) -> Result<()> {
        self.conn()?.execute_batch("COMMIT").db()
    }

    fn rollback(&self) -> Result<()> {
        self.conn()?.execute_batch("ROLLBACK").db()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store_with_user() -> (SqliteStore, User) {
        let store = SqliteStore::in_memory().unwrap();
        let user = store.save_user(&User::new("a@x.com")).unwrap();
        (store, user)
    }

    #[test]
    fn test_user_insert_and_lookup() {
        let (store, user) = store_with_user();
        assert!(user.id.is_some());

        let mut linked = user.clone();
        linked.remote_uid = Some("abc123".to_string());
        store.save_user(&linked).unwrap();

        let by_uid = store.user_by_remote_uid("abc123").unwrap().unwrap();
        assert_eq!(by_uid.id, user.id);
        let by_email = store.user_by_email("a@x.com").unwrap().unwrap();
        assert_eq!(by_email.remote_uid.as_deref(), Some("abc123"));
        assert_eq!(store.users().unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let (store, _) = store_with_user();
        let result = store.save_user(&User::new("a@x.com"));
        assert!(matches!(result, Err(Error::Database(_))));
    }

    #[test]
    fn test_natural_key_matches_exactly() {
        let (store, user) = store_with_user();
        let user_id = user.id.unwrap();
        store
            .save_report(&Report::new(user_id, 10.0, 20.0).with_description("pothole"))
            .unwrap();
        store.save_report(&Report::new(user_id, 1.5, 2.5)).unwrap();

        assert!(store
            .report_by_natural_key(user_id, 10.0, 20.0, Some("pothole"))
            .unwrap()
            .is_some());
        assert!(store
            .report_by_natural_key(user_id, 10.0, 20.0, Some("crack"))
            .unwrap()
            .is_none());
        assert!(store
            .report_by_natural_key(user_id, 10.000001, 20.0, Some("pothole"))
            .unwrap()
            .is_none());
        // Missing descriptions match missing descriptions.
        assert!(store
            .report_by_natural_key(user_id, 1.5, 2.5, None)
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_report_status_round_trip() {
        let (store, user) = store_with_user();
        let mut report = Report::new(user.id.unwrap(), 3.0, 4.0);
        report.status = ReportStatus::EnCours;
        report.synced_at = Some(Utc::now());
        let saved = store.save_report(&report).unwrap();

        let loaded = store.reports().unwrap().pop().unwrap();
        assert_eq!(loaded.id, saved.id);
        assert_eq!(loaded.status, ReportStatus::EnCours);
        assert!(loaded.synced_at.is_some());
    }

    #[test]
    fn test_photo_url_unique_across_reports() {
        let (store, user) = store_with_user();
        let user_id = user.id.unwrap();
        let first = store.save_report(&Report::new(user_id, 1.0, 1.0)).unwrap();
        let second = store.save_report(&Report::new(user_id, 2.0, 2.0)).unwrap();

        store
            .save_photo(&Photo::new(first.id.unwrap(), "http://x/1.jpg", None))
            .unwrap();
        let dup = store.save_photo(&Photo::new(second.id.unwrap(), "http://x/1.jpg", None));
        assert!(dup.is_err());
        assert!(store.photo_by_url("http://x/1.jpg").unwrap().is_some());
        assert!(store.photos_for_report(second.id.unwrap()).unwrap().is_empty());
    }

    #[test]
    fn test_audit_records_are_immutable() {
        let store = SqliteStore::in_memory().unwrap();
        let mut record = SyncAuditRecord::start("full", None);
        record.status = AuditStatus::Success;
        let saved = store.save_audit(&record).unwrap();

        assert!(matches!(store.save_audit(&saved), Err(Error::AlreadyExists(_))));
        assert_eq!(store.audit(saved.id.unwrap()).unwrap().unwrap().status, AuditStatus::Success);
    }

    #[test]
    fn test_audits_filter_by_status() {
        let store = SqliteStore::in_memory().unwrap();
        for status in [AuditStatus::Success, AuditStatus::Failed, AuditStatus::Success] {
            let mut record = SyncAuditRecord::start("full", None);
            record.status = status;
            store.save_audit(&record).unwrap();
        }

        assert_eq!(store.audits(None).unwrap().len(), 3);
        assert_eq!(store.audits(Some(AuditStatus::Failed)).unwrap().len(), 1);
    }

    #[test]
    fn test_rollback_discards_writes() {
        let store = SqliteStore::in_memory().unwrap();
        store.begin().unwrap();
        store.save_user(&User::new("gone@x.com")).unwrap();
        store.rollback().unwrap();

        assert!(store.user_by_email("gone@x.com").unwrap().is_none());
    }

    #[test]
    fn test_open_on_disk_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reportsync.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.save_user(&User::new("a@x.com")).unwrap();
        }
        let reopened = SqliteStore::open(&path).unwrap();
        assert!(reopened.user_by_email("a@x.com").unwrap().is_some());
    }
}
