//! Settings file for the sync service.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use reportsync_common::{AccessToken, Error, Result};
use reportsync_remote::firestore::client::{DEFAULT_DATABASE, FIRESTORE_API_BASE};
use reportsync_remote::FirestoreConfig;

use crate::engine::SyncConfig;
use crate::scheduler::SyncMode;

/// Environment variable consulted when the settings carry no access token.
pub const ACCESS_TOKEN_ENV: &str = "REPORTSYNC_ACCESS_TOKEN";

/// Settings file name inside the configuration directory.
pub const SETTINGS_FILENAME: &str = "config.json";

const APP_DIR: &str = "reportsync";

/// Document store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
    pub project_id: String,
    pub database_id: String,
    pub base_url: String,
    /// Bearer token. Falls back to [`ACCESS_TOKEN_ENV`] when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<AccessToken>,
    pub users_collection: String,
    pub reports_collection: String,
    pub timeout_secs: u64,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            database_id: DEFAULT_DATABASE.to_string(),
            base_url: FIRESTORE_API_BASE.to_string(),
            access_token: None,
            users_collection: "users".to_string(),
            reports_collection: "reports".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Retry after an invalidated connection.
///
/// A failed run is retried exactly once, so only the pause is configurable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub initial_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: 500,
        }
    }
}

/// Periodic runs for `watch`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleSettings {
    /// Seconds between runs; `None` means manual only.
    pub interval_secs: Option<u64>,
}

/// Top-level settings, stored as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// SQLite database of the relational store.
    pub database_path: PathBuf,
    pub remote: RemoteSettings,
    pub retry: RetrySettings,
    pub schedule: ScheduleSettings,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            database_path: Self::default_database_path(),
            remote: RemoteSettings::default(),
            retry: RetrySettings::default(),
            schedule: ScheduleSettings::default(),
        }
    }
}

impl SyncSettings {
    /// Default settings file location, under the user's configuration directory.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("."))
            .join(SETTINGS_FILENAME)
    }

    /// Default database location, under the user's data directory.
    pub fn default_database_path() -> PathBuf {
        dirs::data_dir()
            .map(|dir| dir.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("reportsync.db")
    }

    /// Load and validate settings from a JSON file.
    ///
    /// # Errors
    /// - File cannot be read
    /// - Invalid JSON
    /// - Validation failure
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading settings from {}", path.display());
        let json = std::fs::read_to_string(path)?;
        let settings = Self::from_json(&json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Write settings as pretty JSON, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Serialize settings to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize settings from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Check that the settings can drive a sync.
    pub fn validate(&self) -> Result<()> {
        let remote = &self.remote;
        if remote.project_id.trim().is_empty() {
            return Err(Error::Config("remote.project_id must not be empty".to_string()));
        }
        if remote.users_collection.trim().is_empty() || remote.reports_collection.trim().is_empty()
        {
            return Err(Error::Config("Collection names must not be empty".to_string()));
        }
        if remote.timeout_secs == 0 {
            return Err(Error::Config("remote.timeout_secs must be positive".to_string()));
        }
        if self.schedule.interval_secs == Some(0) {
            return Err(Error::Config("schedule.interval_secs must be positive".to_string()));
        }
        Ok(())
    }

    /// Token from the settings, else from [`ACCESS_TOKEN_ENV`].
    pub fn access_token(&self) -> Result<AccessToken> {
        if let Some(token) = self.remote.access_token.as_ref().filter(|t| !t.is_empty()) {
            return Ok(token.clone());
        }
        match std::env::var(ACCESS_TOKEN_ENV) {
            Ok(token) if !token.is_empty() => Ok(AccessToken::new(token)),
            _ => Err(Error::Config(format!(
                "No access token configured; set remote.access_token or {}",
                ACCESS_TOKEN_ENV
            ))),
        }
    }

    /// Firestore client configuration.
    pub fn firestore_config(&self) -> Result<FirestoreConfig> {
        Ok(FirestoreConfig::new(&self.remote.project_id, self.access_token()?)
            .with_database(&self.remote.database_id)
            .with_base_url(&self.remote.base_url)
            .with_timeout(Duration::from_secs(self.remote.timeout_secs)))
    }

    /// Engine configuration.
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            users_collection: self.remote.users_collection.clone(),
            reports_collection: self.remote.reports_collection.clone(),
            retry_delay: Duration::from_millis(self.retry.initial_delay_ms),
        }
    }

    /// Scheduler mode for `watch`.
    pub fn sync_mode(&self) -> SyncMode {
        match self.schedule.interval_secs {
            Some(secs) => SyncMode::Periodic {
                interval: Duration::from_secs(secs),
            },
            None => SyncMode::Manual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn valid() -> SyncSettings {
        let mut settings = SyncSettings::default();
        settings.remote.project_id = "city-reports".to_string();
        settings.remote.access_token = Some(AccessToken::new("token"));
        settings
    }

    #[test]
    fn test_defaults() {
        let settings = SyncSettings::default();
        assert_eq!(settings.remote.database_id, "(default)");
        assert_eq!(settings.sync_config().retry_delay, Duration::from_millis(500));
        assert_eq!(settings.sync_mode(), SyncMode::Manual);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings =
            SyncSettings::from_json(r#"{"remote": {"project_id": "p"}, "schedule": {"interval_secs": 60}}"#)
                .unwrap();

        assert_eq!(settings.remote.users_collection, "users");
        assert_eq!(
            settings.sync_mode(),
            SyncMode::Periodic {
                interval: Duration::from_secs(60)
            }
        );
        settings.validate().unwrap();
    }

    #[test]
    fn test_rejects_empty_collection() {
        let mut settings = valid();
        settings.remote.reports_collection = " ".to_string();
        assert!(matches!(settings.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILENAME);
        valid().save(&path).unwrap();

        let loaded = SyncSettings::load(&path).unwrap();
        assert_eq!(loaded.remote.project_id, "city-reports");
        assert_eq!(loaded.access_token().unwrap().secret(), "token");
        assert_eq!(loaded.sync_config().retry_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_retry_count_is_not_configurable() {
        let settings = SyncSettings::from_json(
            r#"{"remote": {"project_id": "p"}, "retry": {"max_retries": 5, "initial_delay_ms": 20}}"#,
        )
        .unwrap();
        settings.validate().unwrap();

        assert_eq!(settings.sync_config().retry_delay, Duration::from_millis(20));
        assert!(!settings.to_json().unwrap().contains("max_retries"));
    }

    #[test]
    fn test_firestore_config() {
        let config = valid().firestore_config().unwrap();
        assert_eq!(config.project_id, "city-reports");
        assert_eq!(config.timeout, Duration::from_secs(30));
    }
}
