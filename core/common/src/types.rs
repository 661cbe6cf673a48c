//! Common types used throughout reportsync.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroize;

/// Prefixes of locally generated stand-ins for remote user IDs.
pub const PLACEHOLDER_PREFIXES: &[&str] = &["fb_uid_", "uid_"];

/// Whether `uid` is a locally generated stand-in rather than a real remote ID.
pub fn is_placeholder_uid(uid: &str) -> bool {
    PLACEHOLDER_PREFIXES
        .iter()
        .any(|prefix| uid.starts_with(prefix))
}

/// Returns the remote ID if it can be used to address the document store.
///
/// Empty and placeholder-shaped values are treated as absent.
pub fn usable_remote_id(uid: Option<&str>) -> Option<&str> {
    uid.filter(|uid| !uid.is_empty() && !is_placeholder_uid(uid))
}

/// Lifecycle status of an incident report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    /// Freshly reported, nobody working on it.
    #[default]
    Nouveau,
    /// Work in progress.
    EnCours,
    /// Resolved.
    Termine,
}

impl ReportStatus {
    /// Wire/database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Nouveau => "nouveau",
            ReportStatus::EnCours => "en_cours",
            ReportStatus::Termine => "termine",
        }
    }
}

impl FromStr for ReportStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "nouveau" => Ok(ReportStatus::Nouveau),
            "en_cours" => Ok(ReportStatus::EnCours),
            "termine" => Ok(ReportStatus::Termine),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown report status: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bearer token for the document store, zeroized on drop.
#[derive(Clone, Zeroize, Serialize, Deserialize)]
#[zeroize(drop)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wrap a raw token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Get the raw token for an Authorization header.
    pub fn secret(&self) -> &str {
        &self.0
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessToken([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_placeholder_prefixes() {
        assert!(is_placeholder_uid("fb_uid_42"));
        assert!(is_placeholder_uid("uid_7"));
        assert!(!is_placeholder_uid("abc123"));
    }

    #[test]
    fn test_usable_remote_id() {
        assert_eq!(usable_remote_id(Some("abc123")), Some("abc123"));
        assert_eq!(usable_remote_id(Some("")), None);
        assert_eq!(usable_remote_id(Some("uid_3")), None);
        assert_eq!(usable_remote_id(None), None);
    }

    #[test]
    fn test_report_status_parse() {
        assert_eq!("en_cours".parse::<ReportStatus>().unwrap(), ReportStatus::EnCours);
        assert!("closed".parse::<ReportStatus>().is_err());
        assert_eq!(ReportStatus::default(), ReportStatus::Nouveau);
    }

    #[test]
    fn test_access_token_debug_redacts() {
        let token = AccessToken::new("ya29.secret");
        let debug = format!("{:?}", token);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("REDACTED"));
    }

    proptest! {
        #[test]
        fn prop_prefixed_ids_are_never_usable(suffix in "[a-zA-Z0-9]{0,16}") {
            let fb = format!("fb_uid_{}", suffix);
            let plain = format!("uid_{}", suffix);
            prop_assert!(usable_remote_id(Some(&fb)).is_none());
            prop_assert!(usable_remote_id(Some(&plain)).is_none());
        }
    }
}
