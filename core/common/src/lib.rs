//! Common utilities and types shared across reportsync modules.
//!
//! This module provides the error type used by every crate in the workspace
//! and the small domain vocabulary both stores agree on (report status,
//! placeholder identifiers, access tokens).

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{usable_remote_id, is_placeholder_uid, AccessToken, ReportStatus};
