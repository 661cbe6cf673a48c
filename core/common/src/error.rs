//! Common error types for reportsync.

use thiserror::Error;

/// Message fragment the document store client uses once its handle is gone.
pub const CLOSED_MARKER: &str = "already been closed";

/// Top-level error type for reportsync operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Document store rejected or failed an operation.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Transport-level failure while talking to the document store.
    #[error("Network error: {0}")]
    Network(String),

    /// The cached document store handle is no longer usable.
    #[error("Connection has already been closed: {0}")]
    ConnectionClosed(String),

    /// Relational store failure.
    #[error("Database error: {0}")]
    Database(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),
}

impl Error {
    /// Whether this error means the document store handle must be rebuilt.
    ///
    /// Clients that cannot map their failure onto [`Error::ConnectionClosed`]
    /// are still recognized by the message they carry.
    pub fn is_connection_invalidated(&self) -> bool {
        matches!(self, Error::ConnectionClosed(_)) || self.to_string().contains(CLOSED_MARKER)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
