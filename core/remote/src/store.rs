//! Document store trait definition.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use reportsync_common::Result;

use crate::document::{Document, DocumentData};

/// Capability interface over a collection/document store.
///
/// Implementations must report a handle that can no longer be used with
/// [`reportsync_common::Error::ConnectionClosed`] (or an error whose message
/// contains "already been closed") so the caller can rebuild it.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Get the store name (e.g., "firestore", "memory").
    fn name(&self) -> &str;

    /// Read every document of a collection.
    async fn get_all(&self, collection: &str) -> Result<Vec<Document>>;

    /// Read a single document.
    ///
    /// # Returns
    /// `None` if the document does not exist.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Documents whose `field` equals `value` exactly.
    async fn query_equal(&self, collection: &str, field: &str, value: &Value)
        -> Result<Vec<Document>>;

    /// Documents matching every `(field, value)` equality.
    async fn query_equal_all(
        &self,
        collection: &str,
        filters: &[(&str, Value)],
    ) -> Result<Vec<Document>>;

    /// Create a document with a store-generated ID.
    ///
    /// # Postconditions
    /// - Returns the generated ID
    async fn create(&self, collection: &str, data: DocumentData) -> Result<String>;

    /// Create or fully overwrite the document at `id`.
    async fn set(&self, collection: &str, id: &str, data: DocumentData) -> Result<()>;

    /// Merge `data` into an existing document.
    ///
    /// # Errors
    /// - Document not found
    async fn update(&self, collection: &str, id: &str, data: DocumentData) -> Result<()>;

    /// Check if a document exists.
    async fn exists(&self, collection: &str, id: &str) -> Result<bool> {
        Ok(self.get(collection, id).await?.is_some())
    }

    /// Liveness probe for the underlying connection.
    async fn ping(&self) -> Result<()>;

    /// Tear the handle down. Later calls fail with a closed-connection error.
    async fn close(&self) -> Result<()>;
}

/// Builds fresh document store handles.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new handle to the document store.
    async fn connect(&self) -> Result<Arc<dyn DocumentStore>>;
}
