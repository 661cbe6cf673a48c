//! In-memory document store for testing.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use reportsync_common::{Error, Result};

use crate::document::{Document, DocumentData, Fields};
use crate::store::{Connector, DocumentStore};

type Collections = HashMap<String, BTreeMap<String, Fields>>;

/// In-memory document store.
///
/// Useful for testing and dry runs. Handles created from the same
/// [`MemoryConnector`] share their data but each one can be closed on its
/// own, which is how tests simulate an invalidated client.
pub struct MemoryDocumentStore {
    storage: Arc<RwLock<Collections>>,
    closed: AtomicBool,
}

impl MemoryDocumentStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::with_storage(Arc::new(RwLock::new(HashMap::new())))
    }

    fn with_storage(storage: Arc<RwLock<Collections>>) -> Self {
        Self {
            storage,
            closed: AtomicBool::new(false),
        }
    }

    /// Insert a document as-is, bypassing write semantics.
    pub fn insert(&self, collection: &str, id: &str, value: Value) -> Result<()> {
        let Value::Object(fields) = value else {
            return Err(Error::InvalidInput("Document must be a JSON object".to_string()));
        };
        self.write()?
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
        Ok(())
    }

    /// Remove a document, as if another client deleted it.
    pub fn remove(&self, collection: &str, id: &str) -> Result<bool> {
        Ok(self
            .write()?
            .get_mut(collection)
            .map(|docs| docs.remove(id).is_some())
            .unwrap_or(false))
    }

    /// Number of documents in a collection.
    pub fn count(&self, collection: &str) -> Result<usize> {
        Ok(self.read()?.get(collection).map_or(0, BTreeMap::len))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ConnectionClosed("memory store handle".to_string()));
        }
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Collections>> {
        self.storage
            .read()
            .map_err(|_| Error::Storage("Memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Collections>> {
        self.storage
            .write()
            .map_err(|_| Error::Storage("Memory store lock poisoned".to_string()))
    }

    fn materialize(data: DocumentData) -> Fields {
        let now = Value::String(Utc::now().to_rfc3339());
        let mut fields = data.fields().clone();
        for name in data.server_timestamp_fields() {
            fields.insert(name.clone(), now.clone());
        }
        fields
    }

    fn matches(fields: &Fields, filters: &[(&str, Value)]) -> bool {
        filters.iter().all(|(field, expected)| {
            fields
                .get(*field)
                .is_some_and(|actual| values_equal(actual, expected))
        })
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Equality the way a document store compares values: numbers by value.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get_all(&self, collection: &str) -> Result<Vec<Document>> {
        self.ensure_open()?;
        let storage = self.read()?;
        Ok(storage
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        self.ensure_open()?;
        let storage = self.read()?;
        Ok(storage
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Document::new(id, fields.clone())))
    }

    async fn query_equal(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>> {
        self.query_equal_all(collection, &[(field, value.clone())]).await
    }

    async fn query_equal_all(
        &self,
        collection: &str,
        filters: &[(&str, Value)],
    ) -> Result<Vec<Document>> {
        self.ensure_open()?;
        let storage = self.read()?;
        Ok(storage
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, fields)| Self::matches(fields, filters))
                    .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create(&self, collection: &str, data: DocumentData) -> Result<String> {
        self.ensure_open()?;
        let id = Uuid::new_v4().simple().to_string();
        self.write()?
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), Self::materialize(data));
        Ok(id)
    }

    async fn set(&self, collection: &str, id: &str, data: DocumentData) -> Result<()> {
        self.ensure_open()?;
        self.write()?
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), Self::materialize(data));
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, data: DocumentData) -> Result<()> {
        self.ensure_open()?;
        let mut storage = self.write()?;
        let existing = storage
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| Error::NotFound(format!("Document not found: {}/{}", collection, id)))?;
        existing.extend(Self::materialize(data));
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.ensure_open()
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector handing out memory store handles over shared data.
pub struct MemoryConnector {
    storage: Arc<RwLock<Collections>>,
    connections: AtomicUsize,
}

impl MemoryConnector {
    /// Create a connector over an empty data set.
    pub fn new() -> Self {
        Self {
            storage: Arc::new(RwLock::new(HashMap::new())),
            connections: AtomicUsize::new(0),
        }
    }

    /// A handle that is never closed, for seeding and inspecting data.
    pub fn inspector(&self) -> MemoryDocumentStore {
        MemoryDocumentStore::with_storage(self.storage.clone())
    }

    /// Number of handles built so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<Arc<dyn DocumentStore>> {
        self.connections.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemoryDocumentStore::with_storage(self.storage.clone())))
    }
}
