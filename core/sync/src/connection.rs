//! Ownership of the document store handle.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use reportsync_common::{Error, Result};
use reportsync_remote::{Connector, DocumentStore};

/// Owns the single cached document store handle.
///
/// The handle is built lazily through the [`Connector`]. When it turns out to
/// be invalidated, [`RemoteConnection::reinitialize`] closes it and builds a
/// fresh one; nothing else in the engine keeps a handle across runs.
pub struct RemoteConnection {
    connector: Arc<dyn Connector>,
    handle: RwLock<Option<Arc<dyn DocumentStore>>>,
}

impl RemoteConnection {
    /// Create a manager that has not connected yet.
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            handle: RwLock::new(None),
        }
    }

    /// Connect unless a handle is already cached.
    pub async fn init(&self) -> Result<Arc<dyn DocumentStore>> {
        let mut handle = self.handle.write().await;
        if let Some(store) = handle.as_ref() {
            return Ok(store.clone());
        }

        let store = self.connector.connect().await?;
        info!("Connected to document store ({})", store.name());
        *handle = Some(store.clone());
        Ok(store)
    }

    /// The cached handle, connecting on first use.
    pub async fn get(&self) -> Result<Arc<dyn DocumentStore>> {
        if let Some(store) = self.handle.read().await.as_ref() {
            return Ok(store.clone());
        }
        self.init().await
    }

    /// The cached handle after a successful liveness probe.
    ///
    /// # Errors
    /// - [`Error::ConnectionClosed`] when the probe fails, whatever the cause
    pub async fn live(&self) -> Result<Arc<dyn DocumentStore>> {
        let store = self.get().await?;
        match store.ping().await {
            Ok(()) => Ok(store),
            Err(err) if err.is_connection_invalidated() => Err(err),
            Err(err) => Err(Error::ConnectionClosed(format!(
                "liveness probe failed: {}",
                err
            ))),
        }
    }

    /// Close the cached handle and build a new one.
    pub async fn reinitialize(&self) -> Result<Arc<dyn DocumentStore>> {
        let mut handle = self.handle.write().await;
        if let Some(old) = handle.take() {
            if let Err(e) = old.close().await {
                warn!("Failed to close stale document store handle: {}", e);
            }
        }

        info!("Reinitializing document store connection");
        let store = self.connector.connect().await?;
        *handle = Some(store.clone());
        Ok(store)
    }

    /// Close and drop the cached handle, if any.
    pub async fn close(&self) -> Result<()> {
        if let Some(store) = self.handle.write().await.take() {
            debug!("Closing document store handle");
            store.close().await?;
        }
        Ok(())
    }

    /// Whether a handle is currently cached.
    #[cfg(test)]
    async fn is_connected(&self) -> bool {
        self.handle.read().await.is_some()
    }
}
