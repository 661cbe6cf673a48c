//! Document store abstraction for reportsync.
//!
//! This module provides a trait-based interface over the schema-less,
//! collection-oriented store that mirrors the relational data, together with
//! two implementations: an in-memory store for tests and dry runs, and a
//! Firestore REST client.
//!
//! # Design Principles
//! - Capability interface: the sync engine only sees [`DocumentStore`]
//! - Handles are disposable: a [`Connector`] builds fresh ones on demand
//! - Server timestamps are requested, never computed by the caller

pub mod document;
pub mod firestore;
pub mod memory;
pub mod store;

pub use document::{Document, DocumentData};
pub use firestore::{FirestoreClient, FirestoreConfig, FirestoreConnector};
pub use memory::{MemoryConnector, MemoryDocumentStore};
pub use store::{Connector, DocumentStore};
