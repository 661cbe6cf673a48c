//! Firestore document store for reportsync.
//!
//! This module provides a [`crate::DocumentStore`] backed by the Firestore
//! REST API with:
//! - Typed value encoding/decoding
//! - Structured queries for equality filters
//! - Writes through `:commit` so `REQUEST_TIME` transforms stamp timestamps

pub mod client;
pub mod value;

pub use client::{FirestoreClient, FirestoreConfig, FirestoreConnector};
