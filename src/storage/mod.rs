//! Document Store Module
//!
//! This module defines the seam between the repository and whatever actually
//! holds the documents. Every repository operation maps onto exactly one
//! [`DocumentStore`] call.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  CollectionRepository                       │
//! └──────────────────────────┬──────────────────────────────────┘
//!                            │ one call per operation
//!                            ▼
//!              ┌─────────────────────────────┐
//!              │   trait DocumentStore       │
//!              └──────┬───────────────┬──────┘
//!                     │               │
//!                     ▼               ▼
//!          ┌────────────────┐  ┌─────────────────────────────┐
//!          │  MongoStore    │  │  MemoryStore                │
//!          │  (driver)      │  │  ┌───────┐┌───────┐┌─────┐  │
//!          └────────────────┘  │  │Shard 0││Shard 1││..15 │  │
//!                              │  └───────┘└───────┘└─────┘  │
//!                              └──────────────▲──────────────┘
//!                                             │
//!                               ┌─────────────┴─────────────┐
//!                               │     ExpirySweeper         │
//!                               │  (TTL indexes, Tokio task)│
//!                               └───────────────────────────┘
//! ```
//!
//! ## Backends
//!
//! - [`MongoStore`]: one `mongodb::Collection`, every method is a single driver call
//! - [`MemoryStore`]: in-process store that understands the subset of the
//!   MongoDB query language the repository issues, including TTL indexes
//!
//! ## Example
//!
//! ```
//! use docrepo::storage::{DocumentStore, MemoryStore, QueryOptions};
//! use mongodb::bson::doc;
//!
//! # tokio_test::block_on(async {
//! let store = MemoryStore::new("orders");
//! store.insert_one(&doc! { "name": "test", "total": 3 }).await.unwrap();
//!
//! let found = store
//!     .find(doc! { "total": { "$gt": 2 } }, QueryOptions::default())
//!     .await
//!     .unwrap();
//! assert_eq!(found.len(), 1);
//! # });
//! ```

pub mod engine;
pub mod expiry;
pub mod matcher;
pub mod mongo;

use crate::error::Result;
use async_trait::async_trait;
use mongodb::bson::{Bson, Document};
use std::sync::Arc;
use std::time::Duration;

// Re-export commonly used types
pub use engine::{MemoryStore, StoreStats};
pub use expiry::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper};
pub use mongo::MongoStore;

/// Largest TTL an index accepts. The server stores `expireAfterSeconds` as int32.
pub const MAX_TTL_SECS: u64 = i32::MAX as u64;

/// Projection and sort applied to a read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub projection: Option<Document>,
    pub sort: Option<Document>,
}

impl QueryOptions {
    pub fn projected(projection: Document) -> Self {
        Self {
            projection: Some(projection),
            sort: None,
        }
    }

    pub fn sorted(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }
}

/// Result of an update call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Documents that matched the filter
    pub matched: u64,
    /// Documents whose content actually changed
    pub modified: u64,
}

/// The store primitives the repository is built on.
///
/// Implementations are bound to a single collection.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Name of the bound collection.
    fn name(&self) -> &str;

    /// Persists one document and returns its `_id`.
    async fn insert_one(&self, document: &Document) -> Result<Bson>;

    /// Persists documents in order; returns their `_id`s in input order.
    async fn insert_many(&self, documents: &[Document]) -> Result<Vec<Bson>>;

    async fn find(&self, filter: Document, options: QueryOptions) -> Result<Vec<Document>>;

    async fn find_one(&self, filter: Document, options: QueryOptions) -> Result<Option<Document>>;

    async fn update_one(&self, filter: Document, update: Document) -> Result<UpdateOutcome>;

    async fn update_many(&self, filter: Document, update: Document) -> Result<UpdateOutcome>;

    /// Deletes the first match; returns 0 or 1.
    async fn delete_one(&self, filter: Document) -> Result<u64>;

    /// Creates an ascending index on `field` that expires documents `ttl`
    /// after the date stored in that field.
    async fn create_ttl_index(&self, field: &str, ttl: Duration) -> Result<()>;
}

#[async_trait]
impl<T: DocumentStore + ?Sized> DocumentStore for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn insert_one(&self, document: &Document) -> Result<Bson> {
        (**self).insert_one(document).await
    }

    async fn insert_many(&self, documents: &[Document]) -> Result<Vec<Bson>> {
        (**self).insert_many(documents).await
    }

    async fn find(&self, filter: Document, options: QueryOptions) -> Result<Vec<Document>> {
        (**self).find(filter, options).await
    }

    async fn find_one(&self, filter: Document, options: QueryOptions) -> Result<Option<Document>> {
        (**self).find_one(filter, options).await
    }

    async fn update_one(&self, filter: Document, update: Document) -> Result<UpdateOutcome> {
        (**self).update_one(filter, update).await
    }

    async fn update_many(&self, filter: Document, update: Document) -> Result<UpdateOutcome> {
        (**self).update_many(filter, update).await
    }

    async fn delete_one(&self, filter: Document) -> Result<u64> {
        (**self).delete_one(filter).await
    }

    async fn create_ttl_index(&self, field: &str, ttl: Duration) -> Result<()> {
        (**self).create_ttl_index(field, ttl).await
    }
}
