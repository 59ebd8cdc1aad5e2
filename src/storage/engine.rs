//! In-Memory Document Store with TTL Indexes
//!
//! This module implements [`MemoryStore`], a thread-safe, in-process
//! collection that speaks the same [`DocumentStore`] contract as the MongoDB
//! backend. Tests, benchmarks and the `--memory` demo run against it.
//!
//! ## Design Decisions
//!
//! 1. **Sharded Locks**: documents are spread over shards by `_id` so writers
//!    to different documents do not contend.
//! 2. **Natural Order**: every document carries an insertion sequence number;
//!    scans are merged back into insertion order, which is what an unsorted
//!    MongoDB query returns on a fresh collection.
//! 3. **Lazy + Active Expiry**: documents past their TTL are skipped by reads
//!    and physically removed by the [`ExpirySweeper`](super::ExpirySweeper).
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       MemoryStore                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! │                                                             │
//! │  ttl_indexes: RwLock<HashMap<field, Duration>>              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Updates and deletes pick their targets from a snapshot, then re-check the
//! filter under the shard's write lock before touching a document.

use super::matcher;
use super::{DocumentStore, QueryOptions, UpdateOutcome, MAX_TTL_SECS};
use crate::error::{RepositoryError, Result};
use async_trait::async_trait;
use mongodb::bson::{oid::ObjectId, Bson, DateTime, Document};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::debug;

/// Number of shards. Collections here are small; 16 keeps scans cheap.
const NUM_SHARDS: usize = 16;

/// A stored document and its insertion sequence number.
#[derive(Debug, Clone)]
struct StoredDocument {
    seq: u64,
    document: Document,
}

/// One shard of the collection, keyed by the canonical form of `_id`.
#[derive(Debug, Default)]
struct Shard {
    documents: RwLock<HashMap<String, StoredDocument>>,
}

impl Shard {
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, StoredDocument>> {
        self.documents.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, StoredDocument>> {
        self.documents.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Operation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub documents: u64,
    pub inserts: u64,
    pub reads: u64,
    pub updates: u64,
    pub deletes: u64,
    pub expired: u64,
}

/// An in-process collection.
///
/// Wrap it in an `Arc` to share it between a repository and an
/// [`ExpirySweeper`](super::ExpirySweeper).
///
/// # Example
///
/// ```
/// use docrepo::storage::MemoryStore;
/// use mongodb::bson::doc;
///
/// let store = MemoryStore::new("orders");
/// store.insert(doc! { "name": "test" }).unwrap();
/// assert_eq!(store.len(), 1);
/// ```
pub struct MemoryStore {
    name: String,
    shards: Vec<Shard>,
    ttl_indexes: RwLock<HashMap<String, Duration>>,
    next_seq: AtomicU64,

    doc_count: AtomicU64,
    insert_count: AtomicU64,
    read_count: AtomicU64,
    update_count: AtomicU64,
    delete_count: AtomicU64,
    expired_count: AtomicU64,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("name", &self.name)
            .field("shards", &self.shards.len())
            .field("documents", &self.doc_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl MemoryStore {
    /// Creates an empty collection with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shards: (0..NUM_SHARDS).map(|_| Shard::default()).collect(),
            ttl_indexes: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            doc_count: AtomicU64::new(0),
            insert_count: AtomicU64::new(0),
            read_count: AtomicU64::new(0),
            update_count: AtomicU64::new(0),
            delete_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        }
    }

    /// Canonical string form of an `_id`, used as the shard map key.
    ///
    /// Numbers that compare equal share a key, so `1`, `1_i64` and `1.0`
    /// collide like they do in a MongoDB `_id` index.
    fn id_key(id: &Bson) -> String {
        match id {
            Bson::ObjectId(oid) => oid.to_hex(),
            Bson::Int32(n) => format!("{:?}", Bson::Int64(*n as i64)),
            Bson::Double(n)
                if n.fract() == 0.0 && *n >= i64::MIN as f64 && *n < i64::MAX as f64 =>
            {
                format!("{:?}", Bson::Int64(*n as i64))
            }
            other => format!("{:?}", other),
        }
    }

    #[inline]
    fn shard_for(&self, key: &str) -> &Shard {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % NUM_SHARDS]
    }

    fn ttl_snapshot(&self) -> Vec<(String, Duration)> {
        self.ttl_indexes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(field, ttl)| (field.clone(), *ttl))
            .collect()
    }

    /// A document expires once the earliest date under an indexed field,
    /// plus that index's TTL, is in the past. Non-date values never expire.
    fn is_expired(document: &Document, ttls: &[(String, Duration)], now_ms: i64) -> bool {
        ttls.iter().any(|(field, ttl)| {
            let earliest = matcher::resolve_path(document, field)
                .into_iter()
                .flat_map(|value| match value {
                    Bson::Array(items) => items.iter().collect::<Vec<_>>(),
                    other => vec![other],
                })
                .filter_map(|value| match value {
                    Bson::DateTime(dt) => Some(dt.timestamp_millis()),
                    _ => None,
                })
                .min();
            earliest
                .map(|ms| {
                    let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
                    ms.saturating_add(ttl_ms) <= now_ms
                })
                .unwrap_or(false)
        })
    }

    /// Live documents with their shard keys, in insertion order.
    fn snapshot(&self) -> Vec<(String, StoredDocument)> {
        let ttls = self.ttl_snapshot();
        let now_ms = DateTime::now().timestamp_millis();

        let mut live: Vec<(String, StoredDocument)> = Vec::new();
        for shard in &self.shards {
            let documents = shard.read();
            live.extend(
                documents
                    .iter()
                    .filter(|(_, stored)| !Self::is_expired(&stored.document, &ttls, now_ms))
                    .map(|(key, stored)| (key.clone(), stored.clone())),
            );
        }
        live.sort_by_key(|(_, stored)| stored.seq);
        live
    }

    /// Live documents matching `filter`, in insertion order.
    fn matching(&self, filter: &Document) -> Result<Vec<(String, StoredDocument)>> {
        let mut matched = Vec::new();
        for (key, stored) in self.snapshot() {
            if matcher::matches(&stored.document, filter).map_err(RepositoryError::Query)? {
                matched.push((key, stored));
            }
        }
        Ok(matched)
    }

    /// Inserts one document, generating an ObjectId `_id` when absent.
    ///
    /// # Returns
    ///
    /// The document's `_id`, or a `Write` error if the `_id` is taken.
    pub fn insert(&self, document: Document) -> Result<Bson> {
        self.insert_count.fetch_add(1, Ordering::Relaxed);

        let document = if document.contains_key("_id") {
            document
        } else {
            let mut with_id = Document::new();
            with_id.insert("_id", ObjectId::new());
            for (key, value) in document {
                with_id.insert(key, value);
            }
            with_id
        };
        let id = document.get("_id").cloned().unwrap_or(Bson::Null);
        let key = Self::id_key(&id);

        let mut documents = self.shard_for(&key).write();
        if documents.contains_key(&key) {
            return Err(RepositoryError::Write(format!(
                "E11000 duplicate key error collection: {} index: _id_ dup key: {{ _id: {} }}",
                self.name, id
            )));
        }
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        documents.insert(key, StoredDocument { seq, document });
        self.doc_count.fetch_add(1, Ordering::Relaxed);

        Ok(id)
    }

    /// Runs a query: filter, then sort, then projection.
    pub fn query(&self, filter: &Document, options: &QueryOptions) -> Result<Vec<Document>> {
        self.read_count.fetch_add(1, Ordering::Relaxed);

        let sort_fields = match &options.sort {
            Some(sort) => matcher::sort_fields(sort).map_err(RepositoryError::Query)?,
            None => Vec::new(),
        };

        let mut documents: Vec<Document> = self
            .matching(filter)?
            .into_iter()
            .map(|(_, stored)| stored.document)
            .collect();

        if !sort_fields.is_empty() {
            matcher::sort_documents(&mut documents, &sort_fields);
        }
        if let Some(projection) = &options.projection {
            documents = documents
                .iter()
                .map(|document| matcher::project(document, projection))
                .collect();
        }

        Ok(documents)
    }

    /// Applies `update` to the first match, or to every match when `multi`.
    pub fn update(&self, filter: &Document, update: &Document, multi: bool) -> Result<UpdateOutcome> {
        self.update_count.fetch_add(1, Ordering::Relaxed);
        matcher::validate_update(update).map_err(RepositoryError::Write)?;

        let mut outcome = UpdateOutcome::default();
        for (key, _) in self.matching(filter)? {
            let mut documents = self.shard_for(&key).write();
            let Some(stored) = documents.get_mut(&key) else {
                continue;
            };
            // Another writer may have changed it since the snapshot
            if !matcher::matches(&stored.document, filter).map_err(RepositoryError::Query)? {
                continue;
            }

            let mut updated = stored.document.clone();
            let changed =
                matcher::apply_update(&mut updated, update).map_err(RepositoryError::Write)?;
            outcome.matched += 1;
            if changed {
                stored.document = updated;
                outcome.modified += 1;
            }

            if !multi {
                break;
            }
        }

        Ok(outcome)
    }

    /// Deletes the first live document matching `filter`.
    pub fn delete_first(&self, filter: &Document) -> Result<u64> {
        self.delete_count.fetch_add(1, Ordering::Relaxed);

        for (key, _) in self.matching(filter)? {
            let mut documents = self.shard_for(&key).write();
            let still_matches = match documents.get(&key) {
                Some(stored) => {
                    matcher::matches(&stored.document, filter).map_err(RepositoryError::Query)?
                }
                None => false,
            };
            if still_matches {
                documents.remove(&key);
                self.doc_count.fetch_sub(1, Ordering::Relaxed);
                return Ok(1);
            }
        }
        Ok(0)
    }

    /// Registers a TTL index on `field`.
    ///
    /// Re-registering with the same TTL is a no-op; a different TTL is an
    /// `Index` error, mirroring the server's IndexOptionsConflict.
    pub fn add_ttl_index(&self, field: &str, ttl: Duration) -> Result<()> {
        if ttl.as_secs() > MAX_TTL_SECS {
            return Err(RepositoryError::Index(format!(
                "TTL index 'expireAfterSeconds' must be within [0, {}], got {}",
                MAX_TTL_SECS,
                ttl.as_secs()
            )));
        }
        let mut indexes = self.ttl_indexes.write().unwrap_or_else(|e| e.into_inner());
        match indexes.get(field) {
            Some(existing) if *existing == ttl => Ok(()),
            Some(existing) => Err(RepositoryError::Index(format!(
                "An equivalent index already exists with a different name and options: \
                 {}_1 expireAfterSeconds {} (requested {})",
                field,
                existing.as_secs(),
                ttl.as_secs()
            ))),
            None => {
                indexes.insert(field.to_string(), ttl);
                debug!(collection = %self.name, field, ttl_secs = ttl.as_secs(), "TTL index created");
                Ok(())
            }
        }
    }

    /// Returns true if any TTL index is registered.
    pub fn has_ttl_indexes(&self) -> bool {
        !self
            .ttl_indexes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }

    /// Physically removes expired documents from every shard.
    ///
    /// This is called by the background expiry sweeper.
    ///
    /// # Returns
    ///
    /// The number of documents removed.
    pub fn cleanup_expired(&self) -> u64 {
        let ttls = self.ttl_snapshot();
        if ttls.is_empty() {
            return 0;
        }
        let now_ms = DateTime::now().timestamp_millis();

        let mut cleaned = 0u64;
        for shard in &self.shards {
            let mut documents = shard.write();
            let before = documents.len();
            documents.retain(|_, stored| !Self::is_expired(&stored.document, &ttls, now_ms));
            cleaned += (before - documents.len()) as u64;
        }

        if cleaned > 0 {
            self.doc_count.fetch_sub(cleaned, Ordering::Relaxed);
            self.expired_count.fetch_add(cleaned, Ordering::Relaxed);
        }
        cleaned
    }

    /// Removes every document. TTL indexes are kept.
    pub fn flush(&self) {
        for shard in &self.shards {
            shard.write().clear();
        }
        self.doc_count.store(0, Ordering::Relaxed);
    }

    /// Number of stored documents, including expired ones not yet swept.
    pub fn len(&self) -> u64 {
        self.doc_count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            documents: self.doc_count.load(Ordering::Relaxed),
            inserts: self.insert_count.load(Ordering::Relaxed),
            reads: self.read_count.load(Ordering::Relaxed),
            updates: self.update_count.load(Ordering::Relaxed),
            deletes: self.delete_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert_one(&self, document: &Document) -> Result<Bson> {
        self.insert(document.clone())
    }

    async fn insert_many(&self, documents: &[Document]) -> Result<Vec<Bson>> {
        // Ordered semantics: stop at the first failure, keep what went in.
        documents
            .iter()
            .map(|document| self.insert(document.clone()))
            .collect()
    }

    async fn find(&self, filter: Document, options: QueryOptions) -> Result<Vec<Document>> {
        self.query(&filter, &options)
    }

    async fn find_one(&self, filter: Document, options: QueryOptions) -> Result<Option<Document>> {
        Ok(self.query(&filter, &options)?.into_iter().next())
    }

    async fn update_one(&self, filter: Document, update: Document) -> Result<UpdateOutcome> {
        self.update(&filter, &update, false)
    }

    async fn update_many(&self, filter: Document, update: Document) -> Result<UpdateOutcome> {
        self.update(&filter, &update, true)
    }

    async fn delete_one(&self, filter: Document) -> Result<u64> {
        self.delete_first(&filter)
    }

    async fn create_ttl_index(&self, field: &str, ttl: Duration) -> Result<()> {
        self.add_ttl_index(field, ttl)
    }
}
