//! # docrepo - A Typed Repository over MongoDB Collections
//!
//! docrepo wraps a MongoDB database behind a small, strongly typed
//! repository: inserts, a family of selects, `$set`/`$inc` edits, deletes
//! and TTL indexes on one fixed collection. Every operation builds a filter
//! or update document and issues exactly one driver call.
//!
//! ## Features
//!
//! - **Connection Handling**: connection string built from configuration with
//!   escaped credentials, verified with a `ping` on connect
//! - **Collection Repository**: insert, select, edit, increment, delete and
//!   TTL index operations with a default read projection
//! - **Pluggable Stores**: the repository runs over MongoDB or over an
//!   in-process [`MemoryStore`](storage::MemoryStore) with the same semantics
//! - **TTL Support**: indexed documents expire, with a background sweeper for
//!   the memory store
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                docrepo                                  │
//! │                                                                         │
//! │  ┌──────────────────┐    ┌──────────────────┐    ┌──────────────────┐   │
//! │  │ ConnectionConfig │───>│ConnectionHandler │───>│CollectionRepo<S> │   │
//! │  │  (env / .env)    │    │ Client, Database │    │  insert / select │   │
//! │  └──────────────────┘    └──────────────────┘    │  edit / delete   │   │
//! │                                                  └────────┬─────────┘   │
//! │                                                           │             │
//! │                                        S: DocumentStore   ▼             │
//! │                     ┌─────────────────────────┬──────────────────────┐  │
//! │                     │       MongoStore        │     MemoryStore      │  │
//! │                     │  (mongodb Collection)   │ (sharded RwLock map) │  │
//! │                     └─────────────────────────┴──────────┬───────────┘  │
//! │                                                          ▲              │
//! │                                              ┌───────────┴────────────┐ │
//! │                                              │    ExpirySweeper       │ │
//! │                                              │ (background Tokio task)│ │
//! │                                              └────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use docrepo::{ConnectionConfig, ConnectionHandler, Increment, SortOrder};
//! use mongodb::bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut handler = ConnectionHandler::new(ConnectionConfig::from_env()?);
//!     handler.connect().await?;
//!     let repo = handler.repository()?;
//!
//!     let order = repo
//!         .insert_document(doc! { "name": "test", "requests": { "pizza": 2 } })
//!         .await?;
//!     let id = order.get_object_id("_id")?.to_hex();
//!
//!     repo.edit_registry(&id, doc! { "status": "open" }).await?;
//!     repo.edit_many_increment(doc! { "name": "test" }, &Increment::new().field("requests.pizza", 1))
//!         .await?;
//!     let top = repo
//!         .select_many_ordered("pizza", doc! {}, SortOrder::Descending)
//!         .await?;
//!     println!("{:?}", top);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`config`]: connection settings and connection-string building
//! - [`connection`]: client lifecycle
//! - [`repository`]: the collection repository and its typed options
//! - [`storage`]: the `DocumentStore` seam and its two backends
//! - [`error`]: the shared error type

pub mod config;
pub mod connection;
pub mod error;
pub mod repository;
pub mod storage;

// Re-export commonly used types for convenience
pub use config::ConnectionConfig;
pub use connection::ConnectionHandler;
pub use error::{RepositoryError, Result};
pub use repository::{parse_object_id, CollectionRepository, Increment, Projection, SortOrder};
pub use storage::{
    start_expiry_sweeper, DocumentStore, ExpiryConfig, ExpirySweeper, MemoryStore, MongoStore,
};

/// The default MongoDB port
pub const DEFAULT_PORT: u16 = 27017;

/// The default MongoDB host
pub const DEFAULT_HOST: &str = "localhost";

/// Collection used when none is configured
pub const DEFAULT_COLLECTION: &str = "collection";

/// Version of docrepo
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
