//! Repository Module
//!
//! The public face of the crate: a [`CollectionRepository`] bound to one
//! collection, plus the small typed values its operations take.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                  CollectionRepository<S>                  │
//! │                                                           │
//! │  insert_*   select_*   edit_*   delete_registry   ttl     │
//! │      │          │         │            │           │      │
//! │      └──────────┴────┬────┴────────────┴───────────┘      │
//! │                      ▼                                    │
//! │          filter / update / projection documents           │
//! └──────────────────────┬────────────────────────────────────┘
//!                        ▼
//!            S: DocumentStore (MongoStore | MemoryStore)
//! ```

mod collection;
mod options;

pub use collection::{CollectionRepository, DEFAULT_SORT_PREFIX};
pub use options::{parse_object_id, Increment, Projection, SortOrder, DEFAULT_EXCLUDED_FIELD};
