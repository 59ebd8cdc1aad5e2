//! MongoDB-backed store.
//!
//! Each method forwards to exactly one driver call on the bound collection.
//! Errors are converted by kind (see [`RepositoryError`](crate::RepositoryError))
//! and never retried.

use super::{DocumentStore, QueryOptions, UpdateOutcome};
use crate::error::Result;
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{Bson, Document};
use mongodb::options::{FindOneOptions, FindOptions, IndexOptions};
use mongodb::{Collection, Database, IndexModel};
use std::time::Duration;
use tracing::trace;

/// A [`DocumentStore`] over one MongoDB collection.
#[derive(Debug, Clone)]
pub struct MongoStore {
    collection: Collection<Document>,
}

impl MongoStore {
    /// Binds the named collection of `database`. No network traffic happens here.
    pub fn new(database: &Database, collection: &str) -> Self {
        Self {
            collection: database.collection(collection),
        }
    }

    /// The underlying driver collection.
    pub fn collection(&self) -> &Collection<Document> {
        &self.collection
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    fn name(&self) -> &str {
        self.collection.name()
    }

    async fn insert_one(&self, document: &Document) -> Result<Bson> {
        let result = self.collection.insert_one(document).await?;
        Ok(result.inserted_id)
    }

    async fn insert_many(&self, documents: &[Document]) -> Result<Vec<Bson>> {
        let mut result = self.collection.insert_many(documents).await?;
        Ok((0..documents.len())
            .filter_map(|index| result.inserted_ids.remove(&index))
            .collect())
    }

    async fn find(&self, filter: Document, options: QueryOptions) -> Result<Vec<Document>> {
        let mut find_options = FindOptions::default();
        find_options.projection = options.projection;
        find_options.sort = options.sort;

        let cursor = self
            .collection
            .find(filter)
            .with_options(find_options)
            .await?;
        let documents: Vec<Document> = cursor.try_collect().await?;

        trace!(collection = %self.name(), returned = documents.len(), "find");
        Ok(documents)
    }

    async fn find_one(&self, filter: Document, options: QueryOptions) -> Result<Option<Document>> {
        let mut find_options = FindOneOptions::default();
        find_options.projection = options.projection;
        find_options.sort = options.sort;

        Ok(self
            .collection
            .find_one(filter)
            .with_options(find_options)
            .await?)
    }

    async fn update_one(&self, filter: Document, update: Document) -> Result<UpdateOutcome> {
        let result = self.collection.update_one(filter, update).await?;
        Ok(UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
        })
    }

    async fn update_many(&self, filter: Document, update: Document) -> Result<UpdateOutcome> {
        let result = self.collection.update_many(filter, update).await?;
        Ok(UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
        })
    }

    async fn delete_one(&self, filter: Document) -> Result<u64> {
        let result = self.collection.delete_one(filter).await?;
        Ok(result.deleted_count)
    }

    async fn create_ttl_index(&self, field: &str, ttl: Duration) -> Result<()> {
        let mut keys = Document::new();
        keys.insert(field, 1);

        let mut options = IndexOptions::default();
        options.expire_after = Some(ttl);
        options.background = Some(true);

        let index = IndexModel::builder().keys(keys).options(options).build();
        let result = self.collection.create_index(index).await?;
        trace!(collection = %self.name(), index = %result.index_name, "create_index");
        Ok(())
    }
}
