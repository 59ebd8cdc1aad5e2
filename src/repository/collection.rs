//! Collection Repository
//!
//! CRUD-style operations on one fixed collection. Each method builds a small
//! filter/update document and hands it to exactly one [`DocumentStore`]
//! call; there is no retry, caching or cross-call state.
//!
//! ## Operations
//!
//! | Method | Store call |
//! |---|---|
//! | `insert_document` / `insert_documents` | `insert_one` / `insert_many` |
//! | `select_many` / `select_one` | `find` / `find_one` with the read projection |
//! | `select_if_property_exists` | `find` on `{field: {$exists: true}}` |
//! | `select_many_ordered` | `find` sorted by `<prefix>.<field>` |
//! | `select_or` | `find` on `{$or: [filter, {field: {$exists: true}}]}` |
//! | `select_by_object_id` | `find` on `{_id: <oid>}` |
//! | `edit_registry` / `edit_many_registries` | `update_one` / `update_many` with `$set` |
//! | `edit_many_increment` | `update_many` with `$inc` |
//! | `delete_registry` | `delete_one` on `{$or: [{_id}, key_value]}` |
//! | `create_index_ttl` | `create_ttl_index` |

use super::options::{parse_object_id, Increment, Projection, SortOrder};
use crate::error::{RepositoryError, Result};
use crate::storage::{DocumentStore, MongoStore, QueryOptions, MAX_TTL_SECS};
use mongodb::bson::{doc, oid::ObjectId, Document};
use mongodb::Database;
use std::time::Duration;
use tracing::debug;

/// Prefix ordered selects sort under (`requests.<field>`).
pub const DEFAULT_SORT_PREFIX: &str = "requests";

/// Repository bound to a single collection.
///
/// # Example
///
/// ```
/// use docrepo::repository::CollectionRepository;
/// use docrepo::storage::MemoryStore;
/// use mongodb::bson::doc;
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let repo = CollectionRepository::with_store(Arc::new(MemoryStore::new("collection")));
///
/// repo.insert_document(doc! { "name": "test", "address": "any" }).await.unwrap();
/// let found = repo.select_one(doc! { "name": "test" }).await.unwrap();
/// assert_eq!(found, Some(doc! { "name": "test" }));
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct CollectionRepository<S = MongoStore> {
    store: S,
    projection: Projection,
    sort_prefix: String,
}

impl CollectionRepository<MongoStore> {
    /// Binds `collection` in a connected database.
    pub fn new(database: &Database, collection: &str) -> Self {
        Self::with_store(MongoStore::new(database, collection))
    }
}

impl<S: DocumentStore> CollectionRepository<S> {
    /// Wraps any store. Reads hide `_id` and `address`; ordered selects sort
    /// under `requests.`.
    pub fn with_store(store: S) -> Self {
        Self {
            store,
            projection: Projection::default(),
            sort_prefix: DEFAULT_SORT_PREFIX.to_string(),
        }
    }

    /// Replaces the read projection used by `select_many`, `select_one` and
    /// `select_many_ordered`.
    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    /// Replaces the sort prefix. An empty prefix sorts on the field itself.
    pub fn with_sort_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.sort_prefix = prefix.into();
        self
    }

    pub fn collection_name(&self) -> &str {
        self.store.name()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    fn read_options(&self) -> QueryOptions {
        QueryOptions::projected(self.projection.to_document())
    }

    fn without_id() -> QueryOptions {
        QueryOptions::projected(doc! { "_id": 0 })
    }

    fn exists_filter(field: &str) -> Document {
        let mut filter = Document::new();
        filter.insert(field, doc! { "$exists": true });
        filter
    }

    // ========================================================================
    // INSERTS
    // ========================================================================

    /// Inserts a document and returns it with its `_id` filled in.
    pub async fn insert_document(&self, mut document: Document) -> Result<Document> {
        ensure_object_id(&mut document);
        self.store.insert_one(&document).await?;
        debug!(collection = %self.collection_name(), "insert_document");
        Ok(document)
    }

    /// Inserts documents as one ordered batch.
    ///
    /// Not atomic: on a `Write` error, the documents before the failing one
    /// stay inserted.
    pub async fn insert_documents(&self, mut documents: Vec<Document>) -> Result<Vec<Document>> {
        if documents.is_empty() {
            return Ok(documents);
        }
        documents.iter_mut().for_each(ensure_object_id);
        self.store.insert_many(&documents).await?;
        debug!(
            collection = %self.collection_name(),
            inserted = documents.len(),
            "insert_documents"
        );
        Ok(documents)
    }

    // ========================================================================
    // SELECTS
    // ========================================================================

    /// All documents matching `filter`, without `_id` and projected fields.
    pub async fn select_many(&self, filter: Document) -> Result<Vec<Document>> {
        let documents = self.store.find(filter, self.read_options()).await?;
        debug!(collection = %self.collection_name(), returned = documents.len(), "select_many");
        Ok(documents)
    }

    /// First document matching `filter`, with the same exclusions.
    pub async fn select_one(&self, filter: Document) -> Result<Option<Document>> {
        let document = self.store.find_one(filter, self.read_options()).await?;
        debug!(
            collection = %self.collection_name(),
            found = document.is_some(),
            "select_one"
        );
        Ok(document)
    }

    /// Documents where `field` is present. Only `_id` is hidden.
    pub async fn select_if_property_exists(&self, field: &str) -> Result<Vec<Document>> {
        let documents = self
            .store
            .find(Self::exists_filter(field), Self::without_id())
            .await?;
        debug!(
            collection = %self.collection_name(),
            field,
            returned = documents.len(),
            "select_if_property_exists"
        );
        Ok(documents)
    }

    /// Documents matching `filter`, sorted by `<prefix>.<field>`.
    pub async fn select_many_ordered(
        &self,
        field: &str,
        filter: Document,
        order: SortOrder,
    ) -> Result<Vec<Document>> {
        let sort_key = if self.sort_prefix.is_empty() {
            field.to_string()
        } else {
            format!("{}.{}", self.sort_prefix, field)
        };
        let mut sort = Document::new();
        sort.insert(sort_key.as_str(), order.as_i32());

        let documents = self
            .store
            .find(filter, self.read_options().sorted(sort))
            .await?;
        debug!(
            collection = %self.collection_name(),
            sort = %sort_key,
            returned = documents.len(),
            "select_many_ordered"
        );
        Ok(documents)
    }

    /// Documents matching `filter` OR having `field`. Only `_id` is hidden.
    pub async fn select_or(&self, filter: Document, field: &str) -> Result<Vec<Document>> {
        let filter = doc! { "$or": [filter, Self::exists_filter(field)] };
        let documents = self.store.find(filter, Self::without_id()).await?;
        debug!(collection = %self.collection_name(), returned = documents.len(), "select_or");
        Ok(documents)
    }

    /// Documents whose `_id` is the given ObjectId, unprojected.
    pub async fn select_by_object_id(&self, id: &str) -> Result<Vec<Document>> {
        let oid = parse_object_id(id)?;
        let documents = self
            .store
            .find(doc! { "_id": oid }, QueryOptions::default())
            .await?;
        debug!(collection = %self.collection_name(), %oid, returned = documents.len(), "select_by_object_id");
        Ok(documents)
    }

    // ========================================================================
    // UPDATES
    // ========================================================================

    /// Sets `values` on the document with the given id.
    ///
    /// # Returns
    ///
    /// The number of documents modified (0 or 1).
    pub async fn edit_registry(&self, id: &str, values: Document) -> Result<u64> {
        let oid = parse_object_id(id)?;
        let outcome = self
            .store
            .update_one(doc! { "_id": oid }, doc! { "$set": values })
            .await?;
        debug!(
            collection = %self.collection_name(),
            %oid,
            matched = outcome.matched,
            modified = outcome.modified,
            "edit_registry"
        );
        Ok(outcome.modified)
    }

    /// Sets `values` on every document matching `filter`.
    pub async fn edit_many_registries(&self, filter: Document, values: Document) -> Result<u64> {
        let outcome = self
            .store
            .update_many(filter, doc! { "$set": values })
            .await?;
        debug!(
            collection = %self.collection_name(),
            matched = outcome.matched,
            modified = outcome.modified,
            "edit_many_registries"
        );
        Ok(outcome.modified)
    }

    /// Adds each delta of `increment` on every document matching `filter`.
    pub async fn edit_many_increment(&self, filter: Document, increment: &Increment) -> Result<u64> {
        if increment.is_empty() {
            return Err(RepositoryError::Write(
                "increment needs at least one field".to_string(),
            ));
        }
        let outcome = self.store.update_many(filter, increment.to_update()).await?;
        debug!(
            collection = %self.collection_name(),
            matched = outcome.matched,
            modified = outcome.modified,
            "edit_many_increment"
        );
        Ok(outcome.modified)
    }

    // ========================================================================
    // DELETE AND INDEXES
    // ========================================================================

    /// Deletes the first document matching `id` OR `key_value`.
    ///
    /// With no id and an empty `key_value` nothing is deleted.
    pub async fn delete_registry(&self, key_value: Document, id: Option<&str>) -> Result<u64> {
        let mut branches = Vec::with_capacity(2);
        if let Some(id) = id {
            branches.push(doc! { "_id": parse_object_id(id)? });
        }
        if !key_value.is_empty() {
            branches.push(key_value);
        }

        let filter = match branches.len() {
            0 => return Ok(0),
            1 => branches.remove(0),
            _ => doc! { "$or": branches },
        };

        let deleted = self.store.delete_one(filter).await?;
        debug!(collection = %self.collection_name(), deleted, "delete_registry");
        Ok(deleted)
    }

    /// Creates a background TTL index on `field`. Documents expire `ttl`
    /// (whole seconds) after the date stored in that field.
    ///
    /// TTLs above `i32::MAX` seconds are rejected with `Index`.
    pub async fn create_index_ttl(&self, field: &str, ttl: Duration) -> Result<()> {
        if ttl.as_secs() > MAX_TTL_SECS {
            return Err(RepositoryError::Index(format!(
                "TTL for '{}' must be at most {} seconds, got {}",
                field,
                MAX_TTL_SECS,
                ttl.as_secs()
            )));
        }
        let ttl = Duration::from_secs(ttl.as_secs());
        self.store.create_ttl_index(field, ttl).await?;
        debug!(
            collection = %self.collection_name(),
            field,
            ttl_secs = ttl.as_secs(),
            "create_index_ttl"
        );
        Ok(())
    }
}

/// Gives a document a fresh ObjectId `_id` (as its first field) if it has none.
fn ensure_object_id(document: &mut Document) {
    if document.contains_key("_id") {
        return;
    }
    let mut with_id = Document::new();
    with_id.insert("_id", ObjectId::new());
    for (key, value) in std::mem::take(document) {
        with_id.insert(key, value);
    }
    *document = with_id;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ExpiryConfig, ExpirySweeper, MemoryStore};
    use mongodb::bson::{Bson, DateTime};
    use std::sync::Arc;

    type MemoryRepository = CollectionRepository<Arc<MemoryStore>>;

    fn create_repo() -> MemoryRepository {
        CollectionRepository::with_store(Arc::new(MemoryStore::new("collection")))
    }

    fn order() -> Document {
        doc! {
            "name": "test",
            "address": "any",
            "requests": { "pizza": 2, "hamburguer": 5, "refri": 3 },
        }
    }

    fn id_of(document: &Document) -> String {
        document.get_object_id("_id").unwrap().to_hex()
    }

    #[tokio::test]
    async fn test_insert_returns_document_with_id() {
        let repo = create_repo();

        let inserted = repo.insert_document(order()).await.unwrap();
        assert!(matches!(inserted.get("_id"), Some(Bson::ObjectId(_))));
        assert_eq!(inserted.get_str("name").unwrap(), "test");

        let found = repo.select_by_object_id(&id_of(&inserted)).await.unwrap();
        assert_eq!(found, vec![inserted]);
    }

    #[tokio::test]
    async fn test_insert_keeps_caller_id() {
        let repo = create_repo();

        let inserted = repo.insert_document(doc! { "_id": "custom", "a": 1 }).await.unwrap();
        assert_eq!(inserted, doc! { "_id": "custom", "a": 1 });

        let err = repo.insert_document(doc! { "_id": "custom" }).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Write(_)));
    }

    #[tokio::test]
    async fn test_round_trip_excludes_id_and_address() {
        let repo = create_repo();
        repo.insert_document(order()).await.unwrap();

        let found = repo.select_one(doc! { "name": "test" }).await.unwrap().unwrap();
        assert_eq!(
            found,
            doc! { "name": "test", "requests": { "pizza": 2, "hamburguer": 5, "refri": 3 } }
        );
        assert!(repo.select_one(doc! { "name": "nobody" }).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_select_many_is_idempotent() {
        let repo = create_repo();
        repo.insert_documents(vec![order(), doc! { "name": "other", "address": "x" }])
            .await
            .unwrap();

        let first = repo.select_many(doc! {}).await.unwrap();
        let second = repo.select_many(doc! {}).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
        assert!(first.iter().all(|d| !d.contains_key("_id") && !d.contains_key("address")));
    }

    #[tokio::test]
    async fn test_insert_many_documents_are_each_retrievable() {
        let repo = create_repo();
        let documents: Vec<Document> = (0..5).map(|i| doc! { "sku": format!("sku-{}", i), "qty": i }).collect();

        let inserted = repo.insert_documents(documents).await.unwrap();
        assert_eq!(inserted.len(), 5);
        assert!(inserted.iter().all(|d| d.contains_key("_id")));

        for i in 0..5 {
            let found = repo.select_many(doc! { "sku": format!("sku-{}", i) }).await.unwrap();
            assert_eq!(found, vec![doc! { "sku": format!("sku-{}", i), "qty": i }]);
        }
    }

    #[tokio::test]
    async fn test_insert_documents_empty_is_noop() {
        let repo = create_repo();
        assert!(repo.insert_documents(Vec::new()).await.unwrap().is_empty());
        assert!(repo.store().is_empty());
    }

    #[tokio::test]
    async fn test_select_if_property_exists_keeps_address() {
        let repo = create_repo();
        repo.insert_document(order()).await.unwrap();
        repo.insert_document(doc! { "name": "plain" }).await.unwrap();

        let found = repo.select_if_property_exists("requests").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].get_str("address").unwrap(), "any");
        assert!(!found[0].contains_key("_id"));

        let all = repo.select_if_property_exists("_id").await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_select_many_ordered() {
        let repo = create_repo();
        for (name, pizza) in [("a", 2), ("b", 7), ("c", 4)] {
            repo.insert_document(doc! { "name": name, "kind": "order", "requests": { "pizza": pizza } })
                .await
                .unwrap();
        }
        repo.insert_document(doc! { "name": "z", "kind": "other" }).await.unwrap();

        let names = |docs: Vec<Document>| -> Vec<String> {
            docs.iter().map(|d| d.get_str("name").unwrap().to_string()).collect()
        };

        let desc = repo
            .select_many_ordered("pizza", doc! { "kind": "order" }, SortOrder::Descending)
            .await
            .unwrap();
        assert_eq!(names(desc), vec!["b", "c", "a"]);

        let asc = repo
            .select_many_ordered("pizza", doc! { "kind": "order" }, SortOrder::Ascending)
            .await
            .unwrap();
        assert_eq!(names(asc), vec!["a", "c", "b"]);
    }

    #[tokio::test]
    async fn test_select_many_ordered_without_prefix() {
        let repo = create_repo().with_sort_prefix("");
        for n in [3, 1, 2] {
            repo.insert_document(doc! { "n": n }).await.unwrap();
        }

        let found = repo
            .select_many_ordered("n", doc! {}, SortOrder::Ascending)
            .await
            .unwrap();
        assert_eq!(found, vec![doc! { "n": 1 }, doc! { "n": 2 }, doc! { "n": 3 }]);
    }

    #[tokio::test]
    async fn test_select_or() {
        let repo = create_repo();
        repo.insert_document(doc! { "name": "test" }).await.unwrap();
        repo.insert_document(doc! { "name": "x", "ola": "mundo" }).await.unwrap();
        repo.insert_document(doc! { "name": "y" }).await.unwrap();

        let found = repo.select_or(doc! { "name": "test" }, "ola").await.unwrap();
        assert_eq!(found, vec![doc! { "name": "test" }, doc! { "name": "x", "ola": "mundo" }]);
    }

    #[tokio::test]
    async fn test_select_by_object_id() {
        let repo = create_repo();
        repo.insert_document(order()).await.unwrap();

        let missing = repo.select_by_object_id("64ac6f32b67c7e456e72a062").await.unwrap();
        assert!(missing.is_empty());

        let err = repo.select_by_object_id("64ac6f32").await.unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidIdentifier { .. }));
    }

    #[tokio::test]
    async fn test_custom_projection() {
        let repo = create_repo().with_projection(Projection::include(["name"]));
        repo.insert_document(order()).await.unwrap();

        let found = repo.select_many(doc! {}).await.unwrap();
        assert_eq!(found, vec![doc! { "name": "test" }]);

        let repo = create_repo().with_projection(Projection::all_fields());
        repo.insert_document(order()).await.unwrap();
        let found = repo.select_one(doc! {}).await.unwrap().unwrap();
        assert_eq!(found.get_str("address").unwrap(), "any");
    }

    #[tokio::test]
    async fn test_edit_registry() {
        let repo = create_repo();
        let inserted = repo.insert_document(order()).await.unwrap();
        let id = id_of(&inserted);

        assert_eq!(repo.edit_registry(&id, doc! { "Estou": "aqui" }).await.unwrap(), 1);
        // Same value again modifies nothing
        assert_eq!(repo.edit_registry(&id, doc! { "Estou": "aqui" }).await.unwrap(), 0);
        assert_eq!(
            repo.edit_registry("64ac6f32b67c7e456e72a062", doc! { "a": 1 }).await.unwrap(),
            0
        );

        let found = repo.select_by_object_id(&id).await.unwrap();
        assert_eq!(found[0].get_str("Estou").unwrap(), "aqui");

        let err = repo.edit_registry("bad", doc! { "a": 1 }).await.unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidIdentifier { .. }));
    }

    #[tokio::test]
    async fn test_edit_many_registries_counts_never_exceed_total() {
        let repo = create_repo();
        repo.insert_documents(vec![
            doc! { "Numeros": [1, 2] },
            doc! { "Numeros": [1, 5] },
            doc! { "Numeros": [3] },
        ])
        .await
        .unwrap();

        let modified = repo
            .edit_many_registries(doc! { "Numeros": 1 }, doc! { "Numeros.0": 0 })
            .await
            .unwrap();
        assert_eq!(modified, 2);

        let modified = repo
            .edit_many_registries(doc! {}, doc! { "flag": true })
            .await
            .unwrap();
        assert_eq!(modified, 3);

        let zeros = repo.select_many(doc! { "Numeros.0": 0 }).await.unwrap();
        assert_eq!(zeros.len(), 2);
    }

    #[tokio::test]
    async fn test_edit_many_increment() {
        let repo = create_repo();
        let inserted = repo.insert_document(order()).await.unwrap();
        repo.insert_document(doc! { "name": "test", "requests": { "pizza": 1 } }).await.unwrap();

        let by_id = doc! { "_id": inserted.get_object_id("_id").unwrap() };
        let modified = repo
            .edit_many_increment(by_id, &Increment::new().field("requests.pizza", 4))
            .await
            .unwrap();
        assert_eq!(modified, 1);

        let modified = repo
            .edit_many_increment(
                doc! { "name": "test" },
                &Increment::new().field("requests.pizza", -1).field("visits", 1),
            )
            .await
            .unwrap();
        assert_eq!(modified, 2);

        let ordered = repo
            .select_many_ordered("pizza", doc! {}, SortOrder::Descending)
            .await
            .unwrap();
        let pizzas: Vec<i64> = ordered
            .iter()
            .map(|d| match d.get_document("requests").unwrap().get("pizza") {
                Some(Bson::Int32(n)) => *n as i64,
                Some(Bson::Int64(n)) => *n,
                other => panic!("unexpected pizza count {:?}", other),
            })
            .collect();
        assert_eq!(pizzas, vec![5, 0]);
    }

    #[tokio::test]
    async fn test_empty_increment_is_rejected() {
        let repo = create_repo();
        repo.insert_document(order()).await.unwrap();

        let err = repo
            .edit_many_increment(doc! {}, &Increment::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Write(_)));
    }

    #[tokio::test]
    async fn test_delete_registry() {
        let repo = create_repo();
        let first = repo.insert_document(doc! { "Estou": "aqui" }).await.unwrap();
        repo.insert_document(doc! { "Estou": "aqui" }).await.unwrap();
        repo.insert_document(doc! { "other": 1 }).await.unwrap();

        // By key-value only
        assert_eq!(repo.delete_registry(doc! { "Estou": "aqui" }, None).await.unwrap(), 1);

        // By id OR key-value: the id no longer exists, the pair still matches once
        let gone = id_of(&first);
        assert_eq!(
            repo.delete_registry(doc! { "Estou": "aqui" }, Some(&gone)).await.unwrap(),
            1
        );

        // Nothing matches either branch
        assert_eq!(
            repo.delete_registry(doc! { "Estou": "aqui" }, Some("64ac6f32b67c7e456e72a062"))
                .await
                .unwrap(),
            0
        );
        // Nothing to match on at all
        assert_eq!(repo.delete_registry(doc! {}, None).await.unwrap(), 0);
        assert_eq!(repo.store().len(), 1);

        let err = repo.delete_registry(doc! {}, Some("xyz")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidIdentifier { .. }));
    }

    #[tokio::test]
    async fn test_create_index_ttl_truncates_and_conflicts() {
        let repo = create_repo();

        repo.create_index_ttl("creation_date", Duration::from_millis(15_900))
            .await
            .unwrap();
        // 15.9s was stored as 15s, so 15s is the same definition
        repo.create_index_ttl("creation_date", Duration::from_secs(15))
            .await
            .unwrap();

        let err = repo
            .create_index_ttl("creation_date", Duration::from_secs(20))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Index(_)));
    }

    #[tokio::test]
    async fn test_create_index_ttl_out_of_range() {
        let repo = create_repo();

        let err = repo
            .create_index_ttl("creation_date", Duration::from_secs(u64::MAX))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Index(_)));
        assert!(!repo.store().has_ttl_indexes());

        repo.create_index_ttl("creation_date", Duration::from_secs(i32::MAX as u64))
            .await
            .unwrap();
        repo.insert_document(doc! { "name": "Alan", "creation_date": DateTime::now() })
            .await
            .unwrap();
        assert_eq!(repo.select_many(doc! {}).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ttl_index_expires_old_documents() {
        let store = Arc::new(MemoryStore::new("collection"));
        let repo = CollectionRepository::with_store(Arc::clone(&store));
        let config = ExpiryConfig {
            base_interval: Duration::from_millis(10),
            min_interval: Duration::from_millis(5),
            max_interval: Duration::from_millis(20),
            ..Default::default()
        };
        let _sweeper = ExpirySweeper::start(Arc::clone(&store), config);

        repo.create_index_ttl("creation_date", Duration::from_secs(15))
            .await
            .unwrap();
        let old = DateTime::from_millis(DateTime::now().timestamp_millis() - 20_000);
        repo.insert_document(doc! { "name": "Old", "creation_date": old }).await.unwrap();
        repo.insert_document(doc! { "name": "Alan", "age": 26, "creation_date": DateTime::now() })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;

        let names: Vec<String> = repo
            .select_many(doc! {})
            .await
            .unwrap()
            .iter()
            .map(|d| d.get_str("name").unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["Alan"]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_ensure_object_id_puts_id_first() {
        let mut document = doc! { "a": 1, "b": 2 };
        ensure_object_id(&mut document);
        let keys: Vec<&str> = document.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["_id", "a", "b"]);

        let mut document = doc! { "a": 1, "_id": 5 };
        ensure_object_id(&mut document);
        assert_eq!(document, doc! { "a": 1, "_id": 5 });
    }
}
