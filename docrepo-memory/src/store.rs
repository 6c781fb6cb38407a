//! In-memory storage implementation for document stores.
//!
//! Documents are kept per collection in a `BTreeMap` keyed by id, behind an async-aware
//! read-write lock. Every write holds the write lock for its whole read-check-write
//! sequence, which makes guarded replaces atomic.

use async_trait::async_trait;
use bson::{Bson, Document};
use mea::rwlock::RwLock;
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};
use tracing::debug;

use docrepo_core::{
    backend::{StoreBackend, StoreBackendBuilder, VersionGuard, WriteOutcome},
    error::{StoreError, StoreResult},
    mapping::{self, ID_FIELD},
    query::{Query, SortDirection},
};

use crate::ordering::Comparable;

type CollectionMap = BTreeMap<String, Document>;
type StoreMap = HashMap<String, CollectionMap>;

/// Thread-safe in-memory document storage backend.
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, so clones share
/// the same underlying data and can be handed to any number of repositories and tasks.
///
/// Listings scan the whole collection. Unsorted listings return documents in id order.
///
/// # Example
///
/// ```ignore
/// use docrepo_memory::InMemoryStore;
/// use docrepo::backend::StoreBackend;
/// use bson::doc;
///
/// let store = InMemoryStore::new();
/// store.insert_document(doc! { "_id": "a", "name": "Alice" }, "users").await?;
///
/// let found = store.find_document("a", "users").await?;
/// assert!(found.is_some());
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// collection name -> (document id -> document)
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self { store: Arc::new(RwLock::new(StoreMap::new())) }
    }

    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }
}

fn document_id(document: &Document) -> StoreResult<&str> {
    match document.get(ID_FIELD) {
        Some(Bson::String(id)) if !id.is_empty() => Ok(id),
        _ => Err(StoreError::InvalidDocument(format!("document has no string '{ID_FIELD}'"))),
    }
}

fn sort_documents(documents: &mut [Document], field: &str, direction: SortDirection) {
    documents.sort_by(|a, b| {
        let left = Comparable::from(a.get(field));
        let right = Comparable::from(b.get(field));

        // Stable sort: ties keep the id order the collection map iterates in.
        match direction {
            SortDirection::Asc => left.cmp(&right),
            SortDirection::Desc => right.cmp(&left),
        }
    });
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn insert_document(&self, document: Document, collection: &str) -> StoreResult<()> {
        let key = document_id(&document)?.to_string();

        let mut store = self.store.write().await;
        let collection_map = store
            .entry(collection.to_string())
            .or_default();

        if collection_map.contains_key(&key) {
            return Err(StoreError::DuplicateKey(key, collection.to_string()));
        }

        collection_map.insert(key, document);

        Ok(())
    }

    async fn replace_document(
        &self,
        document: Document,
        id: &str,
        guard: VersionGuard,
        collection: &str,
    ) -> StoreResult<WriteOutcome> {
        let mut store = self.store.write().await;
        let Some(stored) = store
            .get_mut(collection)
            .and_then(|collection_map| collection_map.get_mut(id))
        else {
            return Ok(WriteOutcome::acknowledged(0, Some(0)));
        };

        if !guard.admits(mapping::stored_version(stored)?) {
            debug!(collection, id, ?guard, "guarded replace rejected");

            return Ok(WriteOutcome::acknowledged(0, Some(0)));
        }

        let modified = u64::from(*stored != document);
        *stored = document;

        Ok(WriteOutcome::acknowledged(1, Some(modified)))
    }

    async fn find_document(&self, id: &str, collection: &str) -> StoreResult<Option<Document>> {
        Ok(self
            .store
            .read()
            .await
            .get(collection)
            .and_then(|collection_map| collection_map.get(id))
            .cloned())
    }

    async fn find_and_delete_document(
        &self,
        id: &str,
        collection: &str,
    ) -> StoreResult<Option<Document>> {
        Ok(self
            .store
            .write()
            .await
            .get_mut(collection)
            .and_then(|collection_map| collection_map.remove(id)))
    }

    async fn query_documents(&self, query: Query, collection: &str) -> StoreResult<Vec<Document>> {
        let store = self.store.read().await;
        let collection_map = match store.get(collection) {
            Some(col) => col,
            None => return Ok(vec![]),
        };

        let mut documents = collection_map
            .values()
            .cloned()
            .collect::<Vec<_>>();

        if let Some(sort) = query.sort.as_ref().filter(|sort| !sort.is_primary_key()) {
            sort_documents(&mut documents, &sort.field, sort.direction);
        } else if let Some(sort) = &query.sort {
            if sort.direction == SortDirection::Desc {
                documents.reverse();
            }
        }

        Ok(documents
            .into_iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .collect())
    }

    async fn count_documents(&self, collection: &str) -> StoreResult<u64> {
        Ok(self
            .store
            .read()
            .await
            .get(collection)
            .map_or(0, |collection_map| collection_map.len() as u64))
    }

    async fn create_collection(&self, name: &str) -> StoreResult<()> {
        self.store
            .write()
            .await
            .entry(name.to_string())
            .or_default();

        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> StoreResult<()> {
        let mut store = self.store.write().await;

        if store.remove(name).is_none() {
            return Err(StoreError::CollectionNotFound(name.to_string()));
        }

        Ok(())
    }

    async fn list_collections(&self) -> StoreResult<Vec<String>> {
        let mut names = self
            .store
            .read()
            .await
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        names.sort();

        Ok(names)
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
///
/// ```ignore
/// use docrepo_memory::InMemoryStore;
/// use docrepo::backend::StoreBackendBuilder;
///
/// let store = InMemoryStore::builder().build().await?;
/// ```
#[derive(Default)]
pub struct InMemoryStoreBuilder;

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    async fn build(self) -> StoreResult<Self::Backend> {
        Ok(InMemoryStore::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn product(id: &str, name: &str, version: i64) -> Document {
        doc! { "_id": id, "name": name, "version": version }
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_ids() {
        let store = InMemoryStore::new();
        store.insert_document(product("a", "lamp", 0), "Products").await.unwrap();

        let err = store
            .insert_document(product("a", "desk", 0), "Products")
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::DuplicateKey(id, collection) if id == "a" && collection == "Products"));
    }

    #[tokio::test]
    async fn insert_requires_string_id() {
        let store = InMemoryStore::new();

        let err = store
            .insert_document(doc! { "name": "lamp" }, "Products")
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::InvalidDocument(_)));
    }

    #[tokio::test]
    async fn guarded_replace_matches_only_older_versions() {
        let store = InMemoryStore::new();
        store.insert_document(product("a", "lamp", 2), "Products").await.unwrap();

        let stale = store
            .replace_document(product("a", "stale", 2), "a", VersionGuard::Below(2), "Products")
            .await
            .unwrap();
        assert_eq!(stale.matched_count, 0);

        let fresh = store
            .replace_document(product("a", "fresh", 3), "a", VersionGuard::Below(3), "Products")
            .await
            .unwrap();
        assert_eq!(fresh, WriteOutcome::acknowledged(1, Some(1)));

        let stored = store.find_document("a", "Products").await.unwrap().unwrap();
        assert_eq!(stored.get_str("name").unwrap(), "fresh");
    }

    #[tokio::test]
    async fn replace_of_missing_document_matches_nothing() {
        let store = InMemoryStore::new();

        let outcome = store
            .replace_document(product("a", "lamp", 1), "a", VersionGuard::Unchecked, "Products")
            .await
            .unwrap();

        assert_eq!(outcome.matched_count, 0);
        assert!(outcome.acknowledged);
    }

    #[tokio::test]
    async fn find_and_delete_returns_removed_document() {
        let store = InMemoryStore::new();
        store.insert_document(product("a", "lamp", 0), "Products").await.unwrap();

        let removed = store.find_and_delete_document("a", "Products").await.unwrap();
        assert_eq!(removed.unwrap().get_str("name").unwrap(), "lamp");

        assert!(store.find_and_delete_document("a", "Products").await.unwrap().is_none());
        assert!(store.find_and_delete_document("a", "Missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sorted_listing_breaks_ties_by_id() {
        let store = InMemoryStore::new();
        for (id, name) in [("c", "b"), ("a", "b"), ("b", "a"), ("d", "c")] {
            store.insert_document(product(id, name, 0), "Products").await.unwrap();
        }

        let query = Query::builder()
            .sort("name", SortDirection::Desc)
            .offset(1)
            .limit(2)
            .build();
        let ids = store
            .query_documents(query, "Products")
            .await
            .unwrap()
            .iter()
            .map(|doc| doc.get_str("_id").unwrap().to_string())
            .collect::<Vec<_>>();

        assert_eq!(ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn id_sort_descending_reverses_key_order() {
        let store = InMemoryStore::new();
        for id in ["b", "a", "c"] {
            store.insert_document(product(id, "x", 0), "Products").await.unwrap();
        }

        let query = Query::builder().sort("id", SortDirection::Desc).build();
        let ids = store
            .query_documents(query, "Products")
            .await
            .unwrap()
            .iter()
            .map(|doc| doc.get_str("_id").unwrap().to_string())
            .collect::<Vec<_>>();

        assert_eq!(ids, vec!["c", "b", "a"]);
        assert_eq!(store.count_documents("Products").await.unwrap(), 3);
        assert_eq!(store.count_documents("Missing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn collections_can_be_created_listed_and_dropped() {
        let store = InMemoryStore::builder().build().await.unwrap();
        store.create_collection("Orders").await.unwrap();
        store.insert_document(product("a", "lamp", 0), "Products").await.unwrap();

        assert_eq!(store.list_collections().await.unwrap(), vec!["Orders", "Products"]);

        store.drop_collection("Orders").await.unwrap();
        assert!(matches!(
            store.drop_collection("Orders").await,
            Err(StoreError::CollectionNotFound(_))
        ));
    }
}
