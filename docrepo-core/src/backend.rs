//! Storage backend abstraction: the document-store client a repository talks to.
//!
//! A backend stores BSON documents keyed by their `_id` field inside named collections
//! and exposes exactly the primitives the repository engine needs:
//!
//! - unconditional single-document insert, reporting uniqueness violations as
//!   [`StoreError::DuplicateKey`](crate::error::StoreError::DuplicateKey)
//! - conditional single-document replace, reporting its outcome as a [`WriteOutcome`]
//! - lookup and delete-and-return by id
//! - full-collection listing with a single-field sort and skip/limit windowing
//!
//! # Atomicity
//!
//! Every single-document write must be atomic with respect to the [`VersionGuard`]
//! evaluated against it: of two concurrent replaces guarded by `Below(n)` against a
//! document stored at version `n - 1`, at most one may match.
//!
//! # Examples
//!
//! ```ignore
//! use docrepo::backend::{StoreBackend, VersionGuard};
//! use bson::doc;
//!
//! let backend = MyBackendImpl::new();
//! backend.insert_document(doc! { "_id": "a", "version": 0_i64 }, "Products").await?;
//!
//! let outcome = backend
//!     .replace_document(doc! { "_id": "a", "version": 1_i64 }, "a", VersionGuard::Below(1), "Products")
//!     .await?;
//! assert_eq!(outcome.matched_count, 1);
//! ```

use async_trait::async_trait;
use bson::Document;
use std::{fmt::Debug, sync::Arc};

use crate::{error::StoreResult, query::Query};

/// Predicate on the stored version evaluated atomically with a replace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionGuard {
    /// Replace whatever revision is stored under the id.
    Unchecked,
    /// Replace only if the stored version is strictly less than the given value.
    Below(u64),
}

impl VersionGuard {
    /// Evaluates the guard against a stored version.
    pub fn admits(&self, stored: u64) -> bool {
        match self {
            VersionGuard::Unchecked => true,
            VersionGuard::Below(limit) => stored < *limit,
        }
    }
}

/// Outcome of a replace as reported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Whether the store acknowledged the write. Counts are meaningless otherwise.
    pub acknowledged: bool,
    /// Number of documents matching the id and guard.
    pub matched_count: u64,
    /// Number of documents modified, if the store reports it.
    pub modified_count: Option<u64>,
}

impl WriteOutcome {
    pub fn acknowledged(matched_count: u64, modified_count: Option<u64>) -> Self {
        Self { acknowledged: true, matched_count, modified_count }
    }

    pub fn unacknowledged() -> Self {
        Self { acknowledged: false, matched_count: 0, modified_count: None }
    }
}

/// Abstract interface for document storage backends.
///
/// All implementations must be thread-safe and support concurrent access from multiple
/// async tasks. Documents handed to and returned from a backend always carry their id in
/// the `_id` field as a string.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Inserts a new document. Fails with `DuplicateKey` if its `_id` is already present.
    /// The collection is created on first insert if it doesn't exist.
    async fn insert_document(&self, document: Document, collection: &str) -> StoreResult<()>;

    /// Replaces the document stored under `id` if `guard` admits its stored version.
    ///
    /// A missing document or a rejected guard is not an error; both report zero matches.
    async fn replace_document(
        &self,
        document: Document,
        id: &str,
        guard: VersionGuard,
        collection: &str,
    ) -> StoreResult<WriteOutcome>;

    /// Retrieves the document stored under `id`.
    async fn find_document(&self, id: &str, collection: &str) -> StoreResult<Option<Document>>;

    /// Removes the document stored under `id` and returns it.
    async fn find_and_delete_document(
        &self,
        id: &str,
        collection: &str,
    ) -> StoreResult<Option<Document>>;

    /// Lists documents of a collection, ordered and windowed by `query`.
    ///
    /// Listing a collection that does not exist returns no documents.
    async fn query_documents(&self, query: Query, collection: &str) -> StoreResult<Vec<Document>>;

    /// Counts the documents of a collection.
    async fn count_documents(&self, collection: &str) -> StoreResult<u64>;

    /// Creates an empty collection.
    async fn create_collection(&self, name: &str) -> StoreResult<()>;

    /// Drops a collection and all its documents.
    async fn drop_collection(&self, name: &str) -> StoreResult<()>;

    /// Lists the names of all collections in the store.
    async fn list_collections(&self) -> StoreResult<Vec<String>>;

    /// Cleanly shuts down the backend, releasing all resources.
    async fn shutdown(self) -> StoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
impl<B> StoreBackend for &B
where
    B: StoreBackend + ?Sized,
{
    async fn insert_document(&self, document: Document, collection: &str) -> StoreResult<()> {
        (**self)
            .insert_document(document, collection)
            .await
    }

    async fn replace_document(
        &self,
        document: Document,
        id: &str,
        guard: VersionGuard,
        collection: &str,
    ) -> StoreResult<WriteOutcome> {
        (**self)
            .replace_document(document, id, guard, collection)
            .await
    }

    async fn find_document(&self, id: &str, collection: &str) -> StoreResult<Option<Document>> {
        (**self).find_document(id, collection).await
    }

    async fn find_and_delete_document(
        &self,
        id: &str,
        collection: &str,
    ) -> StoreResult<Option<Document>> {
        (**self)
            .find_and_delete_document(id, collection)
            .await
    }

    async fn query_documents(&self, query: Query, collection: &str) -> StoreResult<Vec<Document>> {
        (**self).query_documents(query, collection).await
    }

    async fn count_documents(&self, collection: &str) -> StoreResult<u64> {
        (**self).count_documents(collection).await
    }

    async fn create_collection(&self, name: &str) -> StoreResult<()> {
        (**self).create_collection(name).await
    }

    async fn drop_collection(&self, name: &str) -> StoreResult<()> {
        (**self).drop_collection(name).await
    }

    async fn list_collections(&self) -> StoreResult<Vec<String>> {
        (**self).list_collections().await
    }
}

#[async_trait]
impl<B> StoreBackend for Arc<B>
where
    B: StoreBackend + ?Sized,
{
    async fn insert_document(&self, document: Document, collection: &str) -> StoreResult<()> {
        (**self)
            .insert_document(document, collection)
            .await
    }

    async fn replace_document(
        &self,
        document: Document,
        id: &str,
        guard: VersionGuard,
        collection: &str,
    ) -> StoreResult<WriteOutcome> {
        (**self)
            .replace_document(document, id, guard, collection)
            .await
    }

    async fn find_document(&self, id: &str, collection: &str) -> StoreResult<Option<Document>> {
        (**self).find_document(id, collection).await
    }

    async fn find_and_delete_document(
        &self,
        id: &str,
        collection: &str,
    ) -> StoreResult<Option<Document>> {
        (**self)
            .find_and_delete_document(id, collection)
            .await
    }

    async fn query_documents(&self, query: Query, collection: &str) -> StoreResult<Vec<Document>> {
        (**self).query_documents(query, collection).await
    }

    async fn count_documents(&self, collection: &str) -> StoreResult<u64> {
        (**self).count_documents(collection).await
    }

    async fn create_collection(&self, name: &str) -> StoreResult<()> {
        (**self).create_collection(name).await
    }

    async fn drop_collection(&self, name: &str) -> StoreResult<()> {
        (**self).drop_collection(name).await
    }

    async fn list_collections(&self) -> StoreResult<Vec<String>> {
        (**self).list_collections().await
    }
}

/// A type-erased, shareable backend.
pub type SharedBackend = Arc<dyn StoreBackend>;

#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> StoreResult<Self::Backend>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_guard_admits_only_older_versions() {
        assert!(VersionGuard::Below(3).admits(2));
        assert!(!VersionGuard::Below(3).admits(3));
        assert!(!VersionGuard::Below(3).admits(4));
        assert!(VersionGuard::Unchecked.admits(u64::MAX));
    }
}
