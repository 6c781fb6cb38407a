//! Document store handle: owns a backend and hands out repositories bound to it.
//!
//! ```ignore
//! use docrepo::store::DocumentStore;
//!
//! let store = DocumentStore::new(backend);
//! let products = store.repository::<Product>();
//! let archive = store.repository_with::<Product, _>(RepositoryOptions::new().with_collection("archive"));
//! ```

use tracing::info;

use crate::{
    backend::StoreBackend,
    entity::Entity,
    error::StoreResult,
    policy::{DefaultPolicy, RepositoryPolicy},
    repository::Repository,
};

/// A document store bound to a specific backend implementation.
///
/// Repositories created from the store share its backend; cloning the store clones the
/// backend handle, not the stored data.
#[derive(Debug, Clone)]
pub struct DocumentStore<B: StoreBackend> {
    backend: B,
}

impl<B: StoreBackend + Clone> DocumentStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Creates a repository for `E` with the default policy.
    ///
    /// The collection name is determined by [`Entity::collection_name`].
    pub fn repository<E: Entity>(&self) -> Repository<E, B, DefaultPolicy> {
        Repository::new(self.backend.clone(), DefaultPolicy)
    }

    /// Creates a repository for `E` governed by `policy`.
    pub fn repository_with<E: Entity, P: RepositoryPolicy>(&self, policy: P) -> Repository<E, B, P> {
        Repository::new(self.backend.clone(), policy)
    }

    /// Creates a new, empty collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection already exists or creation fails.
    pub async fn create_collection(&self, name: &str) -> StoreResult<()> {
        self.backend
            .create_collection(name)
            .await
    }

    /// Drops a collection and every document in it.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection does not exist or deletion fails.
    pub async fn drop_collection(&self, name: &str) -> StoreResult<()> {
        self.backend.drop_collection(name).await
    }

    pub async fn list_collections(&self) -> StoreResult<Vec<String>> {
        self.backend.list_collections().await
    }

    /// Shuts down the store and releases backend resources.
    ///
    /// Shared backends release their resources once the last repository holding them is
    /// dropped.
    pub async fn shutdown(self) -> StoreResult<()> {
        self.backend.shutdown().await?;

        info!("document store shut down");

        Ok(())
    }
}
