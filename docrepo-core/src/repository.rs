//! Versioned repository engine.
//!
//! A [`Repository`] persists one entity type into one collection and turns the store's
//! single-document replace into a compare-and-swap: every update carries the version the
//! caller last observed, is written as `observed + 1`, and only lands if the stored
//! version is still below the new one.
//!
//! # Revision lifecycle
//!
//! ```text
//! Absent --insert--> v0 --update--> v1 --update--> v2 ... --delete--> Absent
//! ```
//!
//! An update derived from a superseded revision fails with
//! [`RepositoryError::VersionConflict`]; the caller re-reads with [`Repository::get`] and
//! retries. Nothing is retried internally.
//!
//! # Example
//!
//! ```ignore
//! let products = store.repository::<Product>();
//!
//! let inserted = products.insert(Product::named("lamp")).await?;
//! let mut current = products.get(inserted.id()).await?.unwrap();
//! current.name = "desk lamp".into();
//!
//! match products.update(current).await {
//!     Ok(updated) => assert_eq!(updated.version(), 1),
//!     Err(err) if err.kind() == ErrorKind::VersionConflict => { /* re-read and retry */ }
//!     Err(err) => return Err(err.into()),
//! }
//! ```

use bson::Document;
use futures::future::{Either, select};
use std::{fmt, future::Future, marker::PhantomData, pin::pin, time::Duration};
use tracing::{debug, warn};

use crate::{
    backend::{StoreBackend, VersionGuard},
    cancel::CancelSignal,
    entity::Entity,
    error::{RepositoryError, RepositoryResult, StoreError, StoreResult},
    mapping::{self, EntityMapper},
    page::{Page, PaginationParams},
    policy::{DefaultPolicy, RepositoryPolicy},
    query::{Query, SortDirection},
};

/// Generic versioned repository over entity type `E`, stored through backend `B`.
pub struct Repository<E: Entity, B: StoreBackend, P: RepositoryPolicy = DefaultPolicy> {
    backend: B,
    collection: String,
    policy: P,
    timeout: Option<Duration>,
    cancel: Option<CancelSignal>,
    _marker: PhantomData<fn() -> E>,
}

impl<E, B, P> Repository<E, B, P>
where
    E: Entity,
    B: StoreBackend,
    P: RepositoryPolicy,
{
    /// Creates a repository for `E` on `backend`.
    ///
    /// The process-wide mapping conventions are installed on first construction.
    pub fn new(backend: B, policy: P) -> Self {
        mapping::conventions();

        let collection = policy.collection_name::<E>();
        let timeout = policy.operation_timeout();

        debug!(collection = %collection, "created repository");

        Self {
            backend,
            collection,
            policy,
            timeout,
            cancel: None,
            _marker: PhantomData,
        }
    }

    /// Returns the name of the collection this repository writes to.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Returns a handle whose store calls fail with a timeout after `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Self
    where
        B: Clone,
    {
        Self { timeout: Some(timeout), ..self.clone() }
    }

    /// Returns a handle whose store calls are aborted once `signal` fires.
    pub fn with_cancel(&self, signal: CancelSignal) -> Self
    where
        B: Clone,
    {
        Self { cancel: Some(signal), ..self.clone() }
    }

    /// Inserts a new entity at version 0.
    ///
    /// Assigns an id from the policy if the entity has none and stamps both timestamps.
    ///
    /// # Errors
    ///
    /// - [`RepositoryError::Validation`] if the entity cannot be mapped to a document
    /// - [`RepositoryError::DuplicateKey`] if the id is already present in the collection
    /// - [`RepositoryError::Store`] if the store fails
    pub async fn insert(&self, mut entity: E) -> RepositoryResult<E, E> {
        if !entity.header().has_id() {
            entity.header_mut().assign_id(self.policy.generate_id());
        }
        entity.header_mut().stamp_created(mapping::now());

        let document = match EntityMapper::to_document(&entity) {
            Ok(document) => document,
            Err(err) => return Err(RepositoryError::validation(entity, err.to_string())),
        };

        match self
            .call("insert", self.backend.insert_document(document, &self.collection))
            .await
        {
            Ok(()) => {
                debug!(collection = %self.collection, id = entity.id(), "inserted entity");

                Ok(entity)
            }
            Err(StoreError::DuplicateKey(id, _)) => {
                warn!(collection = %self.collection, id = %id, "insert rejected, duplicate id");

                Err(RepositoryError::duplicate_key(
                    entity,
                    format!("insert failed because entity {id} already exists"),
                ))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Writes `entity` as the next revision after the version it carries.
    ///
    /// The replace only lands if the stored document still has a version below the new one.
    /// When it does not land, the stored document is probed by id to tell a stale version
    /// from a missing document. On failure the entity is handed back with the version and
    /// update timestamp it was submitted with.
    ///
    /// # Errors
    ///
    /// - [`RepositoryError::Validation`] if the entity has no id or cannot be mapped
    /// - [`RepositoryError::VersionConflict`] if a newer revision is stored
    /// - [`RepositoryError::NotFound`] if no document with the id exists
    /// - [`RepositoryError::Store`] if the store fails or does not acknowledge the write
    pub async fn update(&self, mut entity: E) -> RepositoryResult<E, E> {
        if !entity.header().has_id() {
            return Err(RepositoryError::validation(entity, "cannot update an entity without an id"));
        }

        let observed_version = entity.version();
        let observed_updated_at = entity.header().updated_at();
        let Some(next_version) = observed_version.checked_add(1) else {
            return Err(RepositoryError::validation(entity, "version counter exhausted"));
        };

        entity
            .header_mut()
            .stamp_updated(mapping::now(), next_version);

        let document = match EntityMapper::to_document(&entity) {
            Ok(document) => document,
            Err(err) => {
                entity
                    .header_mut()
                    .restore(observed_updated_at, observed_version);

                return Err(RepositoryError::validation(entity, err.to_string()));
            }
        };

        let guard = if self.policy.ignore_version_check() {
            VersionGuard::Unchecked
        } else {
            VersionGuard::Below(next_version)
        };
        let id = entity.id().to_string();

        let outcome = self
            .call(
                "update",
                self.backend
                    .replace_document(document, &id, guard, &self.collection),
            )
            .await?;

        if !outcome.acknowledged {
            return Err(StoreError::Unacknowledged(self.collection.clone()).into());
        }

        // An identical rewrite matches without modifying; it still landed.
        if outcome.matched_count > 0 {
            debug!(collection = %self.collection, id = %id, version = next_version, "updated entity");

            return Ok(entity);
        }

        entity
            .header_mut()
            .restore(observed_updated_at, observed_version);

        if guard == VersionGuard::Unchecked {
            return Err(RepositoryError::not_found(entity, format!("entity {id} does not exist")));
        }

        match self
            .call("update", self.backend.find_document(&id, &self.collection))
            .await?
        {
            Some(current) => {
                let stored = mapping::stored_version(&current)?;

                warn!(
                    collection = %self.collection,
                    id = %id,
                    observed = observed_version,
                    stored,
                    "update rejected, version conflict"
                );

                Err(RepositoryError::version_conflict(
                    entity,
                    format!(
                        "update failed because entity {id} is at version {stored}, \
                         submitted changes were based on version {observed_version}"
                    ),
                ))
            }
            None => Err(RepositoryError::not_found(entity, format!("entity {id} does not exist"))),
        }
    }

    /// Returns the stored revision of the entity with `id`, or `None` if absent.
    ///
    /// An empty id is never present and does not reach the store.
    pub async fn get(&self, id: &str) -> RepositoryResult<Option<E>, E> {
        if id.is_empty() {
            return Ok(None);
        }

        Ok(self
            .call("get", self.backend.find_document(id, &self.collection))
            .await?
            .map(EntityMapper::from_document::<E>)
            .transpose()?)
    }

    /// Removes the entity with `id` regardless of its version and returns what was stored.
    ///
    /// Deleting an absent or empty id returns `None`.
    pub async fn delete(&self, id: &str) -> RepositoryResult<Option<E>, E> {
        if id.is_empty() {
            return Ok(None);
        }

        let deleted = self
            .call("delete", self.backend.find_and_delete_document(id, &self.collection))
            .await?;

        debug!(collection = %self.collection, id, found = deleted.is_some(), "deleted entity");

        Ok(deleted
            .map(EntityMapper::from_document::<E>)
            .transpose()?)
    }

    /// Returns every entity in the collection.
    pub async fn get_all(&self) -> RepositoryResult<Vec<E>, E> {
        let documents = self
            .call("get_all", self.backend.query_documents(Query::new(), &self.collection))
            .await?;

        Ok(Self::decode(documents)?)
    }

    /// Returns up to `top` entities after skipping `skip`, ordered by the stored field
    /// `order_by` (`"id"` orders by primary key). Ties are broken by id.
    pub async fn paginate(
        &self,
        top: usize,
        skip: usize,
        order_by: &str,
        ascending: bool,
    ) -> RepositoryResult<Vec<E>, E> {
        if top == 0 {
            return Ok(Vec::new());
        }

        let query = Query::builder()
            .sort(order_by, SortDirection::from_ascending(ascending))
            .offset(skip)
            .limit(top)
            .build();

        let documents = self
            .call("paginate", self.backend.query_documents(query, &self.collection))
            .await?;

        Ok(Self::decode(documents)?)
    }

    /// Returns one page of the collection with its total count and navigation metadata.
    pub async fn page(
        &self,
        params: PaginationParams,
        order_by: &str,
        direction: SortDirection,
    ) -> RepositoryResult<Page<E>, E> {
        let count = self.count().await?;
        let items = self
            .paginate(
                params.top(),
                params.skip(),
                order_by,
                direction == SortDirection::Asc,
            )
            .await?;

        Ok(params.page_of(items, count))
    }

    /// Counts the entities in the collection.
    pub async fn count(&self) -> RepositoryResult<u64, E> {
        Ok(self
            .call("count", self.backend.count_documents(&self.collection))
            .await?)
    }

    fn decode(documents: Vec<Document>) -> StoreResult<Vec<E>> {
        documents
            .into_iter()
            .map(EntityMapper::from_document::<E>)
            .collect()
    }

    /// Runs a store call under this handle's timeout and cancellation signal.
    async fn call<R, F>(&self, operation: &'static str, call: F) -> StoreResult<R>
    where
        F: Future<Output = StoreResult<R>>,
    {
        if let Some(signal) = &self.cancel {
            if signal.is_cancelled() {
                return Err(StoreError::Cancelled(format!("{operation} on {}", self.collection)));
            }
        }

        let bounded = pin!(async {
            match self.timeout {
                Some(limit) => match tokio::time::timeout(limit, call).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(collection = %self.collection, operation, ?limit, "store call timed out");

                        Err(StoreError::Timeout(format!("{operation} on {}", self.collection)))
                    }
                },
                None => call.await,
            }
        });

        match &self.cancel {
            Some(signal) => match select(bounded, signal.fired()).await {
                Either::Left((result, _)) => result,
                Either::Right(((), _)) => {
                    warn!(collection = %self.collection, operation, "store call cancelled");

                    Err(StoreError::Cancelled(format!("{operation} on {}", self.collection)))
                }
            },
            None => bounded.await,
        }
    }
}

impl<E, B, P> Clone for Repository<E, B, P>
where
    E: Entity,
    B: StoreBackend + Clone,
    P: RepositoryPolicy,
{
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            collection: self.collection.clone(),
            policy: self.policy.clone(),
            timeout: self.timeout,
            cancel: self.cancel.clone(),
            _marker: PhantomData,
        }
    }
}

impl<E, B, P> fmt::Debug for Repository<E, B, P>
where
    E: Entity,
    B: StoreBackend,
    P: RepositoryPolicy,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("collection", &self.collection)
            .field("backend", &self.backend)
            .field("policy", &self.policy)
            .field("timeout", &self.timeout)
            .finish()
    }
}
