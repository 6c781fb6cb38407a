use async_trait::async_trait;
use bson::{Document, doc};
use futures::TryStreamExt;
use mongodb::{
    Client, Collection as MongoCollection,
    error::{Error as MongoError, ErrorKind as MongoErrorKind, WriteFailure},
    options::{Acknowledgment, ClientOptions, FindOptions},
};
use tracing::{debug, info};

use docrepo_core::{
    backend::{StoreBackend, StoreBackendBuilder, VersionGuard, WriteOutcome},
    error::{StoreError, StoreResult},
    mapping::{self, ID_FIELD, VERSION_FIELD},
    query::{Query, SortDirection},
};

use crate::sanitizer::KeySanitizer;

const DUPLICATE_KEY_CODE: i32 = 11000;

fn backend_error(err: MongoError) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn is_duplicate_key(err: &MongoError) -> bool {
    matches!(
        err.kind.as_ref(),
        MongoErrorKind::Write(WriteFailure::WriteError(write_error)) if write_error.code == DUPLICATE_KEY_CODE
    )
}

fn sort_direction(direction: SortDirection) -> i32 {
    match direction {
        SortDirection::Asc => 1,
        SortDirection::Desc => -1,
    }
}

/// MongoDB document storage backend.
///
/// Cloning the store clones the underlying client handle, which shares one connection pool.
#[derive(Debug, Clone)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: impl Into<String>) -> Self {
        Self { client, database: database.into() }
    }

    /// Creates a builder connecting to `dsn`.
    ///
    /// The database is taken from the DSN path unless overridden with
    /// [`MongoDbStoreBuilder::database`].
    pub fn builder(dsn: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn)
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(&KeySanitizer::sanitize_string(collection_name))
    }

    fn acknowledges_writes(collection: &MongoCollection<Document>) -> bool {
        match collection.write_concern() {
            Some(concern) => {
                !matches!(concern.w, Some(Acknowledgment::Nodes(0))) || concern.journal == Some(true)
            }
            None => true,
        }
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn insert_document(&self, document: Document, collection: &str) -> StoreResult<()> {
        let id = document
            .get_str(ID_FIELD)
            .map_err(|_| StoreError::InvalidDocument(format!("document has no string '{ID_FIELD}'")))?
            .to_string();

        match self
            .get_collection(collection)
            .insert_one(KeySanitizer::sanitize_document(document))
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if is_duplicate_key(&err) => Err(StoreError::DuplicateKey(id, collection.to_string())),
            Err(err) => Err(backend_error(err)),
        }
    }

    async fn replace_document(
        &self,
        document: Document,
        id: &str,
        guard: VersionGuard,
        collection: &str,
    ) -> StoreResult<WriteOutcome> {
        let filter = match guard {
            VersionGuard::Unchecked => doc! { ID_FIELD: id },
            // A missing version reads as 0, which `$lt` alone would never match.
            VersionGuard::Below(version) => doc! {
                ID_FIELD: id,
                "$or": [
                    { VERSION_FIELD: { "$lt": mapping::version_to_bson(version)? } },
                    { VERSION_FIELD: { "$exists": false } },
                ],
            },
        };

        let target = self.get_collection(collection);
        let acknowledged = Self::acknowledges_writes(&target);

        let result = target
            .replace_one(filter, KeySanitizer::sanitize_document(document))
            .await
            .map_err(backend_error)?;

        debug!(
            collection,
            id,
            matched = result.matched_count,
            modified = result.modified_count,
            "replaced document"
        );

        if !acknowledged {
            return Ok(WriteOutcome::unacknowledged());
        }

        Ok(WriteOutcome::acknowledged(result.matched_count, Some(result.modified_count)))
    }

    async fn find_document(&self, id: &str, collection: &str) -> StoreResult<Option<Document>> {
        Ok(self
            .get_collection(collection)
            .find_one(doc! { ID_FIELD: id })
            .await
            .map_err(backend_error)?
            .map(KeySanitizer::restore_document))
    }

    async fn find_and_delete_document(
        &self,
        id: &str,
        collection: &str,
    ) -> StoreResult<Option<Document>> {
        Ok(self
            .get_collection(collection)
            .find_one_and_delete(doc! { ID_FIELD: id })
            .await
            .map_err(backend_error)?
            .map(KeySanitizer::restore_document))
    }

    async fn query_documents(&self, query: Query, collection: &str) -> StoreResult<Vec<Document>> {
        let mut options = FindOptions::default();

        if let Some(limit) = query.limit {
            options.limit = Some(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        if let Some(skip) = query.offset {
            options.skip = Some(skip as u64);
        }
        if let Some(sort) = &query.sort {
            options.sort = Some(if sort.is_primary_key() {
                doc! { ID_FIELD: sort_direction(sort.direction) }
            } else {
                let field = KeySanitizer::sanitize_string(&sort.field);

                doc! { field: sort_direction(sort.direction), ID_FIELD: 1 }
            });
        }

        Ok(self
            .get_collection(collection)
            .find(doc! {})
            .with_options(options)
            .await
            .map_err(backend_error)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(backend_error)?
            .into_iter()
            .map(KeySanitizer::restore_document)
            .collect())
    }

    async fn count_documents(&self, collection: &str) -> StoreResult<u64> {
        self.get_collection(collection)
            .count_documents(doc! {})
            .await
            .map_err(backend_error)
    }

    async fn create_collection(&self, name: &str) -> StoreResult<()> {
        self.client
            .database(&self.database)
            .create_collection(KeySanitizer::sanitize_string(name))
            .await
            .map_err(backend_error)?;

        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> StoreResult<()> {
        self.get_collection(name)
            .drop()
            .await
            .map_err(backend_error)?;

        Ok(())
    }

    async fn list_collections(&self) -> StoreResult<Vec<String>> {
        let mut names = self
            .client
            .database(&self.database)
            .list_collection_names()
            .await
            .map_err(backend_error)?
            .into_iter()
            .map(|name| KeySanitizer::restore_string(&name))
            .collect::<Vec<_>>();
        names.sort();

        Ok(names)
    }

    async fn shutdown(self) -> StoreResult<()> {
        self.client.shutdown().await;

        info!(database = %self.database, "mongodb client shut down");

        Ok(())
    }
}

/// Builder for [`MongoDbStore`].
///
/// ```ignore
/// use docrepo::{backend::StoreBackendBuilder, mongodb::MongoDbStore};
///
/// let store = MongoDbStore::builder("mongodb://localhost:27017/catalog")
///     .build()
///     .await?;
/// ```
pub struct MongoDbStoreBuilder {
    dsn: String,
    database: Option<String>,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str) -> Self {
        Self { dsn: dsn.to_string(), database: None }
    }

    /// Overrides the database named in the DSN.
    pub fn database(mut self, database: &str) -> Self {
        self.database = Some(database.to_string());
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> StoreResult<Self::Backend> {
        let options = ClientOptions::parse(&self.dsn)
            .await
            .map_err(|e| StoreError::Initialization(e.to_string()))?;

        let database = self
            .database
            .or_else(|| options.default_database.clone())
            .ok_or_else(|| StoreError::Initialization("DSN does not name a database".into()))?;

        let client = Client::with_options(options)
            .map_err(|e| StoreError::Initialization(e.to_string()))?;

        info!(database = %database, "connected mongodb client");

        Ok(MongoDbStore::new(client, database))
    }
}
