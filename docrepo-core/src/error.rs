//! Error types and result types for repository and store operations.
//!
//! Two layers of errors exist:
//!
//! - [`StoreError`] - infrastructural failures reported by a store backend (connectivity,
//!   serialization, timeouts) plus the uniqueness-violation signal backends raise on insert.
//! - [`RepositoryError`] - the closed set of outcomes a repository operation can fail with.
//!   Conflict kinds carry the offending entity so callers can re-read and retry.
//!
//! Use [`ErrorKind`] to branch on the failure without matching on payloads.

use bson::error::Error as BsonError;
use std::fmt::Debug;
use thiserror::Error;

/// Represents all possible errors that can occur when talking to a document store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Serialization/deserialization error when converting between entities and BSON.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during store initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// A document with the given ID already exists in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document {0} already exists in collection {1}")]
    DuplicateKey(String, String),
    /// The requested collection does not exist in the store.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
    /// The document has an invalid structure for the store.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
    /// The store call did not complete within the configured timeout.
    #[error("Operation {0} timed out")]
    Timeout(String),
    /// The store call was aborted by a cancellation signal.
    #[error("Operation {0} was cancelled")]
    Cancelled(String),
    /// The store accepted a write without acknowledging its outcome.
    #[error("Write to collection {0} was not acknowledged")]
    Unacknowledged(String),
}

/// A specialized `Result` type for store backend operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl From<BsonError> for StoreError {
    fn from(err: BsonError) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Discriminant of a [`RepositoryError`], for callers that only need to branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    VersionConflict,
    DuplicateKey,
    Store,
}

/// Failure of a repository operation.
///
/// `Validation` is raised before any store access. `NotFound`, `VersionConflict` and
/// `DuplicateKey` are the expected outcomes of the optimistic concurrency protocol and are
/// never retried internally. `Store` wraps an infrastructural failure.
#[derive(Error, Debug)]
pub enum RepositoryError<T: Debug> {
    /// The entity handed to the repository cannot be written as-is.
    #[error("Validation failed: {message}")]
    Validation { entity: Box<T>, message: String },
    /// An update targeted an id that does not exist in the collection.
    #[error("Entity not found: {message}")]
    NotFound { entity: Box<T>, message: String },
    /// An update was derived from a version the store has already superseded.
    #[error("Version conflict: {message}")]
    VersionConflict { entity: Box<T>, message: String },
    /// An insert targeted an id already present in the collection.
    #[error("Duplicate key: {message}")]
    DuplicateKey { entity: Box<T>, message: String },
    /// The underlying store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A specialized `Result` type for repository operations over entity type `T`.
pub type RepositoryResult<R, T> = Result<R, RepositoryError<T>>;

impl<T: Debug> RepositoryError<T> {
    pub(crate) fn validation(entity: T, message: impl Into<String>) -> Self {
        RepositoryError::Validation { entity: Box::new(entity), message: message.into() }
    }

    pub(crate) fn not_found(entity: T, message: impl Into<String>) -> Self {
        RepositoryError::NotFound { entity: Box::new(entity), message: message.into() }
    }

    pub(crate) fn version_conflict(entity: T, message: impl Into<String>) -> Self {
        RepositoryError::VersionConflict { entity: Box::new(entity), message: message.into() }
    }

    pub(crate) fn duplicate_key(entity: T, message: impl Into<String>) -> Self {
        RepositoryError::DuplicateKey { entity: Box::new(entity), message: message.into() }
    }

    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RepositoryError::Validation { .. } => ErrorKind::Validation,
            RepositoryError::NotFound { .. } => ErrorKind::NotFound,
            RepositoryError::VersionConflict { .. } => ErrorKind::VersionConflict,
            RepositoryError::DuplicateKey { .. } => ErrorKind::DuplicateKey,
            RepositoryError::Store(_) => ErrorKind::Store,
        }
    }

    /// Returns `true` for the rejected-write outcomes of the concurrency protocol.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NotFound | ErrorKind::VersionConflict | ErrorKind::DuplicateKey
        )
    }

    /// Returns the entity the failed operation was given, if the error carries one.
    pub fn entity(&self) -> Option<&T> {
        match self {
            RepositoryError::Validation { entity, .. }
            | RepositoryError::NotFound { entity, .. }
            | RepositoryError::VersionConflict { entity, .. }
            | RepositoryError::DuplicateKey { entity, .. } => Some(entity),
            RepositoryError::Store(_) => None,
        }
    }

    /// Consumes the error and hands back the entity it carries.
    pub fn into_entity(self) -> Option<T> {
        match self {
            RepositoryError::Validation { entity, .. }
            | RepositoryError::NotFound { entity, .. }
            | RepositoryError::VersionConflict { entity, .. }
            | RepositoryError::DuplicateKey { entity, .. } => Some(*entity),
            RepositoryError::Store(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_distinguish_conflicts_from_failures() {
        let conflict = RepositoryError::version_conflict("doc", "stale");
        assert_eq!(conflict.kind(), ErrorKind::VersionConflict);
        assert!(conflict.is_conflict());
        assert_eq!(conflict.entity(), Some(&"doc"));

        let store: RepositoryError<&str> = StoreError::Timeout("get".into()).into();
        assert_eq!(store.kind(), ErrorKind::Store);
        assert!(!store.is_conflict());
        assert!(store.into_entity().is_none());

        let validation = RepositoryError::validation("doc", "no id");
        assert!(!validation.is_conflict());
        assert_eq!(validation.to_string(), "Validation failed: no id");
    }
}
