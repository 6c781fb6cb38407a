//! The versioned, identified record shape every stored entity must satisfy.
//!
//! Entities embed an [`EntityHeader`] holding the identity and revision bookkeeping
//! (`id`, `created_at`, `updated_at`, `version`, `metadata`). The header is owned by the
//! repository: callers can read it, pre-assign an id and edit the metadata bag, but
//! timestamps and the version counter only change through repository operations.
//!
//! # Example
//!
//! ```ignore
//! use docrepo::{Entity, entity::EntityHeader};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize, Entity)]
//! pub struct Product {
//!     #[serde(skip)]
//!     pub header: EntityHeader,
//!     pub name: String,
//! }
//!
//! assert_eq!(Product::collection_name(), "Products");
//! ```

use bson::Document;
use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use std::fmt::Debug;

/// Open-ended bag of stored fields that are not modeled by the entity type.
pub type Metadata = Document;

/// Identity and revision bookkeeping shared by every entity.
///
/// The header is not serializable on its own; the mapping layer writes its
/// fields as top-level document fields. Entity types must mark the header field with
/// `#[serde(skip)]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityHeader {
    id: String,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    metadata: Metadata,
}

impl EntityHeader {
    /// Creates a header for a new entity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a header for a new entity with a caller-chosen id.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self { id: id.into(), ..Self::default() }
    }

    /// Returns the entity id, or an empty string if none has been assigned yet.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns `true` once an id has been assigned.
    pub fn has_id(&self) -> bool {
        !self.id.is_empty()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Returns the revision counter last observed for this entity.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    pub(crate) fn assign_id(&mut self, id: String) {
        self.id = id;
    }

    pub(crate) fn stamp_created(&mut self, at: DateTime<Utc>) {
        self.created_at = Some(at);
        self.updated_at = Some(at);
        self.version = 0;
    }

    pub(crate) fn stamp_updated(&mut self, at: DateTime<Utc>, version: u64) {
        self.updated_at = Some(at);
        self.version = version;
    }

    /// Puts back revision state captured before a rejected write.
    pub(crate) fn restore(&mut self, updated_at: Option<DateTime<Utc>>, version: u64) {
        self.updated_at = updated_at;
        self.version = version;
    }

    pub(crate) fn from_parts(
        id: String,
        created_at: Option<DateTime<Utc>>,
        updated_at: Option<DateTime<Utc>>,
        version: u64,
        metadata: Metadata,
    ) -> Self {
        Self { id, created_at, updated_at, version, metadata }
    }
}

/// Core trait that all entities persisted through a repository must implement.
///
/// Usually derived with `#[derive(Entity)]`, which locates the [`EntityHeader`] field and
/// honors an optional `#[entity(collection = "...")]` attribute.
pub trait Entity: Serialize + DeserializeOwned + Debug + Send + Sync + Clone + 'static {
    /// Returns the identity and revision header of this entity.
    fn header(&self) -> &EntityHeader;

    /// Returns the header mutably, for the repository and for metadata edits.
    fn header_mut(&mut self) -> &mut EntityHeader;

    /// Returns the name of the collection entities of this type are stored in.
    ///
    /// Defaults to the type name pluralized with a trailing `s`.
    fn collection_name() -> String {
        pluralize(short_type_name(std::any::type_name::<Self>()))
    }

    /// Shorthand for `self.header().id()`.
    fn id(&self) -> &str {
        self.header().id()
    }

    /// Shorthand for `self.header().version()`.
    fn version(&self) -> u64 {
        self.header().version()
    }
}

fn short_type_name(full: &str) -> &str {
    let without_generics = full.split('<').next().unwrap_or(full);
    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
}

fn pluralize(name: &str) -> String {
    if name.ends_with('s') {
        name.to_string()
    } else {
        format!("{name}s")
    }
}
