//! Conversion between entities and stored BSON documents.
//!
//! The stored shape of an entity is its serde serialization with the [`EntityHeader`]
//! fields written at the top level:
//!
//! | field        | BSON type | source                          |
//! |--------------|-----------|---------------------------------|
//! | `_id`        | string    | `header.id()`                   |
//! | `created_at` | datetime  | `header.created_at()`           |
//! | `updated_at` | datetime  | `header.updated_at()`           |
//! | `version`    | int64     | `header.version()`              |
//!
//! Fields present in a stored document but not modeled by the entity type are collected
//! into the header's metadata bag on read and written back on the next write.
//!
//! Process-wide conventions (see [`Conventions`]) are registered once and shared by every
//! repository in the process.

use bson::{Bson, DateTime as BsonDateTime, Document, de::deserialize_from_bson, ser::serialize_to_bson};
use chrono::{DateTime, Utc};
use std::sync::OnceLock;
use tracing::info;

use crate::{
    entity::{Entity, EntityHeader, Metadata},
    error::{StoreError, StoreResult},
};

/// Primary-key field of stored documents.
pub const ID_FIELD: &str = "_id";
/// Creation timestamp field of stored documents.
pub const CREATED_AT_FIELD: &str = "created_at";
/// Last-update timestamp field of stored documents.
pub const UPDATED_AT_FIELD: &str = "updated_at";
/// Revision counter field of stored documents.
pub const VERSION_FIELD: &str = "version";

const HEADER_FIELDS: [&str; 4] = [ID_FIELD, CREATED_AT_FIELD, UPDATED_AT_FIELD, VERSION_FIELD];

static CONVENTIONS: OnceLock<Conventions> = OnceLock::new();

/// Serialization conventions shared by every repository in the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conventions {
    /// Omit null-valued fields when writing documents.
    pub ignore_if_null: bool,
}

impl Default for Conventions {
    fn default() -> Self {
        Self { ignore_if_null: true }
    }
}

/// Registers the process-wide conventions.
///
/// Only the first registration takes effect; later calls (including the implicit one made
/// when the first repository is constructed) are no-ops. Returns `true` if this call
/// installed `conventions`.
pub fn register_conventions(conventions: Conventions) -> bool {
    let mut installed = false;

    CONVENTIONS.get_or_init(|| {
        installed = true;
        info!(ignore_if_null = conventions.ignore_if_null, "registered mapping conventions");
        conventions
    });

    installed
}

/// Returns the process-wide conventions, installing the defaults on first use.
pub fn conventions() -> &'static Conventions {
    register_conventions(Conventions::default());

    CONVENTIONS.get_or_init(Conventions::default)
}

/// Maps entities to stored documents and back.
pub struct EntityMapper;

impl EntityMapper {
    /// Builds the stored document for `entity`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidDocument`] if the entity does not serialize to a document
    /// or one of its fields collides with a header field, and
    /// [`StoreError::Serialization`] if serialization fails.
    pub fn to_document<E: Entity>(entity: &E) -> StoreResult<Document> {
        let mut document = match serialize_to_bson(entity)? {
            Bson::Document(document) => document,
            other => {
                return Err(StoreError::InvalidDocument(format!(
                    "entity serialized to {:?} instead of a document",
                    other.element_type()
                )));
            }
        };

        if let Some(field) = HEADER_FIELDS.iter().find(|field| document.contains_key(**field)) {
            return Err(StoreError::InvalidDocument(format!(
                "field '{field}' is reserved for the entity header"
            )));
        }

        let header = entity.header();

        for (key, value) in header.metadata() {
            if !HEADER_FIELDS.contains(&key.as_str()) && !document.contains_key(key) {
                document.insert(key.clone(), value.clone());
            }
        }

        if conventions().ignore_if_null {
            strip_nulls(&mut document);
        }

        document.insert(ID_FIELD, header.id());
        if let Some(created_at) = header.created_at() {
            document.insert(CREATED_AT_FIELD, BsonDateTime::from_chrono(created_at));
        }
        if let Some(updated_at) = header.updated_at() {
            document.insert(UPDATED_AT_FIELD, BsonDateTime::from_chrono(updated_at));
        }
        document.insert(VERSION_FIELD, version_to_bson(header.version())?);

        Ok(document)
    }

    /// Rebuilds an entity from its stored document.
    ///
    /// # Errors
    ///
    /// Returns an error if a header field has an unexpected type or the remaining fields
    /// do not deserialize into `E`.
    pub fn from_document<E: Entity>(mut document: Document) -> StoreResult<E> {
        let id = match document.remove(ID_FIELD) {
            Some(Bson::String(id)) => id,
            Some(Bson::ObjectId(id)) => id.to_hex(),
            Some(other) => {
                return Err(StoreError::InvalidDocument(format!(
                    "field '{ID_FIELD}' has unexpected type {:?}",
                    other.element_type()
                )));
            }
            None => {
                return Err(StoreError::InvalidDocument(format!(
                    "stored document has no '{ID_FIELD}' field"
                )));
            }
        };
        let created_at = take_timestamp(&mut document, CREATED_AT_FIELD)?;
        let updated_at = take_timestamp(&mut document, UPDATED_AT_FIELD)?;
        let version = take_version(&mut document)?;

        let mut entity: E = deserialize_from_bson(Bson::Document(document.clone()))?;

        let modeled = match serialize_to_bson(&entity)? {
            Bson::Document(modeled) => modeled,
            _ => Document::new(),
        };
        let metadata = document
            .into_iter()
            .filter(|(key, _)| !modeled.contains_key(key))
            .collect::<Metadata>();

        *entity.header_mut() = EntityHeader::from_parts(id, created_at, updated_at, version, metadata);

        Ok(entity)
    }
}

/// Returns the current time at the precision documents store it with.
pub fn now() -> DateTime<Utc> {
    BsonDateTime::now().to_chrono()
}

/// Converts a version counter into its stored BSON form.
pub fn version_to_bson(version: u64) -> StoreResult<Bson> {
    i64::try_from(version)
        .map(Bson::Int64)
        .map_err(|_| StoreError::InvalidDocument(format!("version {version} exceeds storable range")))
}

/// Reads the stored version of a document. A missing field reads as version 0.
pub fn stored_version(document: &Document) -> StoreResult<u64> {
    match document.get(VERSION_FIELD) {
        None | Some(Bson::Null) => Ok(0),
        Some(Bson::Int64(version)) => to_version(*version),
        Some(Bson::Int32(version)) => to_version(i64::from(*version)),
        Some(other) => Err(StoreError::InvalidDocument(format!(
            "field '{VERSION_FIELD}' has unexpected type {:?}",
            other.element_type()
        ))),
    }
}

fn to_version(raw: i64) -> StoreResult<u64> {
    u64::try_from(raw)
        .map_err(|_| StoreError::InvalidDocument(format!("negative version {raw}")))
}

fn take_version(document: &mut Document) -> StoreResult<u64> {
    let version = stored_version(document)?;
    document.remove(VERSION_FIELD);

    Ok(version)
}

fn take_timestamp(document: &mut Document, field: &str) -> StoreResult<Option<DateTime<Utc>>> {
    match document.remove(field) {
        None | Some(Bson::Null) => Ok(None),
        Some(Bson::DateTime(at)) => Ok(Some(at.to_chrono())),
        Some(other) => Err(StoreError::InvalidDocument(format!(
            "field '{field}' has unexpected type {:?}",
            other.element_type()
        ))),
    }
}

fn strip_nulls(document: &mut Document) {
    let nulls = document
        .iter()
        .filter(|(_, value)| matches!(value, Bson::Null))
        .map(|(key, _)| key.clone())
        .collect::<Vec<_>>();

    for key in nulls {
        document.remove(&key);
    }

    for (_, value) in document.iter_mut() {
        strip_nested_nulls(value);
    }
}

fn strip_nested_nulls(value: &mut Bson) {
    match value {
        Bson::Document(nested) => strip_nulls(nested),
        Bson::Array(items) => items.iter_mut().for_each(strip_nested_nulls),
        _ => {}
    }
}
