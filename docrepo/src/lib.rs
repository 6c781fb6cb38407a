//! Main docrepo crate: versioned entity repositories over document stores.
//!
//! This crate is the primary entry point for users of the docrepo framework. It re-exports
//! the core types from the sub-crates, the `Entity` derive, the storage backends and a
//! [`connect`] function resolving a connection string to a store.
//!
//! # Features
//!
//! - **Optimistic concurrency** - Updates only land on the revision they were derived from
//! - **Typed conflicts** - Not-found, duplicate-key and version conflicts are distinct outcomes
//! - **Multiple backends** - In-memory and MongoDB storage behind one trait
//!
//! # Quick Start
//!
//! ```ignore
//! use docrepo::prelude::*;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize, Entity)]
//! pub struct User {
//!     #[serde(skip)]
//!     pub header: EntityHeader,
//!     pub name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = docrepo::connect("memory://app").await?;
//!     let users = store.repository::<User>();
//!
//!     let alice = users.insert(User { name: "Alice".into(), ..Default::default() }).await?;
//!
//!     let mut renamed = alice.clone();
//!     renamed.name = "Alicia".into();
//!     let renamed = users.update(renamed).await?;
//!     assert_eq!(renamed.version(), 1);
//!
//!     // `alice` still carries version 0, so this write is rejected.
//!     let err = users.update(alice).await.unwrap_err();
//!     assert_eq!(err.kind(), ErrorKind::VersionConflict);
//!
//!     store.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory storage for development and testing
//! - [`mongodb`] - Persistent MongoDB backend (requires `mongodb` feature)

#[allow(unused_extern_crates)]
extern crate self as docrepo;

use std::sync::Arc;

use tracing::info;

pub mod prelude;

pub use docrepo_core::{backend, cancel, entity, error, mapping, page, policy, query, repository, store};
pub use docrepo_macros::Entity;

// Re-export BSON types for convenience
pub use bson;

use crate::{
    backend::{SharedBackend, StoreBackendBuilder},
    error::{StoreError, StoreResult},
    store::DocumentStore,
};

/// In-memory storage backend implementations.
pub mod memory {
    pub use docrepo_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docrepo_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}

/// Opens a document store from a connection string.
///
/// | scheme                         | backend                          |
/// |--------------------------------|----------------------------------|
/// | `memory://<name>`              | a fresh, empty in-memory store   |
/// | `mongodb://`, `mongodb+srv://` | MongoDB (requires `mongodb`)     |
///
/// For MongoDB the database is the one named in the connection string path.
///
/// # Errors
///
/// Returns [`StoreError::Initialization`] for an unknown scheme, a DSN without a database,
/// or a connection string the driver rejects.
pub async fn connect(dsn: &str) -> StoreResult<DocumentStore<SharedBackend>> {
    let Some((scheme, _)) = dsn.split_once("://") else {
        return Err(StoreError::Initialization(format!("malformed connection string '{dsn}'")));
    };

    let backend: SharedBackend = match scheme {
        "memory" => Arc::new(memory::InMemoryStore::builder().build().await?),
        #[cfg(feature = "mongodb")]
        "mongodb" | "mongodb+srv" => Arc::new(mongodb::MongoDbStore::builder(dsn).build().await?),
        #[cfg(not(feature = "mongodb"))]
        "mongodb" | "mongodb+srv" => {
            return Err(StoreError::Initialization(
                "mongodb connection strings require the `mongodb` feature".into(),
            ));
        }
        other => {
            return Err(StoreError::Initialization(format!("unsupported store scheme '{other}'")));
        }
    };

    info!(scheme, "opened document store");

    Ok(DocumentStore::new(backend))
}
