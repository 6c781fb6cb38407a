//! Convenient re-exports of commonly used types from docrepo.
//!
//! ```ignore
//! use docrepo::prelude::*;
//! ```
//!
//! This provides access to:
//! - The entity trait, header and derive
//! - Store handles, backends and builders
//! - Repositories, policies and cancellation
//! - Listing, pagination and error types

pub use docrepo_core::{
    backend::{SharedBackend, StoreBackend, StoreBackendBuilder, VersionGuard, WriteOutcome},
    cancel::{CancelHandle, CancelSignal},
    entity::{Entity, EntityHeader, Metadata},
    error::{ErrorKind, RepositoryError, RepositoryResult, StoreError, StoreResult},
    mapping::{Conventions, register_conventions},
    page::{Page, PaginationParams},
    policy::{DefaultPolicy, RepositoryOptions, RepositoryPolicy},
    query::{Query, SortDirection},
    repository::Repository,
    store::DocumentStore,
};
pub use docrepo_macros::Entity;
