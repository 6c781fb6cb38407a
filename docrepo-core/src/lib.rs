//! Versioned entity repositories with optimistic concurrency over document stores.
//!
//! This crate is the core of the docrepo project and provides:
//!
//! - **Entity model** ([`entity`]) - The entity header every persisted type embeds and the [`entity::Entity`] trait
//! - **Document mapping** ([`mapping`]) - Conversion between entities and stored BSON documents
//! - **Store backend abstraction** ([`backend`]) - The primitives a document store must provide
//! - **Repository engine** ([`repository`]) - Insert, versioned update, lookup, delete and listing
//! - **Document store** ([`store`]) - Owns a backend and hands out repositories
//! - **Policies** ([`policy`]) - Collection naming, version checking, id generation and timeouts
//! - **Cancellation** ([`cancel`]) - Signals aborting in-flight store calls
//! - **Listing and pagination** ([`query`], [`page`]) - Ordered, windowed listings
//! - **Error handling** ([`error`]) - Repository outcomes and store failures
//!
//! # Example
//!
//! ```ignore
//! use docrepo::{Entity, entity::EntityHeader, store::DocumentStore};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize, Entity)]
//! pub struct Product {
//!     #[serde(skip)]
//!     pub header: EntityHeader,
//!     pub name: String,
//! }
//!
//! let products = store.repository::<Product>();
//! let product = products.insert(Product { name: "lamp".into(), ..Default::default() }).await?;
//! assert_eq!(product.version(), 0);
//! ```

#[allow(unused_extern_crates)]
extern crate self as docrepo_core;

pub mod backend;
pub mod cancel;
pub mod entity;
pub mod error;
pub mod mapping;
pub mod page;
pub mod policy;
pub mod query;
pub mod repository;
pub mod store;
