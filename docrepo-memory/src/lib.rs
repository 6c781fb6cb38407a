//! In-memory document storage backend for docrepo.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It uses async-aware read-write locks for concurrent access and is intended for
//! development and testing.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Atomic guarded replace** - Version checks and writes happen under one write lock
//! - **Deterministic listings** - Documents iterate in id order; sorts break ties by id
//!
//! # Quick Start
//!
//! ```ignore
//! use docrepo::{Entity, DocumentStore, entity::EntityHeader, memory::InMemoryStore};
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
//!     let store = DocumentStore::new(InMemoryStore::new());
//!     let users = store.repository::<User>();
//!
//!     let user = users.insert(User { name: "Alice".into(), ..Default::default() }).await?;
//!     assert_eq!(user.version(), 0);
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docrepo_memory;

mod ordering;
pub mod store;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
