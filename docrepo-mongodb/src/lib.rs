//! MongoDB backend implementation for docrepo.
//!
//! This crate provides a MongoDB-based implementation of the `StoreBackend` trait. Guarded
//! replaces are expressed as a single `replaceOne` whose filter carries the version
//! predicate, so the server evaluates the check and the write atomically.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docrepo = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Connection
//!
//! The backend is built from a MongoDB connection string naming the database, either
//! through [`MongoDbStore::builder`] or through `docrepo::connect`.
//!
//! # Example
//!
//! ```ignore
//! use docrepo::{backend::StoreBackendBuilder, mongodb::MongoDbStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MongoDbStore::builder("mongodb://localhost:27017/my_database")
//!         .build()
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docrepo_mongodb;

mod sanitizer;
pub mod store;

pub use store::{MongoDbStore, MongoDbStoreBuilder};
