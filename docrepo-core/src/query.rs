//! List queries over a collection: a single-field sort plus skip/limit windowing.
//!
//! This is not a filter language. Lookups by id go through dedicated backend
//! calls; everything else is a full-collection listing, optionally ordered and windowed.
//!
//! ```ignore
//! use docrepo::query::{Query, SortDirection};
//!
//! let query = Query::builder()
//!     .sort("created_at", SortDirection::Desc)
//!     .offset(20)
//!     .limit(10)
//!     .build();
//! ```

use serde::{Deserialize, Serialize};

use crate::mapping::ID_FIELD;

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

impl SortDirection {
    pub fn from_ascending(ascending: bool) -> Self {
        if ascending { SortDirection::Asc } else { SortDirection::Desc }
    }
}

/// Sort order for query results.
///
/// Backends break ties on the primary key in ascending order so that windows over an
/// unchanged collection are stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    /// The stored field name to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

impl Sort {
    /// Creates a sort on `field`. The entity-level name `id` refers to the primary key.
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        let field = field.into();
        let field = if field == "id" { ID_FIELD.to_string() } else { field };

        Self { field, direction }
    }

    /// Returns `true` if this sort is already on the primary key.
    pub fn is_primary_key(&self) -> bool {
        self.field == ID_FIELD
    }
}

/// A listing of a collection with optional ordering and windowing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    /// Maximum number of documents to return.
    pub limit: Option<usize>,
    /// Number of documents to skip.
    pub offset: Option<usize>,
    /// Sort order for results.
    pub sort: Option<Sort>,
}

impl Query {
    /// Creates a query listing the whole collection in store order.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    pub fn new() -> Self {
        QueryBuilder { query: Query::default() }
    }

    /// Sets the maximum number of documents to return.
    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = Some(limit);
        self
    }

    /// Sets the number of documents to skip.
    pub fn offset(mut self, offset: usize) -> Self {
        self.query.offset = Some(offset);
        self
    }

    /// Sets the sort order for the query results.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.query.sort = Some(Sort::new(field, direction));
        self
    }

    pub fn build(self) -> Query {
        self.query
    }
}
