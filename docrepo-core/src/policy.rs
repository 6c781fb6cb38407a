//! Per-repository strategy: collection naming, version checking, id generation, timeouts.
//!
//! [`DefaultPolicy`] covers the common case. [`RepositoryOptions`] is the configurable
//! policy and can be deserialized from configuration:
//!
//! ```ignore
//! let options: RepositoryOptions = serde_json::from_str(r#"{
//!     "collection": "catalog",
//!     "ignore_version_check": false,
//!     "operation_timeout_ms": 2000
//! }"#)?;
//!
//! let products = store.repository_with::<Product, _>(options);
//! ```

use serde::{Deserialize, Serialize};
use std::{fmt::Debug, time::Duration};
use uuid::Uuid;

use crate::entity::Entity;

/// Strategy consulted by a repository for behavior that varies per entity type.
pub trait RepositoryPolicy: Debug + Send + Sync + Clone + 'static {
    /// Resolves the collection entities of type `E` are stored in.
    fn collection_name<E: Entity>(&self) -> String {
        E::collection_name()
    }

    /// When `true`, updates replace by id alone and never report version conflicts.
    fn ignore_version_check(&self) -> bool {
        false
    }

    /// Generates an id for an entity inserted without one.
    fn generate_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    /// Upper bound on the duration of each store call.
    fn operation_timeout(&self) -> Option<Duration> {
        None
    }
}

/// Entity-derived collection names, version checking on, UUIDv4 ids, no timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPolicy;

impl RepositoryPolicy for DefaultPolicy {}

/// Configurable repository policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryOptions {
    /// Overrides the entity's collection name.
    pub collection: Option<String>,
    /// Bypasses the version predicate on update.
    pub ignore_version_check: bool,
    /// Timeout applied to each store call, in milliseconds.
    pub operation_timeout_ms: Option<u64>,
}

impl RepositoryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn with_ignore_version_check(mut self, ignore: bool) -> Self {
        self.ignore_version_check = ignore;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }
}

impl RepositoryPolicy for RepositoryOptions {
    fn collection_name<E: Entity>(&self) -> String {
        self.collection
            .clone()
            .unwrap_or_else(E::collection_name)
    }

    fn ignore_version_check(&self) -> bool {
        self.ignore_version_check
    }

    fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityHeader;

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Order {
        #[serde(skip)]
        header: EntityHeader,
    }

    impl Entity for Order {
        fn header(&self) -> &EntityHeader {
            &self.header
        }

        fn header_mut(&mut self) -> &mut EntityHeader {
            &mut self.header
        }
    }

    #[test]
    fn default_policy_uses_entity_collection() {
        assert_eq!(DefaultPolicy.collection_name::<Order>(), "Orders");
        assert!(!DefaultPolicy.ignore_version_check());
        assert_ne!(DefaultPolicy.generate_id(), DefaultPolicy.generate_id());
    }

    #[test]
    fn options_parse_from_config() {
        let options: RepositoryOptions = serde_json::from_str(
            r#"{ "collection": "archive", "operation_timeout_ms": 250 }"#,
        )
        .unwrap();

        assert_eq!(options.collection_name::<Order>(), "archive");
        assert!(!options.ignore_version_check());
        assert_eq!(options.operation_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn options_fall_back_to_entity_collection() {
        let options = RepositoryOptions::new().with_ignore_version_check(true);

        assert_eq!(options.collection_name::<Order>(), "Orders");
        assert!(options.ignore_version_check());
        assert_eq!(options.operation_timeout(), None);
    }
}
