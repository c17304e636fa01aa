//! Document store client trait.

use super::types::{
    Aggregation, CollectionStats, Document, Filter, GroupCount, IndexCreation, IndexSpec,
    SettingResult,
};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Thin client over a collection-oriented document store.
///
/// The maintenance pipeline only needs a narrow slice of a store's query
/// engine: predicate lookups, field updates, group counts, index management
/// and TTL expiry. Implementations must not create a collection as a side
/// effect of a read or of a probe.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch every document in `collection` matching `filter`, ordered by id.
    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>>;

    /// Distinct non-null scalar values of `field`, rendered as strings.
    ///
    /// `"_id"` addresses the primary key.
    async fn distinct(&self, collection: &str, field: &str) -> Result<BTreeSet<String>>;

    /// Insert or replace a document, creating the collection if needed.
    async fn insert(&self, collection: &str, document: Document) -> Result<()>;

    /// Set top-level fields on one document.
    ///
    /// Returns `false` when no document with that id exists.
    async fn update_fields(
        &self,
        collection: &str,
        id: &str,
        set: Map<String, Value>,
    ) -> Result<bool>;

    async fn aggregate(&self, collection: &str, aggregation: &Aggregation)
        -> Result<Vec<GroupCount>>;

    /// Create an index.
    ///
    /// An index with the same name and an identical definition yields
    /// `IndexCreation::AlreadyExists`; a conflicting definition is an error.
    async fn create_index(&self, spec: &IndexSpec) -> Result<IndexCreation>;

    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Probe for a collection without creating it.
    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        Ok(self
            .list_collections()
            .await?
            .iter()
            .any(|name| name == collection))
    }

    async fn collection_stats(&self, collection: &str) -> Result<CollectionStats>;

    /// Delete documents whose TTL index has elapsed at `now` and return how
    /// many were removed.
    ///
    /// Stores that expire documents on their own keep this no-op.
    async fn purge_expired(&self, _now: DateTime<Utc>) -> Result<u64> {
        Ok(0)
    }

    /// Apply store-level maintenance settings, each isolated from the others.
    async fn apply_settings(&self) -> Result<Vec<SettingResult>>;
}
