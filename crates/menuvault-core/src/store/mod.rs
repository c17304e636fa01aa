//! Document store client.
//!
//! This module provides:
//! - The `DocumentStore` trait consumed by the migration and maintenance engines
//! - A SQLite-backed JSON document store implementing it
//! - FTS5 text indexes and TTL enforcement for that store

mod fts;
mod sqlite;
mod traits;
mod types;

pub use sqlite::SqliteDocumentStore;
pub use traits::DocumentStore;
pub use types::{
    Aggregation, CollectionStats, Document, Filter, GroupCount, IndexCreation, IndexField,
    IndexKey, IndexOptions, IndexSpec, SettingResult, ID_FIELD,
};
