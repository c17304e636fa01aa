//! Value types exchanged with a document store.

use crate::error::{MenuvaultError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::LazyLock;

/// Pseudo-field addressing a document's primary key.
pub const ID_FIELD: &str = "_id";

/// A stored document: its primary key plus a JSON object body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Build a document from a JSON object literal. Non-object values yield an empty body.
    pub fn from_json(id: impl Into<String>, body: Value) -> Self {
        let fields = match body {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self::new(id, fields)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }
}

/// Document selection predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Every document in the collection.
    All,
    /// Field equals the given scalar.
    Eq(String, Value),
    /// Field is present, not null, not an empty string and not an empty array.
    NonEmpty(String),
    /// At least one nested filter matches.
    AnyOf(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(field.into(), value.into())
    }

    /// Documents with at least one of `fields` populated.
    pub fn any_non_empty<'a>(fields: impl IntoIterator<Item = &'a str>) -> Self {
        Filter::AnyOf(
            fields
                .into_iter()
                .map(|f| Filter::NonEmpty(f.to_string()))
                .collect(),
        )
    }
}

/// Aggregation shapes supported by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum Aggregation {
    /// Count documents per distinct value of `group_by`, largest groups first.
    GroupCount { group_by: String, limit: usize },
}

/// One row of a group-count aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupCount {
    pub key: Value,
    pub count: u64,
}

/// Storage statistics for one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionStats {
    pub name: String,
    pub count: u64,
    pub avg_obj_size: f64,
    pub storage_size: u64,
    pub index_count: u64,
    pub total_index_size: u64,
}

/// Key type of one indexed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKey {
    Ascending,
    Descending,
    Text,
    #[serde(rename = "2dsphere")]
    Geo2dsphere,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexField {
    pub field: String,
    pub key: IndexKey,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexOptions {
    pub name: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub sparse: bool,
    /// `Some(0)` means the indexed field holds the absolute expiry time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<u64>,
}

/// Declarative index definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSpec {
    pub collection: String,
    pub fields: Vec<IndexField>,
    pub options: IndexOptions,
}

impl IndexSpec {
    pub fn new(collection: &str, name: &str) -> Self {
        Self {
            collection: collection.to_string(),
            fields: Vec::new(),
            options: IndexOptions {
                name: name.to_string(),
                ..Default::default()
            },
        }
    }

    fn key(mut self, field: &str, key: IndexKey) -> Self {
        self.fields.push(IndexField {
            field: field.to_string(),
            key,
        });
        self
    }

    pub fn asc(self, field: &str) -> Self {
        self.key(field, IndexKey::Ascending)
    }

    pub fn desc(self, field: &str) -> Self {
        self.key(field, IndexKey::Descending)
    }

    pub fn text(self, field: &str) -> Self {
        self.key(field, IndexKey::Text)
    }

    pub fn geo(self, field: &str) -> Self {
        self.key(field, IndexKey::Geo2dsphere)
    }

    pub fn unique(mut self) -> Self {
        self.options.unique = true;
        self
    }

    pub fn sparse(mut self) -> Self {
        self.options.sparse = true;
        self
    }

    pub fn ttl(mut self, seconds: u64) -> Self {
        self.options.ttl_seconds = Some(seconds);
        self
    }

    pub fn name(&self) -> &str {
        &self.options.name
    }

    pub fn is_ttl(&self) -> bool {
        self.options.ttl_seconds.is_some()
    }

    pub fn is_text(&self) -> bool {
        self.fields.iter().any(|f| f.key == IndexKey::Text)
    }

    /// Check names and field paths before they are spliced into DDL.
    pub fn validate(&self) -> Result<()> {
        validate_identifier("collection", &self.collection)?;
        validate_identifier("index name", &self.options.name)?;
        if self.fields.is_empty() {
            return Err(MenuvaultError::Validation {
                field: self.options.name.clone(),
                message: "index has no fields".to_string(),
            });
        }
        for field in &self.fields {
            validate_field_path(&field.field)?;
        }
        if self.is_ttl() && self.fields.len() != 1 {
            return Err(MenuvaultError::Validation {
                field: self.options.name.clone(),
                message: "TTL indexes must cover exactly one field".to_string(),
            });
        }
        Ok(())
    }
}

/// Result of a successful index request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IndexCreation {
    Created,
    AlreadyExists,
}

/// Outcome of applying one store-level setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingResult {
    pub name: String,
    pub value: String,
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex must compile"));

static FIELD_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$")
        .expect("field path regex must compile")
});

pub(crate) fn validate_identifier(what: &str, value: &str) -> Result<()> {
    if IDENTIFIER.is_match(value) {
        Ok(())
    } else {
        Err(MenuvaultError::Validation {
            field: what.to_string(),
            message: format!("'{}' is not a valid identifier", value),
        })
    }
}

pub(crate) fn validate_field_path(path: &str) -> Result<()> {
    if path == ID_FIELD || FIELD_PATH.is_match(path) {
        Ok(())
    } else {
        Err(MenuvaultError::Validation {
            field: path.to_string(),
            message: "field paths must be dotted identifiers".to_string(),
        })
    }
}
