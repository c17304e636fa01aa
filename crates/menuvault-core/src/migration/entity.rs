//! Entity types and their asset-field strategy table.

use crate::asset::RemoteDescriptor;
use crate::error::{MenuvaultError, Result};
use crate::store::{Document, Filter};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Category of record carrying migratable media fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityType {
    Restaurants,
    Menus,
    MenuItems,
    Profiles,
}

impl EntityType {
    /// Every entity type, in processing order.
    pub const ALL: [EntityType; 4] = [
        EntityType::Restaurants,
        EntityType::Menus,
        EntityType::MenuItems,
        EntityType::Profiles,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Restaurants => "restaurants",
            EntityType::Menus => "menus",
            EntityType::MenuItems => "menuItems",
            EntityType::Profiles => "profiles",
        }
    }

    pub fn strategy(&self) -> &'static FieldStrategy {
        match self {
            EntityType::Restaurants => &RESTAURANTS,
            EntityType::Menus => &MENUS,
            EntityType::MenuItems => &MENU_ITEMS,
            EntityType::Profiles => &PROFILES,
        }
    }

    pub fn collection(&self) -> &'static str {
        self.strategy().collection
    }

    /// Parse a comma-separated list such as `restaurants,menuItems`.
    ///
    /// Duplicates are dropped and the result follows processing order.
    pub fn parse_list(list: &str) -> Result<Vec<EntityType>> {
        let mut parsed = Vec::new();
        for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let entity_type: EntityType = name.parse()?;
            if !parsed.contains(&entity_type) {
                parsed.push(entity_type);
            }
        }
        if parsed.is_empty() {
            return Err(MenuvaultError::Config {
                message: "no entity types selected".to_string(),
            });
        }
        parsed.sort();
        Ok(parsed)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = MenuvaultError;

    fn from_str(s: &str) -> Result<Self> {
        EntityType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| MenuvaultError::UnknownEntityType(s.to_string()))
    }
}

/// Where an entity type keeps its media references.
#[derive(Debug)]
pub struct FieldStrategy {
    pub collection: &'static str,
    pub display_field: &'static str,
    /// Fields holding one reference, in canonical-precedence order.
    pub single_fields: &'static [&'static str],
    /// Fields holding an array of references.
    pub list_fields: &'static [&'static str],
    /// Field mirroring the URL of the first single-value field migrated in a pass.
    pub canonical_field: &'static str,
}

impl FieldStrategy {
    pub fn asset_fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.single_fields
            .iter()
            .chain(self.list_fields.iter())
            .copied()
    }

    /// Documents with at least one populated asset field.
    pub fn filter(&self) -> Filter {
        Filter::any_non_empty(self.asset_fields())
    }
}

static RESTAURANTS: FieldStrategy = FieldStrategy {
    collection: "restaurants",
    display_field: "name",
    single_fields: &["logo", "banner"],
    list_fields: &["gallery"],
    canonical_field: "imageUrl",
};

static MENUS: FieldStrategy = FieldStrategy {
    collection: "menus",
    display_field: "name",
    single_fields: &["image"],
    list_fields: &[],
    canonical_field: "imageUrl",
};

static MENU_ITEMS: FieldStrategy = FieldStrategy {
    collection: "menuitems",
    display_field: "name",
    single_fields: &["image"],
    list_fields: &["gallery"],
    canonical_field: "imageUrl",
};

static PROFILES: FieldStrategy = FieldStrategy {
    collection: "profiles",
    display_field: "displayName",
    single_fields: &["avatar"],
    list_fields: &[],
    canonical_field: "avatarUrl",
};

/// A stored media reference.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetReference {
    pub source_locator: String,
    /// Present when the stored value is already a descriptor object.
    pub remote_descriptor: Option<RemoteDescriptor>,
}

impl AssetReference {
    /// Read a stored field value.
    ///
    /// Strings are bare locators; objects carry their locator in `url`.
    /// Anything else, including blank strings, is not a reference.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(Self {
                source_locator: s.clone(),
                remote_descriptor: None,
            }),
            Value::Object(map) => {
                let url = map.get("url").and_then(Value::as_str)?;
                if url.trim().is_empty() {
                    return None;
                }
                Some(Self {
                    source_locator: url.to_string(),
                    remote_descriptor: serde_json::from_value(value.clone()).ok(),
                })
            }
            _ => None,
        }
    }
}

/// Position of a reference inside an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSlot {
    Single,
    /// Element index within a list field.
    Element(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssetField {
    pub field: &'static str,
    pub slot: FieldSlot,
    pub reference: AssetReference,
}

impl AssetField {
    /// `gallery[2]` style label used in outcomes and error records.
    pub fn label(&self) -> String {
        match self.slot {
            FieldSlot::Single => self.field.to_string(),
            FieldSlot::Element(i) => format!("{}[{}]", self.field, i),
        }
    }
}

/// An entity with its asset references extracted.
#[derive(Debug, Clone)]
pub struct MigratableEntity {
    pub entity_type: EntityType,
    pub id: String,
    pub display_name: String,
    pub asset_fields: Vec<AssetField>,
}

impl MigratableEntity {
    pub fn from_document(entity_type: EntityType, document: &Document) -> Self {
        let strategy = entity_type.strategy();
        let mut asset_fields = Vec::new();

        for &field in strategy.single_fields {
            if let Some(reference) = document.get(field).and_then(AssetReference::from_value) {
                asset_fields.push(AssetField {
                    field,
                    slot: FieldSlot::Single,
                    reference,
                });
            }
        }
        for &field in strategy.list_fields {
            let Some(Value::Array(elements)) = document.get(field) else {
                continue;
            };
            for (i, element) in elements.iter().enumerate() {
                if let Some(reference) = AssetReference::from_value(element) {
                    asset_fields.push(AssetField {
                        field,
                        slot: FieldSlot::Element(i),
                        reference,
                    });
                }
            }
        }

        let display_name = document
            .get_str(strategy.display_field)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| document.id.clone());

        Self {
            entity_type,
            id: document.id.clone(),
            display_name,
            asset_fields,
        }
    }
}
