//! Declarative index and TTL catalogue.

use crate::error::MenuvaultError;
use crate::store::{DocumentStore, IndexCreation, IndexSpec};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const DAY_SECONDS: u64 = 24 * 60 * 60;

/// Ordinary indexes, per collection.
pub fn index_catalogue() -> Vec<IndexSpec> {
    vec![
        // users
        IndexSpec::new("users", "users_email_unique").asc("email").unique(),
        IndexSpec::new("users", "users_username_unique")
            .asc("username")
            .unique()
            .sparse(),
        IndexSpec::new("users", "users_created").desc("createdAt"),
        // restaurants
        IndexSpec::new("restaurants", "restaurants_owner").asc("owner"),
        IndexSpec::new("restaurants", "restaurants_cuisine_rating")
            .asc("cuisine")
            .desc("rating"),
        IndexSpec::new("restaurants", "restaurants_slug_unique")
            .asc("slug")
            .unique()
            .sparse(),
        IndexSpec::new("restaurants", "restaurants_text")
            .text("name")
            .text("description")
            .text("cuisine"),
        IndexSpec::new("restaurants", "restaurants_location").geo("location"),
        // menus
        IndexSpec::new("menus", "menus_restaurant").asc("restaurantId"),
        IndexSpec::new("menus", "menus_restaurant_active")
            .asc("restaurantId")
            .asc("isActive"),
        // menuitems
        IndexSpec::new("menuitems", "menuitems_menu").asc("menuId"),
        IndexSpec::new("menuitems", "menuitems_menu_category")
            .asc("menuId")
            .asc("category"),
        IndexSpec::new("menuitems", "menuitems_price").asc("price"),
        IndexSpec::new("menuitems", "menuitems_text")
            .text("name")
            .text("description"),
        // profiles
        IndexSpec::new("profiles", "profiles_user_unique").asc("userId").unique(),
    ]
}

/// TTL indexes. Zero seconds means the field holds the absolute expiry.
pub fn ttl_catalogue() -> Vec<IndexSpec> {
    vec![
        IndexSpec::new("sessions", "sessions_expiry").asc("expiresAt").ttl(0),
        IndexSpec::new("passwordresets", "passwordresets_ttl")
            .asc("createdAt")
            .ttl(60 * 60),
        IndexSpec::new("auditlogs", "auditlogs_ttl")
            .asc("createdAt")
            .ttl(90 * DAY_SECONDS),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IndexStatus {
    Created,
    AlreadyExists,
    Skipped,
    Failed,
}

/// Result of one catalogue entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexResult {
    pub collection: String,
    pub name: String,
    pub ttl: bool,
    pub status: IndexStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IndexResult {
    fn new(spec: &IndexSpec, status: IndexStatus, error: Option<String>) -> Self {
        Self {
            collection: spec.collection.clone(),
            name: spec.name().to_string(),
            ttl: spec.is_ttl(),
            status,
            error,
        }
    }
}

/// Creates catalogue indexes, isolating each failure.
pub struct IndexManager<'a> {
    store: &'a dyn DocumentStore,
}

impl<'a> IndexManager<'a> {
    pub fn new(store: &'a dyn DocumentStore) -> Self {
        Self { store }
    }

    /// Create every ordinary index.
    pub async fn create_all(&self) -> Vec<IndexResult> {
        self.create_specs(&index_catalogue(), false).await
    }

    /// Create TTL indexes on collections that already exist.
    pub async fn create_ttl(&self) -> Vec<IndexResult> {
        self.create_specs(&ttl_catalogue(), true).await
    }

    /// Create `specs` in order. With `probe`, a spec whose collection is
    /// missing is skipped rather than created.
    pub async fn create_specs(&self, specs: &[IndexSpec], probe: bool) -> Vec<IndexResult> {
        let mut results = Vec::with_capacity(specs.len());

        for spec in specs {
            if probe {
                match self.store.collection_exists(&spec.collection).await {
                    Ok(true) => {}
                    Ok(false) => {
                        debug!(
                            "Collection {} not found, skipping {}",
                            spec.collection,
                            spec.name()
                        );
                        results.push(IndexResult::new(spec, IndexStatus::Skipped, None));
                        continue;
                    }
                    Err(e) => {
                        warn!("Could not probe {}: {}", spec.collection, e);
                        results.push(IndexResult::new(
                            spec,
                            IndexStatus::Failed,
                            Some(e.to_string()),
                        ));
                        continue;
                    }
                }
            }

            let result = match self.store.create_index(spec).await {
                Ok(IndexCreation::Created) => IndexResult::new(spec, IndexStatus::Created, None),
                Ok(IndexCreation::AlreadyExists) => {
                    IndexResult::new(spec, IndexStatus::AlreadyExists, None)
                }
                Err(e) => {
                    let e = match e {
                        MenuvaultError::IndexCreation { .. } => e,
                        other => MenuvaultError::IndexCreation {
                            collection: spec.collection.clone(),
                            name: spec.name().to_string(),
                            message: other.to_string(),
                        },
                    };
                    warn!("{}", e);
                    IndexResult::new(spec, IndexStatus::Failed, Some(e.to_string()))
                }
            };
            results.push(result);
        }

        let created = results
            .iter()
            .filter(|r| r.status == IndexStatus::Created)
            .count();
        let failed = results
            .iter()
            .filter(|r| r.status == IndexStatus::Failed)
            .count();
        info!(
            "Indexes: {} created, {} failed, {} requested",
            created,
            failed,
            specs.len()
        );
        results
    }
}
