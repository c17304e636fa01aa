//! Referential and format integrity checks.
//!
//! Each check runs independently; a check that cannot complete is reported
//! with status `error` and does not stop the rest of the battery.

use crate::error::{MenuvaultError, Result};
use crate::store::{DocumentStore, Filter, ID_FIELD};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::LazyLock;
use tracing::{info, warn};

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex must compile")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FindingStatus {
    Ok,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityFinding {
    pub check_name: String,
    pub description: String,
    pub issue_count: u64,
    pub status: FindingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

enum CheckKind {
    /// Documents of `collection` whose `field` does not resolve to an id in `target`.
    Orphans {
        collection: &'static str,
        field: &'static str,
        target: &'static str,
    },
    /// Documents of `parent` with no document in `child` referencing them via `field`.
    MissingChild {
        parent: &'static str,
        child: &'static str,
        field: &'static str,
    },
    /// Documents of `collection` whose `field` fails the email shape.
    InvalidEmail {
        collection: &'static str,
        field: &'static str,
    },
}

struct IntegrityCheck {
    name: &'static str,
    description: &'static str,
    kind: CheckKind,
}

static CHECKS: [IntegrityCheck; 6] = [
    IntegrityCheck {
        name: "orphanedRestaurants",
        description: "Restaurants whose owner is not a known user",
        kind: CheckKind::Orphans {
            collection: "restaurants",
            field: "owner",
            target: "users",
        },
    },
    IntegrityCheck {
        name: "orphanedMenus",
        description: "Menus whose restaurantId is not a known restaurant",
        kind: CheckKind::Orphans {
            collection: "menus",
            field: "restaurantId",
            target: "restaurants",
        },
    },
    IntegrityCheck {
        name: "orphanedMenuItems",
        description: "Menu items whose menuId is not a known menu",
        kind: CheckKind::Orphans {
            collection: "menuitems",
            field: "menuId",
            target: "menus",
        },
    },
    IntegrityCheck {
        name: "orphanedProfiles",
        description: "Profiles whose userId is not a known user",
        kind: CheckKind::Orphans {
            collection: "profiles",
            field: "userId",
            target: "users",
        },
    },
    IntegrityCheck {
        name: "usersWithoutProfiles",
        description: "Users with no profile",
        kind: CheckKind::MissingChild {
            parent: "users",
            child: "profiles",
            field: "userId",
        },
    },
    IntegrityCheck {
        name: "invalidEmails",
        description: "Users whose email is missing or malformed",
        kind: CheckKind::InvalidEmail {
            collection: "users",
            field: "email",
        },
    },
];

pub fn is_valid_email(email: &str) -> bool {
    EMAIL.is_match(email)
}

/// Scalar rendered the way `DocumentStore::distinct` renders keys.
fn key_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        _ => None,
    }
}

pub struct IntegrityValidator<'a> {
    store: &'a dyn DocumentStore,
}

impl<'a> IntegrityValidator<'a> {
    pub fn new(store: &'a dyn DocumentStore) -> Self {
        Self { store }
    }

    /// Run every check.
    pub async fn run_all(&self) -> Vec<IntegrityFinding> {
        let mut findings = Vec::with_capacity(CHECKS.len());
        for check in &CHECKS {
            let finding = match self.count_issues(&check.kind).await {
                Ok(issue_count) => {
                    let status = if issue_count == 0 {
                        FindingStatus::Ok
                    } else {
                        warn!("{}: {} issues", check.name, issue_count);
                        FindingStatus::Warning
                    };
                    IntegrityFinding {
                        check_name: check.name.to_string(),
                        description: check.description.to_string(),
                        issue_count,
                        status,
                        error: None,
                    }
                }
                Err(e) => {
                    let e = MenuvaultError::IntegrityCheck {
                        check: check.name.to_string(),
                        message: e.to_string(),
                    };
                    warn!("{}", e);
                    IntegrityFinding {
                        check_name: check.name.to_string(),
                        description: check.description.to_string(),
                        issue_count: 0,
                        status: FindingStatus::Error,
                        error: Some(e.to_string()),
                    }
                }
            };
            findings.push(finding);
        }

        let issues: u64 = findings.iter().map(|f| f.issue_count).sum();
        info!("Integrity validation complete: {} checks, {} issues", findings.len(), issues);
        findings
    }

    async fn count_issues(&self, kind: &CheckKind) -> Result<u64> {
        match *kind {
            CheckKind::Orphans {
                collection,
                field,
                target,
            } => {
                let known = self.store.distinct(target, ID_FIELD).await?;
                let documents = self.store.find(collection, &Filter::All).await?;
                Ok(documents
                    .iter()
                    .filter(|doc| {
                        key_string(doc.get(field)).map_or(true, |key| !known.contains(&key))
                    })
                    .count() as u64)
            }
            CheckKind::MissingChild {
                parent,
                child,
                field,
            } => {
                let referenced: BTreeSet<String> = self.store.distinct(child, field).await?;
                let parents = self.store.distinct(parent, ID_FIELD).await?;
                Ok(parents.difference(&referenced).count() as u64)
            }
            CheckKind::InvalidEmail { collection, field } => {
                let documents = self.store.find(collection, &Filter::All).await?;
                Ok(documents
                    .iter()
                    .filter(|doc| !doc.get_str(field).is_some_and(is_valid_email))
                    .count() as u64)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{
        Aggregation, CollectionStats, Document, GroupCount, IndexCreation, IndexSpec,
        SettingResult, SqliteDocumentStore,
    };
    use async_trait::async_trait;
    use serde_json::{json, Map};

    /// Store whose restaurant id lookup fails.
    struct BrokenRestaurants(SqliteDocumentStore);

    #[async_trait]
    impl DocumentStore for BrokenRestaurants {
        async fn find(&self, c: &str, f: &Filter) -> Result<Vec<Document>> {
            self.0.find(c, f).await
        }
        async fn distinct(&self, c: &str, field: &str) -> Result<BTreeSet<String>> {
            if c == "restaurants" && field == ID_FIELD {
                return Err(MenuvaultError::database("disk I/O error"));
            }
            self.0.distinct(c, field).await
        }
        async fn insert(&self, c: &str, d: Document) -> Result<()> {
            self.0.insert(c, d).await
        }
        async fn update_fields(&self, c: &str, id: &str, s: Map<String, Value>) -> Result<bool> {
            self.0.update_fields(c, id, s).await
        }
        async fn aggregate(&self, c: &str, a: &Aggregation) -> Result<Vec<GroupCount>> {
            self.0.aggregate(c, a).await
        }
        async fn create_index(&self, s: &IndexSpec) -> Result<IndexCreation> {
            self.0.create_index(s).await
        }
        async fn list_collections(&self) -> Result<Vec<String>> {
            self.0.list_collections().await
        }
        async fn collection_stats(&self, c: &str) -> Result<CollectionStats> {
            self.0.collection_stats(c).await
        }
        async fn apply_settings(&self) -> Result<Vec<SettingResult>> {
            self.0.apply_settings().await
        }
    }

    async fn seed(store: &SqliteDocumentStore, collection: &str, id: &str, body: Value) {
        store
            .insert(collection, Document::from_json(id, body))
            .await
            .unwrap();
    }

    fn finding<'f>(findings: &'f [IntegrityFinding], name: &str) -> &'f IntegrityFinding {
        findings.iter().find(|f| f.check_name == name).unwrap()
    }

    #[test]
    fn test_email_shape() {
        assert!(is_valid_email("chef@bistro.example"));
        assert!(!is_valid_email("chef@bistro"));
        assert!(!is_valid_email("chef bistro@x.io"));
        assert!(!is_valid_email(""));
    }

    #[tokio::test]
    async fn test_empty_store_is_clean() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let findings = IntegrityValidator::new(&store).run_all().await;
        assert_eq!(findings.len(), 6);
        assert!(findings.iter().all(|f| f.status == FindingStatus::Ok));
    }

    #[tokio::test]
    async fn test_orphans_and_missing_profiles() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        seed(&store, "users", "u1", json!({"email": "a@b.io"})).await;
        seed(&store, "users", "u2", json!({"email": "not-an-email"})).await;
        seed(&store, "profiles", "p1", json!({"userId": "u1"})).await;
        seed(&store, "profiles", "p2", json!({"userId": "ghost"})).await;
        seed(&store, "restaurants", "r1", json!({"owner": "u1"})).await;
        seed(&store, "menus", "m1", json!({"restaurantId": "r1"})).await;
        seed(&store, "menus", "m2", json!({"restaurantId": "r404"})).await;
        seed(&store, "menuitems", "i1", json!({"menuId": "m1"})).await;

        let findings = IntegrityValidator::new(&store).run_all().await;
        assert_eq!(finding(&findings, "orphanedRestaurants").issue_count, 0);

        let menus = finding(&findings, "orphanedMenus");
        assert_eq!(menus.issue_count, 1);
        assert_eq!(menus.status, FindingStatus::Warning);

        assert_eq!(finding(&findings, "orphanedMenuItems").issue_count, 0);
        assert_eq!(finding(&findings, "orphanedProfiles").issue_count, 1);
        assert_eq!(finding(&findings, "usersWithoutProfiles").issue_count, 1);
        assert_eq!(finding(&findings, "invalidEmails").issue_count, 1);
    }

    #[tokio::test]
    async fn test_missing_reference_counts_as_orphan() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        seed(&store, "menuitems", "i1", json!({"name": "Soup"})).await;
        let findings = IntegrityValidator::new(&store).run_all().await;
        assert_eq!(finding(&findings, "orphanedMenuItems").issue_count, 1);
    }

    #[tokio::test]
    async fn test_failing_check_does_not_stop_the_rest() {
        let inner = SqliteDocumentStore::open_in_memory().unwrap();
        seed(&inner, "users", "u1", json!({"email": "bad"})).await;
        seed(&inner, "menus", "m1", json!({"restaurantId": "r1"})).await;
        let store = BrokenRestaurants(inner);

        let findings = IntegrityValidator::new(&store).run_all().await;
        assert_eq!(findings.len(), 6);

        let menus = finding(&findings, "orphanedMenus");
        assert_eq!(menus.status, FindingStatus::Error);
        assert_eq!(menus.issue_count, 0);
        assert!(menus.error.as_deref().unwrap().contains("disk I/O error"));

        assert!(findings
            .iter()
            .filter(|f| f.check_name != "orphanedMenus")
            .all(|f| f.status != FindingStatus::Error && f.error.is_none()));
        assert_eq!(finding(&findings, "invalidEmails").issue_count, 1);
        assert_eq!(finding(&findings, "usersWithoutProfiles").issue_count, 1);
    }
}
