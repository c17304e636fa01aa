//! Database maintenance run.
//!
//! Steps run in a fixed order, each one skippable:
//! settings, ordinary indexes, TTL indexes and expiry, collection statistics,
//! query analysis, integrity validation, report artifact. Statistics are
//! always gathered so every report carries them.

use super::indexes::IndexManager;
use super::integrity::IntegrityValidator;
use super::report::{OptimizationReport, QuerySample};
use crate::config::OptimizerConfig;
use crate::error::Result;
use crate::store::{Aggregation, DocumentStore, SettingResult};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing::{info, warn};

/// Query shapes sampled for the report: (name, collection, group-by field).
const QUERY_SAMPLES: [(&str, &str, &str); 3] = [
    ("menusPerRestaurant", "menus", "restaurantId"),
    ("itemsPerCategory", "menuitems", "category"),
    ("restaurantsPerCuisine", "restaurants", "cuisine"),
];

/// Settings row carrying the number of documents expired by TTL indexes.
pub const TTL_PURGE_SETTING: &str = "ttlPurge";

#[derive(Debug, Clone, Default)]
pub struct OptimizerOptions {
    pub skip_indexes: bool,
    pub skip_analysis: bool,
    pub skip_settings: bool,
    pub skip_ttl: bool,
    pub skip_validation: bool,
    /// Directory for the report artifact; `None` skips writing it.
    pub reports_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct OptimizerRun {
    pub report: OptimizationReport,
    pub report_path: Option<PathBuf>,
}

pub struct Optimizer<'a> {
    store: &'a dyn DocumentStore,
}

impl<'a> Optimizer<'a> {
    pub fn new(store: &'a dyn DocumentStore) -> Self {
        Self { store }
    }

    pub async fn run(&self, options: &OptimizerOptions) -> Result<OptimizerRun> {
        let started_at = Utc::now();

        let mut settings = if options.skip_settings {
            Vec::new()
        } else {
            info!("Applying store settings");
            self.apply_settings().await
        };

        let mut index_results = Vec::new();
        let manager = IndexManager::new(self.store);
        if !options.skip_indexes {
            info!("Creating indexes");
            index_results.extend(manager.create_all().await);
        }
        if !options.skip_ttl {
            info!("Creating TTL indexes");
            index_results.extend(manager.create_ttl().await);
            settings.push(self.purge_expired(started_at).await);
        }

        info!("Collecting collection statistics");
        let mut collection_stats = Vec::new();
        for collection in self.store.list_collections().await? {
            match self.store.collection_stats(&collection).await {
                Ok(stats) => collection_stats.push(stats),
                Err(e) => warn!("Statistics unavailable for {}: {}", collection, e),
            }
        }

        let query_analysis = if options.skip_analysis {
            Vec::new()
        } else {
            info!("Sampling query shapes");
            self.sample_queries().await
        };

        let integrity_findings = if options.skip_validation {
            Vec::new()
        } else {
            info!("Validating data integrity");
            IntegrityValidator::new(self.store).run_all().await
        };

        let report = OptimizationReport::compose(
            started_at,
            collection_stats,
            index_results,
            settings,
            query_analysis,
            integrity_findings,
        );
        for recommendation in &report.recommendations {
            info!("Recommendation for {}: {}", recommendation.collection, recommendation.message);
        }

        let report_path = match &options.reports_dir {
            Some(dir) => Some(report.write(dir, started_at)?),
            None => None,
        };

        Ok(OptimizerRun {
            report,
            report_path,
        })
    }

    async fn apply_settings(&self) -> Vec<SettingResult> {
        match self.store.apply_settings().await {
            Ok(results) => {
                for r in results.iter().filter(|r| !r.applied) {
                    warn!("Setting {} not applied: {}", r.name, r.error.as_deref().unwrap_or(""));
                }
                results
            }
            Err(e) => {
                warn!("Settings could not be applied: {}", e);
                vec![SettingResult {
                    name: "settings".to_string(),
                    value: String::new(),
                    applied: false,
                    error: Some(e.to_string()),
                }]
            }
        }
    }

    /// Expire documents under the TTL indexes, reported as a setting row.
    async fn purge_expired(&self, now: DateTime<Utc>) -> SettingResult {
        match self.store.purge_expired(now).await {
            Ok(purged) => {
                info!("Expired {} documents", purged);
                SettingResult {
                    name: TTL_PURGE_SETTING.to_string(),
                    value: purged.to_string(),
                    applied: true,
                    error: None,
                }
            }
            Err(e) => {
                warn!("TTL expiry failed: {}", e);
                SettingResult {
                    name: TTL_PURGE_SETTING.to_string(),
                    value: String::new(),
                    applied: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn sample_queries(&self) -> Vec<QuerySample> {
        let mut samples = Vec::with_capacity(QUERY_SAMPLES.len());
        for (name, collection, group_by) in QUERY_SAMPLES {
            let aggregation = Aggregation::GroupCount {
                group_by: group_by.to_string(),
                limit: OptimizerConfig::QUERY_SAMPLE_LIMIT,
            };
            let (results, error) = match self.store.aggregate(collection, &aggregation).await {
                Ok(results) => (results, None),
                Err(e) => {
                    warn!("Query sample {} failed: {}", name, e);
                    (Vec::new(), Some(e.to_string()))
                }
            };
            samples.push(QuerySample {
                name: name.to_string(),
                collection: collection.to_string(),
                group_by: group_by.to_string(),
                results,
                error,
            });
        }
        samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Document, SqliteDocumentStore};
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_query_samples_are_top_groups() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        for (i, cuisine) in ["thai", "thai", "french"].iter().enumerate() {
            store
                .insert(
                    "restaurants",
                    Document::from_json(format!("r{}", i), json!({"cuisine": cuisine})),
                )
                .await
                .unwrap();
        }

        let run = Optimizer::new(&store)
            .run(&OptimizerOptions {
                skip_indexes: true,
                skip_ttl: true,
                skip_settings: true,
                skip_validation: true,
                ..OptimizerOptions::default()
            })
            .await
            .unwrap();

        let cuisine = run
            .report
            .query_analysis
            .iter()
            .find(|s| s.name == "restaurantsPerCuisine")
            .unwrap();
        assert_eq!(cuisine.results[0].key, json!("thai"));
        assert_eq!(cuisine.results[0].count, 2);
        assert!(run.report_path.is_none());
    }

    #[tokio::test]
    async fn test_ttl_step_expires_documents() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        for (id, expires_at) in [("old", "2020-01-01T00:00:00Z"), ("live", "2999-01-01T00:00:00Z")] {
            store
                .insert("sessions", Document::from_json(id, json!({"expiresAt": expires_at})))
                .await
                .unwrap();
        }
        let options = OptimizerOptions {
            skip_indexes: true,
            skip_settings: true,
            skip_analysis: true,
            skip_validation: true,
            ..OptimizerOptions::default()
        };

        let first = Optimizer::new(&store).run(&options).await.unwrap();
        let purge = first
            .report
            .settings
            .iter()
            .find(|s| s.name == TTL_PURGE_SETTING)
            .unwrap();
        assert!(purge.applied);
        assert_eq!(purge.value, "1");
        let left = store.distinct("sessions", "_id").await.unwrap();
        assert_eq!(left.into_iter().collect::<Vec<_>>(), vec!["live"]);

        let second = Optimizer::new(&store).run(&options).await.unwrap();
        assert!(second
            .report
            .settings
            .iter()
            .any(|s| s.name == TTL_PURGE_SETTING && s.value == "0"));
    }

    #[tokio::test]
    async fn test_skip_ttl_leaves_expired_documents() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        store
            .insert("sessions", Document::from_json("old", json!({"expiresAt": "2020-01-01T00:00:00Z"})))
            .await
            .unwrap();

        let run = Optimizer::new(&store)
            .run(&OptimizerOptions {
                skip_ttl: true,
                skip_settings: true,
                ..OptimizerOptions::default()
            })
            .await
            .unwrap();

        assert!(run.report.settings.is_empty());
        assert_eq!(store.distinct("sessions", "_id").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_full_run_writes_report() {
        let temp = TempDir::new().unwrap();
        let store = SqliteDocumentStore::create(temp.path().join("menuvault.db"))
            .await
            .unwrap();
        store
            .insert("users", Document::from_json("u1", json!({"email": "a@b.io"})))
            .await
            .unwrap();

        let reports_dir = temp.path().join("reports");
        let run = Optimizer::new(&store)
            .run(&OptimizerOptions {
                reports_dir: Some(reports_dir.clone()),
                ..OptimizerOptions::default()
            })
            .await
            .unwrap();

        assert!(!run.report.settings.is_empty());
        assert!(!run.report.index_results.is_empty());
        assert_eq!(run.report.integrity_findings.len(), 6);
        assert_eq!(run.report.query_analysis.len(), 3);

        let path = run.report_path.unwrap();
        assert!(path.starts_with(&reports_dir));
        assert!(path
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("optimization-report-"));
        store.close().await.unwrap();
    }
}
