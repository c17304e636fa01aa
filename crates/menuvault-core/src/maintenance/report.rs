//! Optimization report composition.

use super::indexes::IndexResult;
use super::integrity::IntegrityFinding;
use crate::config::{OptimizerConfig, ReportConfig};
use crate::error::Result;
use crate::reports;
use crate::store::{CollectionStats, GroupCount, SettingResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// One representative query shape and its top groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySample {
    pub name: String,
    pub collection: String,
    pub group_by: String,
    pub results: Vec<GroupCount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecommendationKind {
    LargeDocuments,
    IndexOverhead,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub kind: RecommendationKind,
    pub collection: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationReport {
    pub timestamp: String,
    pub collection_stats: Vec<CollectionStats>,
    pub index_results: Vec<IndexResult>,
    pub settings: Vec<SettingResult>,
    pub query_analysis: Vec<QuerySample>,
    pub integrity_findings: Vec<IntegrityFinding>,
    pub recommendations: Vec<Recommendation>,
}

/// Threshold-based recommendations for the given statistics.
pub fn recommendations(stats: &[CollectionStats]) -> Vec<Recommendation> {
    let mut out = Vec::new();
    for s in stats {
        if s.avg_obj_size > OptimizerConfig::LARGE_DOCUMENT_BYTES {
            out.push(Recommendation {
                kind: RecommendationKind::LargeDocuments,
                collection: s.name.clone(),
                message: format!(
                    "Average document size is {:.1} KiB; consider moving large or embedded data out of {}",
                    s.avg_obj_size / 1024.0,
                    s.name
                ),
            });
        }
        let storage = s.storage_size as f64;
        if storage > 0.0
            && s.total_index_size as f64 > storage * OptimizerConfig::INDEX_OVERHEAD_RATIO
        {
            out.push(Recommendation {
                kind: RecommendationKind::IndexOverhead,
                collection: s.name.clone(),
                message: format!(
                    "Indexes use {} bytes against {} bytes of data; review unused indexes on {}",
                    s.total_index_size, s.storage_size, s.name
                ),
            });
        }
    }
    out
}

impl OptimizationReport {
    /// Compose a report, deriving recommendations from `collection_stats`.
    pub fn compose(
        at: DateTime<Utc>,
        collection_stats: Vec<CollectionStats>,
        index_results: Vec<IndexResult>,
        settings: Vec<SettingResult>,
        query_analysis: Vec<QuerySample>,
        integrity_findings: Vec<IntegrityFinding>,
    ) -> Self {
        Self {
            timestamp: at.to_rfc3339(),
            recommendations: recommendations(&collection_stats),
            collection_stats,
            index_results,
            settings,
            query_analysis,
            integrity_findings,
        }
    }

    /// Write `optimization-report-<timestamp>.json` under `dir`.
    pub fn write(&self, dir: &Path, at: DateTime<Utc>) -> Result<PathBuf> {
        let path = reports::write_report(dir, ReportConfig::OPTIMIZATION_RUN_TYPE, at, self)?;
        info!("Optimization report written to {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(name: &str, count: u64, storage: u64, index: u64) -> CollectionStats {
        CollectionStats {
            name: name.into(),
            count,
            avg_obj_size: if count == 0 { 0.0 } else { storage as f64 / count as f64 },
            storage_size: storage,
            index_count: 1,
            total_index_size: index,
        }
    }

    #[test]
    fn test_thresholds() {
        let recs = recommendations(&[
            stats("menus", 2, 40 * 1024, 1024),
            stats("users", 10, 10_000, 5_001),
            stats("menuitems", 10, 10_000, 5_000),
            stats("empty", 0, 0, 64),
        ]);
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].kind, RecommendationKind::LargeDocuments);
        assert_eq!(recs[0].collection, "menus");
        assert_eq!(recs[1].kind, RecommendationKind::IndexOverhead);
        assert_eq!(recs[1].collection, "users");
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let report = OptimizationReport::compose(
            Utc::now(),
            vec![stats("menus", 1, 100, 10)],
            vec![],
            vec![],
            vec![],
            vec![],
        );
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["collectionStats"][0]["avgObjSize"], 100.0);
        assert!(value["indexResults"].as_array().unwrap().is_empty());
        assert!(value.get("integrityFindings").is_some());
    }
}
