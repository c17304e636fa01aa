//! Run-scoped migration accounting.

use super::cleanup::CleanupSummary;
use super::entity::EntityType;
use crate::asset::RemoteDescriptor;
use crate::config::ReportConfig;
use crate::error::{MenuvaultError, Result};
use crate::reports;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutcomeStatus {
    Migrated,
    Skipped,
    Failed,
}

/// Terminal result for one asset reference in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationOutcome {
    pub entity_type: EntityType,
    pub entity_id: String,
    /// Display name of the owning entity.
    pub entity: String,
    /// Field label, e.g. `logo` or `gallery[1]`.
    pub field: String,
    pub source_locator: String,
    pub status: OutcomeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_descriptor: Option<RemoteDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationError {
    pub file: String,
    pub entity: String,
    pub error: String,
}

/// An entity type whose records could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityTypeError {
    pub entity_type: EntityType,
    pub error: String,
}

/// Counters for one run. `total_files == migrated + failed + skipped` always holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationStats {
    pub total_files: u64,
    pub migrated: u64,
    pub failed: u64,
    pub skipped: u64,
    pub errors: Vec<MigrationError>,
}

impl MigrationStats {
    /// Percentage of assets migrated; 0 for an empty run.
    pub fn success_rate(&self) -> f64 {
        if self.total_files == 0 {
            0.0
        } else {
            self.migrated as f64 / self.total_files as f64 * 100.0
        }
    }
}

/// Accumulates outcomes for a single run.
#[derive(Debug, Default)]
pub struct MigrationLedger {
    stats: MigrationStats,
    outcomes: Vec<MigrationOutcome>,
    type_errors: Vec<EntityTypeError>,
}

impl MigrationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: MigrationOutcome) {
        self.stats.total_files += 1;
        match outcome.status {
            OutcomeStatus::Migrated => self.stats.migrated += 1,
            OutcomeStatus::Skipped => self.stats.skipped += 1,
            OutcomeStatus::Failed => {
                self.stats.failed += 1;
                self.stats.errors.push(MigrationError {
                    file: outcome.source_locator.clone(),
                    entity: outcome.entity.clone(),
                    error: outcome.error_message.clone().unwrap_or_default(),
                });
            }
        }
        self.outcomes.push(outcome);
    }

    /// Note a type that was skipped because its entities could not be fetched.
    pub fn record_type_error(&mut self, entity_type: EntityType, error: &MenuvaultError) {
        self.type_errors.push(EntityTypeError {
            entity_type,
            error: error.to_string(),
        });
    }

    pub fn into_parts(self) -> (MigrationStats, Vec<MigrationOutcome>, Vec<EntityTypeError>) {
        (self.stats, self.outcomes, self.type_errors)
    }
}

/// Persisted summary of a migration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub timestamp: String,
    pub run_type: String,
    pub dry_run: bool,
    pub entity_types: Vec<EntityType>,
    pub stats: MigrationStats,
    pub success_rate: f64,
    pub outcomes: Vec<MigrationOutcome>,
    #[serde(default)]
    pub type_errors: Vec<EntityTypeError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup: Option<CleanupSummary>,
}

impl MigrationReport {
    pub fn new(
        at: DateTime<Utc>,
        dry_run: bool,
        entity_types: Vec<EntityType>,
        stats: MigrationStats,
        outcomes: Vec<MigrationOutcome>,
        type_errors: Vec<EntityTypeError>,
        cleanup: Option<CleanupSummary>,
    ) -> Self {
        Self {
            timestamp: at.to_rfc3339(),
            run_type: ReportConfig::MIGRATION_RUN_TYPE.to_string(),
            dry_run,
            entity_types,
            success_rate: stats.success_rate(),
            stats,
            outcomes,
            type_errors,
            cleanup,
        }
    }

    /// Write `migration-report-<timestamp>.json` under `dir`.
    pub fn write(&self, dir: &Path, at: DateTime<Utc>) -> Result<PathBuf> {
        let path = reports::write_report(dir, ReportConfig::MIGRATION_RUN_TYPE, at, self)?;
        info!("Migration report written to {}", path.display());
        Ok(path)
    }
}
