//! Migration orchestrator.
//!
//! # Algorithm
//!
//! For each selected entity type, in table order:
//!
//! 1. **Fetch**: load every entity with at least one populated asset field
//! 2. **Transfer**: per reference, skip remote URLs, upload local files
//! 3. **Write back**: if anything was uploaded, rewrite the migrated fields
//!    and the canonical field in one update of that entity
//! 4. **Record**: commit the entity's outcomes to the ledger
//!
//! Failures are isolated per reference, and a failed write-back only affects
//! its own entity. A type whose fetch fails is skipped and recorded unless the
//! error is fatal. Once every type is processed the optional cleanup sweep
//! runs.

use super::cleanup::{CleanupRequest, CleanupSummary, CleanupSweep};
use super::entity::{AssetField, EntityType, FieldSlot, MigratableEntity};
use super::ledger::{
    EntityTypeError, MigrationLedger, MigrationOutcome, MigrationReport, MigrationStats,
    OutcomeStatus,
};
use crate::asset::{AssetTransfer, RemoteDescriptor, TransferPlan};
use crate::error::{MenuvaultError, Result};
use crate::store::{Document, DocumentStore};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Options for one migration run.
#[derive(Debug, Clone)]
pub struct MigrationOptions {
    pub dry_run: bool,
    pub entity_types: Vec<EntityType>,
    pub cleanup: CleanupRequest,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            entity_types: EntityType::ALL.to_vec(),
            cleanup: CleanupRequest::default(),
        }
    }
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct MigrationRun {
    pub started_at: DateTime<Utc>,
    pub dry_run: bool,
    pub entity_types: Vec<EntityType>,
    pub stats: MigrationStats,
    pub outcomes: Vec<MigrationOutcome>,
    /// Types skipped because their entities could not be fetched.
    pub type_errors: Vec<EntityTypeError>,
    pub cleanup: CleanupSummary,
}

impl MigrationRun {
    pub fn report(&self) -> MigrationReport {
        MigrationReport::new(
            self.started_at,
            self.dry_run,
            self.entity_types.clone(),
            self.stats.clone(),
            self.outcomes.clone(),
            self.type_errors.clone(),
            self.cleanup.executed.then(|| self.cleanup.clone()),
        )
    }

    /// Persist the run's report under `dir`.
    pub fn write_report(&self, dir: &Path) -> Result<PathBuf> {
        self.report().write(dir, self.started_at)
    }
}

/// An outcome waiting for its entity's write-back.
struct Pending {
    field: AssetField,
    outcome: MigrationOutcome,
    /// Set when this run uploaded the asset.
    uploaded: Option<RemoteDescriptor>,
}

pub struct MigrationOrchestrator<'a> {
    store: &'a dyn DocumentStore,
    transfer: &'a AssetTransfer,
}

impl<'a> MigrationOrchestrator<'a> {
    pub fn new(store: &'a dyn DocumentStore, transfer: &'a AssetTransfer) -> Self {
        Self { store, transfer }
    }

    pub async fn run(&self, options: &MigrationOptions) -> Result<MigrationRun> {
        let started_at = Utc::now();
        let mut ledger = MigrationLedger::new();

        if options.dry_run {
            info!("Dry run: no uploads and no entity updates will be made");
        }

        for &entity_type in &options.entity_types {
            if let Err(e) = self
                .migrate_type(entity_type, options.dry_run, &mut ledger)
                .await
            {
                if e.is_fatal() {
                    return Err(e);
                }
                warn!("Skipping {}: {}", entity_type, e);
                ledger.record_type_error(entity_type, &e);
            }
        }

        let (stats, outcomes, type_errors) = ledger.into_parts();
        info!(
            "Migration complete: {} total, {} migrated, {} skipped, {} failed ({:.1}% success)",
            stats.total_files,
            stats.migrated,
            stats.skipped,
            stats.failed,
            stats.success_rate()
        );

        let cleanup = CleanupSweep::new(&self.transfer.settings().uploads_root)
            .run(options.cleanup, options.dry_run, stats.failed > 0)
            .await?;

        Ok(MigrationRun {
            started_at,
            dry_run: options.dry_run,
            entity_types: options.entity_types.clone(),
            stats,
            outcomes,
            type_errors,
            cleanup,
        })
    }

    async fn migrate_type(
        &self,
        entity_type: EntityType,
        dry_run: bool,
        ledger: &mut MigrationLedger,
    ) -> Result<()> {
        let strategy = entity_type.strategy();
        let documents = self
            .store
            .find(strategy.collection, &strategy.filter())
            .await?;
        info!("Migrating {}: {} entities with assets", entity_type, documents.len());

        for document in &documents {
            let entity = MigratableEntity::from_document(entity_type, document);
            let pending = self.transfer_entity(&entity, dry_run).await;
            let pending = if dry_run {
                pending
            } else {
                self.write_back(&entity, document, pending).await
            };
            for p in pending {
                ledger.record(p.outcome);
            }
        }
        Ok(())
    }

    async fn transfer_entity(&self, entity: &MigratableEntity, dry_run: bool) -> Vec<Pending> {
        let mut pending = Vec::with_capacity(entity.asset_fields.len());

        for field in &entity.asset_fields {
            let locator = field.reference.source_locator.as_str();
            let mut outcome = MigrationOutcome {
                entity_type: entity.entity_type,
                entity_id: entity.id.clone(),
                entity: entity.display_name.clone(),
                field: field.label(),
                source_locator: locator.to_string(),
                status: OutcomeStatus::Skipped,
                remote_descriptor: None,
                error_message: None,
            };
            let mut uploaded = None;

            match self.transfer.plan(locator).await {
                Ok(TransferPlan::AlreadyRemote(descriptor)) => {
                    debug!("{} {}: already remote", entity.display_name, outcome.field);
                    outcome.remote_descriptor =
                        Some(field.reference.remote_descriptor.clone().unwrap_or(descriptor));
                }
                Ok(TransferPlan::Upload(path)) if dry_run => {
                    debug!("{} {}: would upload {}", entity.display_name, outcome.field, path.display());
                    outcome.status = OutcomeStatus::Migrated;
                }
                Ok(TransferPlan::Upload(path)) => {
                    match self
                        .transfer
                        .upload_file(&path, entity.entity_type.as_str(), &entity.id)
                        .await
                    {
                        Ok(descriptor) => {
                            debug!("{} {}: uploaded as {}", entity.display_name, outcome.field, descriptor.public_id);
                            outcome.status = OutcomeStatus::Migrated;
                            outcome.remote_descriptor = Some(descriptor.clone());
                            uploaded = Some(descriptor);
                        }
                        Err(e) => Self::fail(&mut outcome, &e),
                    }
                }
                Err(e) => Self::fail(&mut outcome, &e),
            }

            pending.push(Pending {
                field: field.clone(),
                outcome,
                uploaded,
            });
        }
        pending
    }

    fn fail(outcome: &mut MigrationOutcome, error: &MenuvaultError) {
        warn!("Failed to migrate {} {}: {}", outcome.entity, outcome.field, error);
        outcome.status = OutcomeStatus::Failed;
        outcome.remote_descriptor = None;
        outcome.error_message = Some(error.to_string());
    }

    /// Persist uploaded descriptors. On failure the fresh uploads are discarded
    /// and their outcomes turned into failures.
    async fn write_back(
        &self,
        entity: &MigratableEntity,
        document: &Document,
        mut pending: Vec<Pending>,
    ) -> Vec<Pending> {
        if pending.iter().all(|p| p.uploaded.is_none()) {
            return pending;
        }

        let collection = entity.entity_type.collection();
        let written = match self.build_update(entity, document, &pending) {
            Ok(set) => self.store.update_fields(collection, &entity.id, set).await,
            Err(e) => Err(e),
        };
        let error = match written {
            Ok(true) => {
                debug!("Updated {} {}", collection, entity.id);
                return pending;
            }
            Ok(false) => MenuvaultError::database(format!(
                "{} {} no longer exists",
                collection, entity.id
            )),
            Err(e) => e,
        };

        warn!("Write-back failed for {} {}: {}", collection, entity.id, error);
        let message = format!("Write-back failed: {}", error);
        for p in pending.iter_mut() {
            let Some(descriptor) = p.uploaded.take() else {
                continue;
            };
            if let Err(e) = self.transfer.discard(&descriptor.public_id).await {
                warn!("Could not discard {}: {}", descriptor.public_id, e);
            }
            p.outcome.status = OutcomeStatus::Failed;
            p.outcome.remote_descriptor = None;
            p.outcome.error_message = Some(message.clone());
        }
        pending
    }

    /// Field updates for one entity: migrated fields become descriptor
    /// objects, list fields are rewritten element-wise, and the canonical
    /// field mirrors the first single-value field migrated in this pass.
    fn build_update(
        &self,
        entity: &MigratableEntity,
        document: &Document,
        pending: &[Pending],
    ) -> Result<Map<String, Value>> {
        let strategy = entity.entity_type.strategy();
        let mut set = Map::new();

        for p in pending {
            let Some(descriptor) = &p.uploaded else {
                continue;
            };
            let value = serde_json::to_value(descriptor)?;
            match p.field.slot {
                FieldSlot::Single => {
                    set.insert(p.field.field.to_string(), value);
                }
                FieldSlot::Element(i) => {
                    let list = set.entry(p.field.field.to_string()).or_insert_with(|| {
                        document
                            .get(p.field.field)
                            .cloned()
                            .unwrap_or_else(|| Value::Array(Vec::new()))
                    });
                    if let Some(slot) = list.as_array_mut().and_then(|a| a.get_mut(i)) {
                        *slot = value;
                    }
                }
            }
        }

        let canonical = strategy.single_fields.iter().find_map(|&field| {
            pending
                .iter()
                .filter(|p| p.field.field == field && p.field.slot == FieldSlot::Single)
                .find_map(|p| p.uploaded.as_ref().map(|d| d.url.clone()))
        });
        if let Some(url) = canonical {
            set.insert(strategy.canonical_field.to_string(), Value::String(url));
        }

        Ok(set)
    }
}
