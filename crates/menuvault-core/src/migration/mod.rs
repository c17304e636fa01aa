//! Asset migration engine.
//!
//! This module provides:
//! - The per-entity-type strategy table (`EntityType`, `FieldStrategy`)
//! - `MigrationOrchestrator`, which drives transfers and writes results back
//! - `MigrationLedger` accounting and the persisted `MigrationReport`
//! - The dual-confirmed `CleanupSweep` of the local uploads directory

mod cleanup;
mod entity;
mod ledger;
mod orchestrator;

pub use cleanup::{CleanupRequest, CleanupSummary, CleanupSweep};
pub use entity::{
    AssetField, AssetReference, EntityType, FieldSlot, FieldStrategy, MigratableEntity,
};
pub use ledger::{
    EntityTypeError, MigrationError, MigrationLedger, MigrationOutcome, MigrationReport, MigrationStats,
    OutcomeStatus,
};
pub use orchestrator::{MigrationOptions, MigrationOrchestrator, MigrationRun};
