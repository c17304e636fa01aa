//! Menuvault Core - maintenance pipeline for the Menuvault restaurant platform.
//!
//! This crate provides the asset-migration engine, which moves media
//! references from the local uploads directory to a remote content store,
//! and the database maintenance engine, which manages indexes and TTL
//! policies and runs integrity checks. Both produce JSON report artifacts.
//!
//! # Example
//!
//! ```rust,ignore
//! use menuvault_core::{
//!     AssetTransfer, CloudinaryCredentials, CloudinaryUploader, MigrationOptions,
//!     MigrationOrchestrator, SqliteDocumentStore, TransferSettings,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> menuvault_core::Result<()> {
//!     let store = SqliteDocumentStore::connect("menuvault.db").await?;
//!     let credentials = CloudinaryCredentials::new(
//!         std::env::var("CLOUDINARY_CLOUD_NAME").ok(),
//!         std::env::var("CLOUDINARY_API_KEY").ok(),
//!         std::env::var("CLOUDINARY_API_SECRET").ok(),
//!     )?;
//!     let transfer = AssetTransfer::new(
//!         Arc::new(CloudinaryUploader::new(credentials)?),
//!         TransferSettings::new("uploads"),
//!     );
//!
//!     let run = MigrationOrchestrator::new(&store, &transfer)
//!         .run(&MigrationOptions::default())
//!         .await?;
//!     println!("{} migrated, {} failed", run.stats.migrated, run.stats.failed);
//!
//!     store.close().await
//! }
//! ```

pub mod asset;
pub mod config;
pub mod error;
pub mod maintenance;
pub mod migration;
pub mod reports;
pub mod store;

pub use asset::{
    AssetTransfer, AssetUploader, CloudinaryCredentials, CloudinaryUploader, IdentifierStrategy,
    RemoteDescriptor, TransferSettings,
};
pub use error::{MenuvaultError, Result};
pub use maintenance::{
    IndexManager, IntegrityFinding, IntegrityValidator, OptimizationReport, Optimizer,
    OptimizerOptions, OptimizerRun,
};
pub use migration::{
    CleanupRequest, CleanupSummary, EntityType, MigrationOptions, MigrationOrchestrator,
    MigrationReport, MigrationRun, MigrationStats,
};
pub use store::{Document, DocumentStore, Filter, SqliteDocumentStore};
