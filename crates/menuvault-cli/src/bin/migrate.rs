//! Menuvault asset migration.
//!
//! Moves image references from the local uploads directory to Cloudinary
//! and writes a `migration-report-<timestamp>.json` artifact.

use anyhow::Result;
use clap::Parser;
use menuvault_cli::{close_store, connect_store, init_logging, CommonArgs};
use menuvault_core::config::{MigrationConfig, ReportConfig};
use menuvault_core::migration::MigrationReport;
use menuvault_core::reports::latest_report;
use menuvault_core::{
    AssetTransfer, CleanupRequest, CloudinaryCredentials, CloudinaryUploader, EntityType,
    IdentifierStrategy, MigrationOptions, MigrationOrchestrator, TransferSettings,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "menuvault-migrate")]
#[command(about = "Migrate local image uploads to Cloudinary")]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Report what would be migrated without uploading or updating anything
    #[arg(long)]
    dry_run: bool,

    /// Comma-separated entity types: restaurants, menus, menuItems, profiles
    #[arg(long, default_value = "restaurants,menus,menuItems,profiles")]
    types: String,

    /// Delete local files after migration (requires --cleanup-confirm)
    #[arg(long)]
    cleanup: bool,

    /// Confirm --cleanup
    #[arg(long)]
    cleanup_confirm: bool,

    /// Local uploads directory
    #[arg(long, env = "MENUVAULT_UPLOADS_DIR", default_value = MigrationConfig::DEFAULT_UPLOADS_DIR)]
    uploads_dir: PathBuf,

    /// Cloudinary cloud name
    #[arg(long, env = "CLOUDINARY_CLOUD_NAME")]
    cloud_name: Option<String>,

    /// Cloudinary API key
    #[arg(long, env = "CLOUDINARY_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Cloudinary API secret
    #[arg(long, env = "CLOUDINARY_API_SECRET", hide_env_values = true)]
    api_secret: Option<String>,

    /// Derive public ids from file content so identical files share one asset
    #[arg(long)]
    content_hash_ids: bool,
}

impl Args {
    fn migration_options(&self) -> menuvault_core::Result<MigrationOptions> {
        Ok(MigrationOptions {
            dry_run: self.dry_run,
            entity_types: EntityType::parse_list(&self.types)?,
            cleanup: CleanupRequest {
                cleanup: self.cleanup,
                confirm: self.cleanup_confirm,
            },
        })
    }

    fn transfer_settings(&self) -> TransferSettings {
        let identifier = if self.content_hash_ids {
            IdentifierStrategy::ContentHash
        } else {
            IdentifierStrategy::Timestamped
        };
        TransferSettings::new(&self.uploads_dir).with_identifier(identifier)
    }
}

/// Log the outcome of the last recorded migration, if any.
fn previous_migration(reports_dir: &Path) -> Option<MigrationReport> {
    match latest_report::<MigrationReport>(reports_dir, ReportConfig::MIGRATION_RUN_TYPE) {
        Ok(Some(previous)) => {
            info!(
                "Previous migration at {}: {} migrated, {} skipped, {} failed",
                previous.timestamp,
                previous.stats.migrated,
                previous.stats.skipped,
                previous.stats.failed
            );
            Some(previous)
        }
        Ok(None) => None,
        Err(e) => {
            warn!("Could not read the previous migration report: {}", e);
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.common.debug);

    info!("Starting Menuvault asset migration");
    let options = args.migration_options()?;
    previous_migration(&args.common.reports_dir);
    let credentials = CloudinaryCredentials::new(
        args.cloud_name.clone(),
        args.api_key.clone(),
        args.api_secret.clone(),
    )?;
    let transfer = AssetTransfer::new(
        Arc::new(CloudinaryUploader::new(credentials)?),
        args.transfer_settings(),
    );

    let store = connect_store(&args.common).await?;
    let result = MigrationOrchestrator::new(&store, &transfer)
        .run(&options)
        .await;
    close_store(store).await;
    let run = result?;

    run.write_report(&args.common.reports_dir)?;
    if run.stats.failed > 0 {
        warn!("{} assets failed to migrate; see the report for details", run.stats.failed);
    }
    for type_error in &run.type_errors {
        warn!("{} were not migrated: {}", type_error.entity_type, type_error.error);
    }
    info!(
        "Done: {} migrated, {} skipped, {} failed",
        run.stats.migrated, run.stats.skipped, run.stats.failed
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["menuvault-migrate", "--database", "menuvault.db"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults_select_every_type() {
        let args = parse(&[]);
        let options = args.migration_options().unwrap();
        assert!(!options.dry_run);
        assert_eq!(options.entity_types, EntityType::ALL.to_vec());
        assert!(!options.cleanup.is_confirmed());
    }

    #[test]
    fn test_flags() {
        let args = parse(&[
            "--dry-run",
            "--types",
            "menus,profiles",
            "--cleanup",
            "--cleanup-confirm",
            "--content-hash-ids",
        ]);
        let options = args.migration_options().unwrap();
        assert!(options.dry_run);
        assert_eq!(options.entity_types, vec![EntityType::Menus, EntityType::Profiles]);
        assert!(options.cleanup.is_confirmed());
        assert_eq!(args.transfer_settings().identifier, IdentifierStrategy::ContentHash);
    }

    #[test]
    fn test_previous_migration_reads_latest_report() {
        let temp = tempfile::TempDir::new().unwrap();
        assert!(previous_migration(temp.path()).is_none());

        let at = chrono::Utc::now();
        let report = MigrationReport::new(
            at,
            false,
            EntityType::ALL.to_vec(),
            Default::default(),
            Vec::new(),
            Vec::new(),
            None,
        );
        report.write(temp.path(), at).unwrap();
        std::fs::write(temp.path().join("optimization-report-x.json"), "not json").unwrap();

        let previous = previous_migration(temp.path()).unwrap();
        assert!(!previous.dry_run);
        assert_eq!(previous.entity_types, EntityType::ALL.to_vec());
    }

    #[test]
    fn test_every_flag_has_help() {
        use clap::CommandFactory;
        let command = Args::command();
        let undocumented: Vec<_> = command
            .get_arguments()
            .filter(|arg| arg.get_help().is_none())
            .map(|arg| arg.get_id().to_string())
            .collect();
        assert!(undocumented.is_empty(), "undocumented flags: {:?}", undocumented);
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let args = parse(&["--types", "restaurants,dishes"]);
        assert!(args.migration_options().is_err());
    }
}
