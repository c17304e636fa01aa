//! Shared plumbing for the Menuvault command-line tools.

use clap::Args;
use menuvault_core::config::ReportConfig;
use menuvault_core::SqliteDocumentStore;
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Options common to both tools.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Path to the document store database
    #[arg(long, env = "MENUVAULT_DATABASE")]
    pub database: PathBuf,

    /// Directory report artifacts are written to
    #[arg(long, env = "MENUVAULT_REPORTS_DIR", default_value = ReportConfig::DEFAULT_REPORTS_DIR)]
    pub reports_dir: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,
}

/// Install the global subscriber: compact output, DEBUG with `--debug`, INFO otherwise.
pub fn init_logging(debug: bool) {
    let log_level = if debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();
}

/// Open the store named by `args`. A missing database is a connection error.
pub async fn connect_store(args: &CommonArgs) -> menuvault_core::Result<SqliteDocumentStore> {
    let store = SqliteDocumentStore::connect(&args.database).await?;
    info!("Connected to {}", args.database.display());
    Ok(store)
}

/// Close the store, logging rather than failing on a close error.
pub async fn close_store(store: SqliteDocumentStore) {
    if let Err(e) = store.close().await {
        warn!("Failed to close store: {}", e);
    }
}
