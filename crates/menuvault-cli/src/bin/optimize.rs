//! Menuvault database optimization.
//!
//! Applies store settings, creates indexes and TTL policies, samples query
//! shapes, validates integrity and writes an `optimization-report-<timestamp>.json`.

use anyhow::Result;
use clap::Parser;
use menuvault_cli::{close_store, connect_store, init_logging, CommonArgs};
use menuvault_core::maintenance::FindingStatus;
use menuvault_core::{Optimizer, OptimizerOptions};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "menuvault-optimize")]
#[command(about = "Create indexes, validate integrity and report on the Menuvault database")]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Skip ordinary index creation
    #[arg(long)]
    skip_indexes: bool,

    /// Skip query-shape sampling
    #[arg(long)]
    skip_analysis: bool,

    /// Skip store settings tuning
    #[arg(long)]
    skip_settings: bool,

    /// Skip TTL index creation and expiry of elapsed documents
    #[arg(long)]
    skip_ttl: bool,

    /// Skip integrity validation
    #[arg(long)]
    skip_validation: bool,

    /// Do not write the report artifact
    #[arg(long)]
    skip_report: bool,
}

impl Args {
    fn optimizer_options(&self) -> OptimizerOptions {
        OptimizerOptions {
            skip_indexes: self.skip_indexes,
            skip_analysis: self.skip_analysis,
            skip_settings: self.skip_settings,
            skip_ttl: self.skip_ttl,
            skip_validation: self.skip_validation,
            reports_dir: (!self.skip_report).then(|| self.common.reports_dir.clone()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.common.debug);

    info!("Starting Menuvault database optimization");
    let store = connect_store(&args.common).await?;
    let result = Optimizer::new(&store).run(&args.optimizer_options()).await;
    close_store(store).await;
    let run = result?;

    let report = &run.report;
    let issues: u64 = report
        .integrity_findings
        .iter()
        .filter(|f| f.status == FindingStatus::Warning)
        .map(|f| f.issue_count)
        .sum();
    if issues > 0 {
        warn!("Integrity validation found {} issues", issues);
    }
    info!(
        "Done: {} collections, {} index results, {} recommendations",
        report.collection_stats.len(),
        report.index_results.len(),
        report.recommendations.len()
    );
    Ok(())
}
