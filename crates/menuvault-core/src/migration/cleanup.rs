//! Post-migration sweep of the local uploads directory.
//!
//! The sweep is destructive and does not verify that the files it removes
//! were migrated. It only runs when both the cleanup flag and its
//! confirmation are given, and never in dry-run mode.

use crate::error::{MenuvaultError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// The two cleanup switches. Both must be set for files to be deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupRequest {
    pub cleanup: bool,
    pub confirm: bool,
}

impl CleanupRequest {
    pub fn confirmed() -> Self {
        Self {
            cleanup: true,
            confirm: true,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.cleanup && self.confirm
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupSummary {
    pub executed: bool,
    pub files_deleted: u64,
    pub directories_removed: u64,
    pub root_removed: bool,
    pub errors: Vec<String>,
}

pub struct CleanupSweep {
    root: PathBuf,
}

impl CleanupSweep {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Run the sweep if `request` is confirmed and this is not a dry run.
    pub async fn run(
        &self,
        request: CleanupRequest,
        dry_run: bool,
        had_failures: bool,
    ) -> Result<CleanupSummary> {
        if !request.is_confirmed() {
            if request.cleanup {
                info!("Cleanup requested without --cleanup-confirm; local files kept");
            } else {
                debug!("Cleanup not requested");
            }
            return Ok(CleanupSummary::default());
        }
        if dry_run {
            info!("Dry run: cleanup of {} skipped", self.root.display());
            return Ok(CleanupSummary::default());
        }
        if had_failures {
            warn!(
                "Migration recorded failures; cleanup will still delete every file under {}",
                self.root.display()
            );
        }

        let root = self.root.clone();
        let summary = tokio::task::spawn_blocking(move || sweep(&root))
            .await
            .map_err(|e| MenuvaultError::Io {
                message: format!("Cleanup task failed: {}", e),
                path: Some(self.root.clone()),
                source: None,
            })?;

        info!(
            "Cleanup complete: {} files deleted, {} directories removed, {} errors",
            summary.files_deleted,
            summary.directories_removed,
            summary.errors.len()
        );
        Ok(summary)
    }
}

fn is_empty_dir(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}

/// Delete files in subdirectories of `root`, then empty directories, then `root` itself if empty.
fn sweep(root: &Path) -> CleanupSummary {
    let mut summary = CleanupSummary {
        executed: true,
        ..CleanupSummary::default()
    };

    if !root.is_dir() {
        debug!("Uploads directory {} does not exist", root.display());
        return summary;
    }

    // Children are yielded before their directory, so directories are
    // already emptied when visited.
    for entry in WalkDir::new(root).min_depth(1).contents_first(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                summary.errors.push(e.to_string());
                continue;
            }
        };
        let path = entry.path();

        if entry.file_type().is_dir() {
            if !is_empty_dir(path) {
                continue;
            }
            match fs::remove_dir(path) {
                Ok(()) => summary.directories_removed += 1,
                Err(e) => summary.errors.push(format!("{}: {}", path.display(), e)),
            }
        } else if entry.depth() >= 2 {
            match fs::remove_file(path) {
                Ok(()) => {
                    debug!("Deleted {}", path.display());
                    summary.files_deleted += 1;
                }
                Err(e) => summary.errors.push(format!("{}: {}", path.display(), e)),
            }
        }
    }

    if is_empty_dir(root) {
        match fs::remove_dir(root) {
            Ok(()) => summary.root_removed = true,
            Err(e) => summary.errors.push(format!("{}: {}", root.display(), e)),
        }
    }

    summary
}
