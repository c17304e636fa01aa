//! Report artifact persistence.
//!
//! Reports are written atomically:
//! 1. Serialize to a temp file beside the target, named with the PID
//! 2. `sync_all` so the data reaches disk
//! 3. Rename over the target path
//!
//! Artifact names follow `<run-type>-report-<timestamp>.json`.

use crate::config::ReportConfig;
use crate::error::{MenuvaultError, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use tracing::debug;

/// Read and parse a JSON artifact. Returns `None` if it does not exist.
pub fn read_report<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(MenuvaultError::io_with_path(e, path)),
    };

    let data = serde_json::from_str(&contents).map_err(|e| MenuvaultError::Json {
        message: format!("Failed to parse {}: {}", path.display(), e),
        source: Some(e),
    })?;
    Ok(Some(data))
}

/// Write `data` as pretty JSON to `path` atomically, creating parent directories.
pub fn atomic_write_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| MenuvaultError::Io {
            message: format!("Failed to create directory {}", parent.display()),
            path: Some(parent.to_path_buf()),
            source: Some(e),
        })?;
    }

    let serialized = serde_json::to_string_pretty(data).map_err(|e| MenuvaultError::Json {
        message: format!("Failed to serialize report: {}", e),
        source: Some(e),
    })?;

    let temp_path = path.with_extension(format!("json.{}.tmp", process::id()));
    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|e| MenuvaultError::Io {
                message: format!("Failed to create temp file {}", temp_path.display()),
                path: Some(temp_path.clone()),
                source: Some(e),
            })?;

        file.write_all(serialized.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| MenuvaultError::Io {
                message: format!("Failed to write temp file {}", temp_path.display()),
                path: Some(temp_path.clone()),
                source: Some(e),
            })?;
    }

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(MenuvaultError::Io {
            message: format!("Failed to rename {} to {}", temp_path.display(), path.display()),
            path: Some(path.to_path_buf()),
            source: Some(e),
        });
    }

    debug!("Atomically wrote {}", path.display());
    Ok(())
}

/// Timestamp rendering for report file names. Report bodies carry RFC 3339.
pub fn report_timestamp(at: DateTime<Utc>) -> String {
    at.format(ReportConfig::TIMESTAMP_FORMAT).to_string()
}

pub fn report_file_name(run_type: &str, at: DateTime<Utc>) -> String {
    format!("{}-report-{}.json", run_type, report_timestamp(at))
}

/// Persist a report under `dir` and return its path.
pub fn write_report<T: Serialize>(
    dir: &Path,
    run_type: &str,
    at: DateTime<Utc>,
    report: &T,
) -> Result<PathBuf> {
    let path = dir.join(report_file_name(run_type, at));
    atomic_write_json(&path, report)?;
    Ok(path)
}

/// Previously written artifacts of `run_type`, oldest first.
pub fn list_reports(dir: &Path, run_type: &str) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(MenuvaultError::io_with_path(e, dir)),
    };

    let prefix = format!("{}-report-", run_type);
    let mut reports: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix) && n.ends_with(".json"))
        })
        .collect();
    // Timestamps sort lexicographically.
    reports.sort();
    Ok(reports)
}

/// Most recent artifact of `run_type` under `dir`, parsed.
pub fn latest_report<T: DeserializeOwned>(dir: &Path, run_type: &str) -> Result<Option<T>> {
    match list_reports(dir, run_type)?.last() {
        Some(path) => read_report(path),
        None => Ok(None),
    }
}
