//! Centralized configuration for the maintenance pipeline.
//!
//! Constants for asset transfer, reporting and database optimization. Runtime
//! settings (credentials, directories) are assembled by the binaries.

use std::time::Duration;

/// Asset transfer configuration.
pub struct TransferConfig;

impl TransferConfig {
    pub const API_BASE: &'static str = "https://api.cloudinary.com/v1_1";
    pub const REMOTE_HOST: &'static str = "res.cloudinary.com";
    pub const FOLDER_PREFIX: &'static str = "menuvault";
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
    pub const USER_AGENT: &'static str = "menuvault-maintenance/0.3";

    // Transform policy applied to every upload
    pub const MAX_WIDTH: u32 = 1200;
    pub const MAX_HEIGHT: u32 = 1200;
    pub const QUALITY: &'static str = "auto:good";

    /// Hex characters of the content hash kept in content-addressed ids.
    pub const CONTENT_HASH_PREFIX_LEN: usize = 16;
}

/// Migration run configuration.
pub struct MigrationConfig;

impl MigrationConfig {
    pub const DEFAULT_UPLOADS_DIR: &'static str = "uploads";
    /// Path prefix the web backend used when storing local locators.
    pub const LOCAL_URL_PREFIX: &'static str = "uploads";
}

/// Report artifact configuration.
pub struct ReportConfig;

impl ReportConfig {
    pub const DEFAULT_REPORTS_DIR: &'static str = "reports";
    pub const TIMESTAMP_FORMAT: &'static str = "%Y%m%dT%H%M%S%.3fZ";
    pub const MIGRATION_RUN_TYPE: &'static str = "migration";
    pub const OPTIMIZATION_RUN_TYPE: &'static str = "optimization";
}

/// Thresholds and sampling sizes for the optimizer.
pub struct OptimizerConfig;

impl OptimizerConfig {
    /// Average document size above which a "large document" recommendation is raised.
    pub const LARGE_DOCUMENT_BYTES: f64 = 16.0 * 1024.0;
    /// Index size / storage size ratio above which "index overhead" is raised.
    pub const INDEX_OVERHEAD_RATIO: f64 = 0.5;
    /// Rows kept per query-shape sample.
    pub const QUERY_SAMPLE_LIMIT: usize = 5;
    pub const BUSY_TIMEOUT: Duration = Duration::from_secs(30);
}
