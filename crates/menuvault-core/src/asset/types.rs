//! Asset transfer value types.

use crate::config::TransferConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Canonical identifying payload of an asset held by the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDescriptor {
    pub url: String,
    pub public_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
}

/// Resize and compression applied to every upload.
///
/// Opaque to the pipeline; rendered as a transformation string for the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformPolicy {
    pub max_width: u32,
    pub max_height: u32,
    pub quality: String,
}

impl Default for TransformPolicy {
    fn default() -> Self {
        Self {
            max_width: TransferConfig::MAX_WIDTH,
            max_height: TransferConfig::MAX_HEIGHT,
            quality: TransferConfig::QUALITY.to_string(),
        }
    }
}

impl TransformPolicy {
    pub fn as_transformation(&self) -> String {
        format!(
            "c_limit,w_{},h_{},q_{}",
            self.max_width, self.max_height, self.quality
        )
    }
}

/// Per-upload parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    pub public_id: String,
    pub folder: String,
    pub transform: TransformPolicy,
}

/// How public identifiers are generated for new uploads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IdentifierStrategy {
    /// `{entityType}_{entityId}_{timestampMillis}`; a re-upload creates a new asset.
    #[default]
    Timestamped,
    /// `{entityType}_{sha256 prefix}`; identical bytes map to the same asset.
    ContentHash,
}

/// Runtime settings of the transfer client.
#[derive(Debug, Clone)]
pub struct TransferSettings {
    /// Directory local locators are resolved against.
    pub uploads_root: PathBuf,
    /// Host whose URLs are treated as already migrated.
    pub remote_host: String,
    pub identifier: IdentifierStrategy,
    pub transform: TransformPolicy,
}

impl TransferSettings {
    pub fn new(uploads_root: impl Into<PathBuf>) -> Self {
        Self {
            uploads_root: uploads_root.into(),
            remote_host: TransferConfig::REMOTE_HOST.to_string(),
            identifier: IdentifierStrategy::default(),
            transform: TransformPolicy::default(),
        }
    }

    pub fn with_identifier(mut self, identifier: IdentifierStrategy) -> Self {
        self.identifier = identifier;
        self
    }
}

/// What a transfer would do for a locator, decided without uploading.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferPlan {
    /// The locator already points at the remote store.
    AlreadyRemote(RemoteDescriptor),
    /// The locator resolves to this local file.
    Upload(PathBuf),
}
