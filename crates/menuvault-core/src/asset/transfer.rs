//! Idempotent asset transfer.
//!
//! Locators that already point at the remote store are never re-uploaded: a
//! descriptor is synthesized from the URL instead, and a remote URL without a
//! public id fails. Everything else is resolved against the local uploads
//! root and pushed through the uploader.

use super::types::{
    IdentifierStrategy, RemoteDescriptor, TransferPlan, TransferSettings, UploadOptions,
};
use super::uploader::AssetUploader;
use crate::config::{MigrationConfig, TransferConfig};
use crate::error::{MenuvaultError, Result};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tracing::debug;
use url::Url;

static VERSION_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^v\d+$").expect("version segment regex must compile"));

/// Transfer client wrapping an `AssetUploader` with skip detection and local resolution.
pub struct AssetTransfer {
    uploader: Arc<dyn AssetUploader>,
    settings: TransferSettings,
}

impl AssetTransfer {
    pub fn new(uploader: Arc<dyn AssetUploader>, settings: TransferSettings) -> Self {
        Self { uploader, settings }
    }

    pub fn settings(&self) -> &TransferSettings {
        &self.settings
    }

    fn remote_url(&self, locator: &str) -> Option<Url> {
        let url = Url::parse(locator).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        let host = url.host_str()?;
        let remote = self.settings.remote_host.as_str();
        let suffix_match = host
            .strip_suffix(remote)
            .is_some_and(|prefix| prefix.ends_with('.'));
        (host == remote || suffix_match).then_some(url)
    }

    /// Descriptor for an already-remote URL, with the public id taken from its path.
    pub fn descriptor_from_url(&self, locator: &str) -> Option<RemoteDescriptor> {
        let url = self.remote_url(locator)?;
        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();

        let mut tail: &[&str] = match segments.iter().position(|s| *s == "upload") {
            Some(pos) => &segments[pos + 1..],
            None => &segments[..],
        };
        // Transformation segments precede the version; the id follows it.
        if let Some(pos) = tail.iter().position(|s| VERSION_SEGMENT.is_match(s)) {
            tail = &tail[pos + 1..];
        }
        if tail.is_empty() {
            return None;
        }

        let joined = tail.join("/");
        let (public_id, format) = match joined.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.contains('/') => {
                (stem.to_string(), Some(ext.to_lowercase()))
            }
            _ => (joined.clone(), None),
        };

        Some(RemoteDescriptor {
            url: locator.to_string(),
            public_id,
            width: None,
            height: None,
            format,
            bytes: None,
        })
    }

    /// Map a local locator onto the uploads root without checking existence.
    ///
    /// Accepts `/uploads/<rel>`, `<rel>`, and URLs of other hosts serving
    /// `/uploads/<rel>`. Parent-directory components are rejected.
    pub fn local_path(&self, locator: &str) -> Result<PathBuf> {
        let raw_path = match Url::parse(locator) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => url.path().to_string(),
            _ => locator.to_string(),
        };

        let trimmed = raw_path.trim_start_matches('/');
        let prefix = format!("{}/", MigrationConfig::LOCAL_URL_PREFIX);
        let relative = trimmed.strip_prefix(prefix.as_str()).unwrap_or(trimmed);

        let root = &self.settings.uploads_root;
        let mut path = root.clone();
        for component in Path::new(relative).components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                _ => return Err(MenuvaultError::FileNotFound(root.join(relative))),
            }
        }
        if path == *root {
            return Err(MenuvaultError::FileNotFound(path));
        }
        Ok(path)
    }

    /// Decide what a transfer of `locator` would do, touching only the local disk.
    pub async fn plan(&self, locator: &str) -> Result<TransferPlan> {
        if self.remote_url(locator).is_some() {
            return self
                .descriptor_from_url(locator)
                .map(TransferPlan::AlreadyRemote)
                .ok_or_else(|| MenuvaultError::Transfer {
                    locator: locator.to_string(),
                    message: "remote URL carries no public id".to_string(),
                });
        }

        let path = self.local_path(locator)?;
        let is_file = tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(MenuvaultError::FileNotFound(path));
        }
        Ok(TransferPlan::Upload(path))
    }

    /// Transfer `locator`, returning the canonical remote descriptor.
    pub async fn transfer(
        &self,
        locator: &str,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<RemoteDescriptor> {
        match self.plan(locator).await? {
            TransferPlan::AlreadyRemote(descriptor) => {
                debug!("Already remote, skipping upload: {}", locator);
                Ok(descriptor)
            }
            TransferPlan::Upload(path) => self.upload_file(&path, entity_type, entity_id).await,
        }
    }

    /// Upload a resolved local file.
    pub async fn upload_file(
        &self,
        path: &Path,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<RemoteDescriptor> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => MenuvaultError::FileNotFound(path.to_path_buf()),
                _ => MenuvaultError::io_with_path(e, path),
            })?;

        let options = UploadOptions {
            public_id: self.public_id(entity_type, entity_id, &bytes),
            folder: format!("{}/{}", TransferConfig::FOLDER_PREFIX, entity_type),
            transform: self.settings.transform.clone(),
        };

        self.uploader
            .upload(bytes, &options)
            .await
            .map_err(|e| match e {
                MenuvaultError::Transfer { .. } => e,
                other => MenuvaultError::Transfer {
                    locator: path.display().to_string(),
                    message: other.to_string(),
                },
            })
    }

    /// Remove an uploaded asset from the remote store.
    pub async fn discard(&self, public_id: &str) -> Result<bool> {
        self.uploader.destroy(public_id).await
    }

    fn public_id(&self, entity_type: &str, entity_id: &str, bytes: &[u8]) -> String {
        match self.settings.identifier {
            IdentifierStrategy::Timestamped => format!(
                "{}_{}_{}",
                entity_type,
                entity_id,
                chrono::Utc::now().timestamp_millis()
            ),
            IdentifierStrategy::ContentHash => {
                let digest = hex::encode(Sha256::digest(bytes));
                format!(
                    "{}_{}",
                    entity_type,
                    &digest[..TransferConfig::CONTENT_HASH_PREFIX_LEN]
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingUploader {
        uploads: Mutex<Vec<UploadOptions>>,
    }

    #[async_trait]
    impl AssetUploader for RecordingUploader {
        async fn upload(&self, bytes: Vec<u8>, options: &UploadOptions) -> Result<RemoteDescriptor> {
            self.uploads.lock().unwrap().push(options.clone());
            Ok(RemoteDescriptor {
                url: format!(
                    "https://res.cloudinary.com/demo/image/upload/v1/{}/{}.jpg",
                    options.folder, options.public_id
                ),
                public_id: format!("{}/{}", options.folder, options.public_id),
                width: Some(10),
                height: Some(10),
                format: Some("jpg".into()),
                bytes: Some(bytes.len() as u64),
            })
        }

        async fn destroy(&self, _public_id: &str) -> Result<bool> {
            Ok(true)
        }
    }

    fn transfer_in(root: &Path) -> (AssetTransfer, Arc<RecordingUploader>) {
        let uploader = Arc::new(RecordingUploader::default());
        let transfer = AssetTransfer::new(uploader.clone(), TransferSettings::new(root));
        (transfer, uploader)
    }

    #[test]
    fn test_remote_detection() {
        let temp = TempDir::new().unwrap();
        let (transfer, _) = transfer_in(temp.path());
        let remote = |locator| transfer.descriptor_from_url(locator).is_some();
        assert!(remote("https://res.cloudinary.com/demo/image/upload/logo.png"));
        assert!(remote("https://images.res.cloudinary.com/demo/image/upload/logo.png"));
        assert!(!remote("/uploads/restaurants/abc.jpg"));
        assert!(!remote("https://evil.example/res.cloudinary.com/a.png"));
        assert!(!remote("https://notres.cloudinary.com.example/a.png"));
    }

    #[test]
    fn test_public_id_extraction() {
        let temp = TempDir::new().unwrap();
        let (transfer, _) = transfer_in(temp.path());

        let d = transfer
            .descriptor_from_url(
                "https://res.cloudinary.com/demo/image/upload/c_limit,w_1200/v1712345678/menuvault/menus/menus_m1_17.jpg",
            )
            .unwrap();
        assert_eq!(d.public_id, "menuvault/menus/menus_m1_17");
        assert_eq!(d.format.as_deref(), Some("jpg"));

        let d = transfer
            .descriptor_from_url("https://res.cloudinary.com/demo/image/upload/logo.png")
            .unwrap();
        assert_eq!(d.public_id, "logo");
    }

    #[test]
    fn test_local_path_resolution() {
        let temp = TempDir::new().unwrap();
        let (transfer, _) = transfer_in(temp.path());

        assert_eq!(
            transfer.local_path("/uploads/restaurants/abc.jpg").unwrap(),
            temp.path().join("restaurants").join("abc.jpg")
        );
        assert_eq!(
            transfer.local_path("menus/m.png").unwrap(),
            temp.path().join("menus").join("m.png")
        );
        assert_eq!(
            transfer
                .local_path("http://localhost:5000/uploads/profiles/p.png")
                .unwrap(),
            temp.path().join("profiles").join("p.png")
        );
        assert!(matches!(
            transfer.local_path("/uploads/../../etc/passwd"),
            Err(MenuvaultError::FileNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_transfer_skips_remote_without_upload() {
        let temp = TempDir::new().unwrap();
        let (transfer, uploader) = transfer_in(temp.path());
        let url = "https://res.cloudinary.com/demo/image/upload/v3/menuvault/logo.png";
        let descriptor = transfer.transfer(url, "restaurants", "r1").await.unwrap();
        assert_eq!(descriptor.url, url);
        assert!(uploader.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remote_url_without_id_is_not_uploaded() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("demo/image")).unwrap();
        std::fs::write(temp.path().join("demo/image/upload"), b"jpeg").unwrap();
        let (transfer, uploader) = transfer_in(temp.path());

        let err = transfer
            .transfer("https://res.cloudinary.com/demo/image/upload/", "restaurants", "r1")
            .await
            .unwrap_err();
        assert!(matches!(err, MenuvaultError::Transfer { .. }));
        assert!(uploader.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transfer_missing_file() {
        let temp = TempDir::new().unwrap();
        let (transfer, _) = transfer_in(temp.path());
        let err = transfer
            .transfer("/uploads/restaurants/missing.jpg", "restaurants", "r1")
            .await
            .unwrap_err();
        assert!(matches!(err, MenuvaultError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn test_transfer_uploads_local_file() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("restaurants")).unwrap();
        std::fs::write(temp.path().join("restaurants/abc.jpg"), b"jpeg").unwrap();
        let (transfer, uploader) = transfer_in(temp.path());

        let descriptor = transfer
            .transfer("/uploads/restaurants/abc.jpg", "restaurants", "r1")
            .await
            .unwrap();
        assert_eq!(descriptor.bytes, Some(4));

        let uploads = uploader.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].folder, "menuvault/restaurants");
        assert!(uploads[0].public_id.starts_with("restaurants_r1_"));
    }

    #[tokio::test]
    async fn test_content_hash_identifier_is_stable() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.jpg"), b"same").unwrap();
        std::fs::write(temp.path().join("b.jpg"), b"same").unwrap();
        let uploader = Arc::new(RecordingUploader::default());
        let transfer = AssetTransfer::new(
            uploader.clone(),
            TransferSettings::new(temp.path()).with_identifier(IdentifierStrategy::ContentHash),
        );

        transfer.transfer("a.jpg", "menus", "m1").await.unwrap();
        transfer.transfer("b.jpg", "menus", "m2").await.unwrap();
        let uploads = uploader.uploads.lock().unwrap();
        assert_eq!(uploads[0].public_id, uploads[1].public_id);
        assert_eq!(uploads[0].public_id.len(), "menus_".len() + 16);
    }
}
