//! Remote content store client.
//!
//! `CloudinaryUploader` talks to the Cloudinary upload API with signed
//! requests. The signature is the SHA-256 of the alphabetically sorted
//! `key=value` parameters joined by `&`, followed by the API secret; the
//! account must accept SHA-256 signatures.

use super::types::{RemoteDescriptor, UploadOptions};
use crate::config::TransferConfig;
use crate::error::{MenuvaultError, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

/// Upload/destroy interface of the remote content store.
#[async_trait]
pub trait AssetUploader: Send + Sync {
    /// Upload a byte buffer and return the store's descriptor for it.
    async fn upload(&self, bytes: Vec<u8>, options: &UploadOptions) -> Result<RemoteDescriptor>;

    /// Delete an asset. Returns `false` if the store did not know it.
    async fn destroy(&self, public_id: &str) -> Result<bool>;
}

/// API credentials for a Cloudinary account.
#[derive(Clone)]
pub struct CloudinaryCredentials {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

impl CloudinaryCredentials {
    pub fn new(
        cloud_name: Option<String>,
        api_key: Option<String>,
        api_secret: Option<String>,
    ) -> Result<Self> {
        fn required(value: Option<String>, name: &str) -> Result<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| MenuvaultError::Config {
                    message: format!("missing Cloudinary setting: {}", name),
                })
        }

        Ok(Self {
            cloud_name: required(cloud_name, "cloud name")?,
            api_key: required(api_key, "API key")?,
            api_secret: required(api_secret, "API secret")?,
        })
    }
}

impl fmt::Debug for CloudinaryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudinaryCredentials")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
    width: Option<u32>,
    height: Option<u32>,
    format: Option<String>,
    bytes: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorMessage,
}

#[derive(Debug, Deserialize)]
struct ErrorMessage {
    message: String,
}

/// Signed HTTP client for Cloudinary's image upload API.
pub struct CloudinaryUploader {
    credentials: CloudinaryCredentials,
    api_base: String,
    client: reqwest::Client,
}

impl CloudinaryUploader {
    pub fn new(credentials: CloudinaryCredentials) -> Result<Self> {
        Self::with_api_base(credentials, TransferConfig::API_BASE)
    }

    /// Target a different API endpoint (proxies, test servers).
    pub fn with_api_base(credentials: CloudinaryCredentials, api_base: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(TransferConfig::REQUEST_TIMEOUT)
            .connect_timeout(TransferConfig::CONNECT_TIMEOUT)
            .user_agent(TransferConfig::USER_AGENT)
            .build()
            .map_err(|e| MenuvaultError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                source: Some(e),
            })?;

        Ok(Self {
            credentials,
            api_base: api_base.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "{}/{}/image/{}",
            self.api_base, self.credentials.cloud_name, action
        )
    }

    /// Signature over the parameters that take part in signing.
    pub fn sign(&self, params: &BTreeMap<&str, String>) -> String {
        let joined = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        let mut hasher = Sha256::new();
        hasher.update(joined.as_bytes());
        hasher.update(self.credentials.api_secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    async fn error_message(response: reqwest::Response) -> String {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorBody>(&body) {
            Ok(parsed) => format!("{}: {}", status, parsed.error.message),
            Err(_) => format!("{}: {}", status, body),
        }
    }
}

#[async_trait]
impl AssetUploader for CloudinaryUploader {
    async fn upload(&self, bytes: Vec<u8>, options: &UploadOptions) -> Result<RemoteDescriptor> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let mut params = BTreeMap::new();
        params.insert("folder", options.folder.clone());
        params.insert("public_id", options.public_id.clone());
        params.insert("timestamp", timestamp);
        params.insert("transformation", options.transform.as_transformation());
        let signature = self.sign(&params);

        let size = bytes.len();
        let mut form = Form::new().part(
            "file",
            Part::bytes(bytes).file_name(options.public_id.clone()),
        );
        for (key, value) in params {
            form = form.text(key, value);
        }
        form = form
            .text("api_key", self.credentials.api_key.clone())
            .text("signature", signature);

        debug!("Uploading {} ({} bytes)", options.public_id, size);
        let response = self
            .client
            .post(self.endpoint("upload"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| MenuvaultError::Transfer {
                locator: options.public_id.clone(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(MenuvaultError::Transfer {
                locator: options.public_id.clone(),
                message: Self::error_message(response).await,
            });
        }

        let body: UploadResponse = response.json().await.map_err(|e| MenuvaultError::Transfer {
            locator: options.public_id.clone(),
            message: format!("Invalid upload response: {}", e),
        })?;

        info!("Uploaded {}", body.public_id);
        Ok(RemoteDescriptor {
            url: body.secure_url,
            public_id: body.public_id,
            width: body.width,
            height: body.height,
            format: body.format,
            bytes: body.bytes,
        })
    }

    async fn destroy(&self, public_id: &str) -> Result<bool> {
        let mut params = BTreeMap::new();
        params.insert("public_id", public_id.to_string());
        params.insert("timestamp", chrono::Utc::now().timestamp().to_string());
        let signature = self.sign(&params);

        let mut form: Vec<(&str, String)> = params.into_iter().collect();
        form.push(("api_key", self.credentials.api_key.clone()));
        form.push(("signature", signature));

        let response = self
            .client
            .post(self.endpoint("destroy"))
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MenuvaultError::Transfer {
                locator: public_id.to_string(),
                message: Self::error_message(response).await,
            });
        }

        let body: DestroyResponse = response.json().await?;
        debug!("Destroy {}: {}", public_id, body.result);
        Ok(body.result == "ok")
    }
}
