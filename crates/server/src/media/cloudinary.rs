//! Hosted object store backed by Cloudinary unsigned uploads
//!
//! Audio goes through the `video` resource type; Cloudinary files audio
//! under its video pipeline.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

use super::{ContentHint, MediaKind, ObjectStore, StoredObject, UploadError};

const API_BASE: &str = "https://api.cloudinary.com/v1_1";

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
}

pub struct CloudinaryStore {
    client: reqwest::Client,
    api_base: String,
    cloud_name: String,
    upload_preset: String,
}

impl CloudinaryStore {
    pub fn new(
        cloud_name: impl Into<String>,
        upload_preset: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base: API_BASE.to_string(),
            cloud_name: cloud_name.into(),
            upload_preset: upload_preset.into(),
        })
    }

    /// Point at a different API root (tests, proxies)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn upload_url(&self, kind: MediaKind) -> String {
        let resource_type = match kind {
            MediaKind::Image => "image",
            MediaKind::Audio => "video",
        };
        format!("{}/{}/{}/upload", self.api_base, self.cloud_name, resource_type)
    }
}

#[async_trait]
impl ObjectStore for CloudinaryStore {
    async fn upload(&self, bytes: Bytes, hint: &ContentHint) -> Result<StoredObject, UploadError> {
        let part = Part::bytes(bytes.to_vec())
            .file_name("upload")
            .mime_str(&hint.mime_type)
            .map_err(|e| UploadError::MalformedPayload(e.to_string()))?;
        let form = Form::new()
            .text("upload_preset", self.upload_preset.clone())
            .text("folder", hint.kind.folder())
            .part("file", part);

        let response = self
            .client
            .post(self.upload_url(hint.kind))
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Cloudinary upload failed with {}: {}", status, body);
            return Err(UploadError::Rejected(format!("HTTP {}", status)));
        }

        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| UploadError::Rejected(format!("unexpected response: {}", e)))?;

        Ok(StoredObject {
            url: uploaded.secure_url,
        })
    }
}
