//! Content-addressed blob storage on the local filesystem
//!
//! Blobs are stored under their SHA-256 hash with a small JSON sidecar for
//! the content type, and served back by `GET /blobs/{hash}`.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

use super::{ContentHint, ObjectStore, StoredObject, UploadError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobMeta {
    pub content_type: String,
    pub size: u64,
}

pub struct LocalBlobStore {
    blob_dir: PathBuf,
    public_base_url: String,
}

impl LocalBlobStore {
    pub async fn new(
        blob_dir: impl Into<PathBuf>,
        public_base_url: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let blob_dir = blob_dir.into();
        fs::create_dir_all(&blob_dir).await?;
        Ok(Self {
            blob_dir,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Read a blob back. Anything that is not a SHA-256 hex digest is unknown.
    pub async fn get(&self, hash: &str) -> anyhow::Result<Option<(Bytes, BlobMeta)>> {
        if !is_sha256_hex(hash) {
            return Ok(None);
        }
        let data_path = self.blob_dir.join(hash);
        if !fs::try_exists(&data_path).await? {
            return Ok(None);
        }

        let data = fs::read(&data_path).await?;
        let meta = match fs::read_to_string(self.meta_path(hash)).await {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(_) => BlobMeta {
                content_type: "application/octet-stream".to_string(),
                size: data.len() as u64,
            },
        };

        Ok(Some((Bytes::from(data), meta)))
    }

    fn meta_path(&self, hash: &str) -> PathBuf {
        self.blob_dir.join(format!("{}.json", hash))
    }
}

#[async_trait]
impl ObjectStore for LocalBlobStore {
    async fn upload(&self, bytes: Bytes, hint: &ContentHint) -> Result<StoredObject, UploadError> {
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let hash = format!("{:x}", hasher.finalize());

        let data_path = self.blob_dir.join(&hash);
        if !fs::try_exists(&data_path).await? {
            let temp_path = data_path.with_extension("tmp");
            fs::write(&temp_path, &bytes).await?;
            fs::rename(&temp_path, &data_path).await?;
        }

        let meta = BlobMeta {
            content_type: hint.mime_type.clone(),
            size: bytes.len() as u64,
        };
        let meta_json = serde_json::to_string(&meta)
            .map_err(|e| UploadError::Rejected(e.to_string()))?;
        fs::write(self.meta_path(&hash), meta_json).await?;

        debug!("Stored blob {} ({} bytes)", hash, bytes.len());

        Ok(StoredObject {
            url: format!("{}/blobs/{}", self.public_base_url, hash),
        })
    }
}

fn is_sha256_hex(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
}
