//! Media ingest
//!
//! Turns embedded `data:` URL payloads from clients into hosted URLs by
//! handing the decoded bytes to an [`ObjectStore`].

pub mod cloudinary;
pub mod local;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use std::sync::Arc;
use tracing::info;

pub use cloudinary::CloudinaryStore;
pub use local::LocalBlobStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Audio,
}

impl MediaKind {
    pub fn folder(self) -> &'static str {
        match self {
            MediaKind::Image => "chat-images",
            MediaKind::Audio => "chat-audio",
        }
    }

    /// Whether a declared MIME type is acceptable for this kind of field.
    /// SVG is refused since it can carry script.
    pub fn accepts(self, mime_type: &str) -> bool {
        let prefix = match self {
            MediaKind::Image => "image/",
            MediaKind::Audio => "audio/",
        };
        mime_type.starts_with(prefix) && !mime_type.starts_with("image/svg")
    }

    fn default_mime(self) -> &'static str {
        match self {
            MediaKind::Image => "image/png",
            MediaKind::Audio => "audio/webm",
        }
    }
}

/// What the object store is told about an upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentHint {
    pub kind: MediaKind,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("malformed embedded payload: {0}")]
    MalformedPayload(String),

    #[error("payload of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },

    #[error("object store rejected upload: {0}")]
    Rejected(String),

    #[error("object store unavailable: {0}")]
    Unavailable(String),

    #[error("blob io: {0}")]
    Io(#[from] std::io::Error),
}

/// Binary object hosting with URL-addressable results
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, bytes: Bytes, hint: &ContentHint) -> Result<StoredObject, UploadError>;
}

/// A decoded `data:<mime>;base64,<payload>` URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    pub mime_type: Option<String>,
    pub bytes: Bytes,
}

impl DataUrl {
    /// `None` if `raw` is not a data URL at all; an error if it is one but
    /// cannot be decoded.
    pub fn parse(raw: &str) -> Option<Result<Self, UploadError>> {
        let rest = raw.trim().strip_prefix("data:")?;
        Some(Self::decode(rest))
    }

    fn decode(rest: &str) -> Result<Self, UploadError> {
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| UploadError::MalformedPayload("missing ',' separator".into()))?;

        let mut params = header.split(';');
        let mime_type = params
            .next()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string);
        if !params.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
            return Err(UploadError::MalformedPayload(
                "only base64 payloads are accepted".into(),
            ));
        }

        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|e| UploadError::MalformedPayload(e.to_string()))?;
        if bytes.is_empty() {
            return Err(UploadError::MalformedPayload("empty payload".into()));
        }

        Ok(Self {
            mime_type,
            bytes: Bytes::from(bytes),
        })
    }
}

/// Media Ingest: embedded payload in, hosted URL out
#[derive(Clone)]
pub struct MediaIngest {
    store: Arc<dyn ObjectStore>,
    max_bytes: usize,
}

impl MediaIngest {
    pub fn new(store: Arc<dyn ObjectStore>, max_bytes: usize) -> Self {
        Self { store, max_bytes }
    }

    /// Upload `payload` if it carries embedded binary data.
    ///
    /// Absent, blank and non-`data:` values are skipped with `Ok(None)`.
    pub async fn ingest(
        &self,
        payload: Option<&str>,
        kind: MediaKind,
    ) -> Result<Option<String>, UploadError> {
        let Some(raw) = payload.filter(|p| !p.trim().is_empty()) else {
            return Ok(None);
        };
        let Some(decoded) = DataUrl::parse(raw) else {
            return Ok(None);
        };
        let data_url = decoded?;

        let size = data_url.bytes.len();
        if size > self.max_bytes {
            return Err(UploadError::TooLarge {
                size,
                limit: self.max_bytes,
            });
        }

        let mime_type = data_url
            .mime_type
            .map(|m| m.to_ascii_lowercase())
            .unwrap_or_else(|| kind.default_mime().to_string());
        if !kind.accepts(&mime_type) {
            return Err(UploadError::MalformedPayload(format!(
                "{} is not an accepted {:?} type",
                mime_type, kind
            )));
        }

        let hint = ContentHint { kind, mime_type };
        let stored = self.store.upload(data_url.bytes, &hint).await?;

        info!("Uploaded {:?} ({} bytes) -> {}", kind, size, stored.url);
        Ok(Some(stored.url))
    }
}
