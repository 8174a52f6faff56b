//! Generative-AI skill
//!
//! Builds a multi-part prompt (text, inline image, a note about audio),
//! calls the model and retries while it reports overload.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::{Prompt, Reply, SkillKind};

pub const AI_CONFIG_ERROR: &str = "🤖 AI configuration error.";
pub const AI_UNAVAILABLE: &str = "🤖 Sorry, AI is not available right now.";
pub const AI_QUOTA_EXCEEDED: &str =
    "🤖 AI quota exceeded for now. The quota resets periodically, please try again later.";
pub const AUDIO_NOTE: &str = "The user also sent a voice message, which you cannot listen to.";

/// Attempts per request when the model keeps reporting overload
pub const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    /// Base64 image data sent inline with the prompt
    InlineImage { mime_type: String, data: String },
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AiCallError {
    /// HTTP 503, worth retrying
    #[error("model overloaded")]
    Overloaded,

    /// HTTP 429
    #[error("quota exceeded")]
    QuotaExceeded,

    #[error("response had no reply text")]
    MalformedResponse,

    #[error("upstream error: {0}")]
    Upstream(String),
}

/// A generative model that answers multi-part content
#[async_trait]
pub trait GenerativeAi: Send + Sync {
    async fn complete(&self, parts: &[ContentPart]) -> Result<String, AiCallError>;
}

#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Bytes,
    pub mime_type: String,
}

/// Downloads hosted images so they can be sent inline
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> anyhow::Result<FetchedImage>;
}

pub struct AiSkill {
    /// `None` when no model endpoint is configured
    model: Option<Arc<dyn GenerativeAi>>,
    images: Arc<dyn ImageFetcher>,
    retry_base: Duration,
}

impl AiSkill {
    pub fn new(
        model: Option<Arc<dyn GenerativeAi>>,
        images: Arc<dyn ImageFetcher>,
        retry_base: Duration,
    ) -> Self {
        Self {
            model,
            images,
            retry_base,
        }
    }

    /// Delay after the `attempt`-th overloaded response (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.retry_base * attempt
    }

    pub async fn answer(&self, prompt: &Prompt) -> Reply {
        let Some(model) = &self.model else {
            error!("[Chatty AI] No generative-AI endpoint configured");
            return Reply::fallback(AI_CONFIG_ERROR, SkillKind::Ai);
        };

        let parts = self.build_parts(prompt).await;
        if parts.is_empty() {
            warn!("[Chatty AI] Nothing to send to the model");
            return Reply::fallback(AI_UNAVAILABLE, SkillKind::Ai);
        }

        for attempt in 1..=MAX_ATTEMPTS {
            match model.complete(&parts).await {
                Ok(text) => {
                    info!("[Chatty AI] Model replied on attempt {}", attempt);
                    return Reply::answer(text.trim(), SkillKind::Ai);
                }
                Err(AiCallError::Overloaded) => {
                    let delay = self.backoff(attempt);
                    warn!(
                        "[Chatty AI] Model overloaded (attempt {}/{}), waiting {:?}",
                        attempt, MAX_ATTEMPTS, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(AiCallError::QuotaExceeded) => {
                    warn!("[Chatty AI] Model quota exceeded");
                    return Reply::fallback(AI_QUOTA_EXCEEDED, SkillKind::Ai);
                }
                Err(e) => {
                    error!("[Chatty AI] Model call failed: {}", e);
                    return Reply::fallback(AI_UNAVAILABLE, SkillKind::Ai);
                }
            }
        }

        error!("[Chatty AI] Model still overloaded after {} attempts", MAX_ATTEMPTS);
        Reply::fallback(AI_UNAVAILABLE, SkillKind::Ai)
    }

    async fn build_parts(&self, prompt: &Prompt) -> Vec<ContentPart> {
        let mut parts = Vec::new();

        if let Some(text) = prompt.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            parts.push(ContentPart::Text(text.to_string()));
        }

        if let Some(url) = &prompt.image_url {
            match self.images.fetch(url).await {
                Ok(image) => parts.push(ContentPart::InlineImage {
                    mime_type: image.mime_type,
                    data: STANDARD.encode(&image.bytes),
                }),
                Err(e) => warn!("[Chatty AI] Leaving out image {}: {}", url, e),
            }
        }

        // The model endpoint does not take audio input
        if prompt.audio_url.is_some() {
            parts.push(ContentPart::Text(AUDIO_NOTE.to_string()));
        }

        parts
    }
}
