//! HTTP clients behind the AI skill: a Gemini-style `generateContent`
//! endpoint and a plain image downloader.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::ai::{AiCallError, ContentPart, FetchedImage, GenerativeAi, ImageFetcher};

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: [RequestContent<'a>; 1],
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Text { text: &'a str },
    Inline { inline_data: InlineData<'a> },
}

#[derive(Debug, Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

impl<'a> From<&'a ContentPart> for RequestPart<'a> {
    fn from(part: &'a ContentPart) -> Self {
        match part {
            ContentPart::Text(text) => RequestPart::Text { text },
            ContentPart::InlineImage { mime_type, data } => RequestPart::Inline {
                inline_data: InlineData { mime_type, data },
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateResponse {
    /// Text of the first part of the first candidate
    fn reply_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .next()?
            .text
            .filter(|t| !t.trim().is_empty())
    }
}

pub struct GeminiClient {
    client: reqwest::Client,
    /// Full endpoint URL including the API key query parameter
    url: String,
}

impl GeminiClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl GenerativeAi for GeminiClient {
    async fn complete(&self, parts: &[ContentPart]) -> Result<String, AiCallError> {
        let body = GenerateRequest {
            contents: [RequestContent {
                parts: parts.iter().map(RequestPart::from).collect(),
            }],
        };

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AiCallError::Upstream(e.to_string()))?;

        match response.status() {
            StatusCode::SERVICE_UNAVAILABLE => return Err(AiCallError::Overloaded),
            StatusCode::TOO_MANY_REQUESTS => return Err(AiCallError::QuotaExceeded),
            status if !status.is_success() => {
                let detail = response.text().await.unwrap_or_default();
                debug!("Model endpoint said {}: {}", status, detail);
                return Err(AiCallError::Upstream(format!("HTTP {}", status)));
            }
            _ => {}
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|_| AiCallError::MalformedResponse)?;
        parsed.reply_text().ok_or(AiCallError::MalformedResponse)
    }
}

pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> anyhow::Result<FetchedImage> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_string())
            .filter(|v| v.starts_with("image/"))
            .unwrap_or_else(|| "image/jpeg".to_string());
        let bytes = response.bytes().await?;
        Ok(FetchedImage { bytes, mime_type })
    }
}
