//! Chat server configuration

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::chat::ConversationService;
use crate::media::LocalBlobStore;
use crate::realtime::{ConnectionHub, PresenceRegistry};
use crate::store::UserDirectory;

/// Origins the web client is served from during development
const DEFAULT_ORIGINS: &[&str] = &[
    "http://localhost:5173",
    "http://localhost:5174",
    "http://localhost:5175",
    "http://localhost:5176",
    "http://localhost:5177",
    "http://127.0.0.1:5173",
    "http://localhost:3000",
];

/// Configuration for the Chatty server
#[derive(Clone, Debug)]
pub struct ChatServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Conversation JSON files
    pub storage_dir: PathBuf,
    /// Local blob storage directory
    pub blob_dir: PathBuf,
    /// SQLite user directory
    pub users_db: PathBuf,
    /// Base URL clients use to reach this server (for hosted blob URLs)
    pub public_base_url: String,
    /// Full generateContent URL, key included
    pub gemini_api_url: Option<String>,
    pub openweather_api_key: Option<String>,
    pub openweather_base_url: String,
    pub cloudinary_cloud_name: Option<String>,
    pub cloudinary_upload_preset: Option<String>,
    pub ai_timeout: Duration,
    pub weather_timeout: Duration,
    /// Backoff unit between overloaded AI attempts
    pub ai_retry_base: Duration,
    /// Max decoded size of one embedded upload, in bytes
    pub max_upload_bytes: usize,
    pub allowed_origins: Vec<String>,
}

impl Default for ChatServerConfig {
    fn default() -> Self {
        let port = 5001;
        let base = PathBuf::from("chatty_data");
        Self {
            port,
            storage_dir: base.join("conversations"),
            blob_dir: base.join("blobs"),
            users_db: base.join("users.sqlite"),
            public_base_url: format!("http://localhost:{}", port),
            gemini_api_url: None,
            openweather_api_key: None,
            openweather_base_url: "https://api.openweathermap.org".to_string(),
            cloudinary_cloud_name: None,
            cloudinary_upload_preset: None,
            ai_timeout: Duration::from_secs(15),
            weather_timeout: Duration::from_secs(8),
            ai_retry_base: Duration::from_millis(1000),
            max_upload_bytes: 10 * 1024 * 1024, // 10MB
            allowed_origins: DEFAULT_ORIGINS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ChatServerConfig {
    /// Build config from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = env_parse("PORT").unwrap_or(defaults.port);
        let mut config = match std::env::var("CHATTY_DATA_DIR") {
            Ok(dir) => Self::with_base_dir(dir),
            Err(_) => defaults,
        };

        config.port = port;
        config.public_base_url = env_string("PUBLIC_BASE_URL")
            .unwrap_or_else(|| format!("http://localhost:{}", port));
        config.gemini_api_url = env_string("GEMINI_API_URL");
        config.openweather_api_key = env_string("OPENWEATHER_API_KEY");
        if let Some(url) = env_string("OPENWEATHER_BASE_URL") {
            config.openweather_base_url = url;
        }
        config.cloudinary_cloud_name = env_string("CLOUDINARY_CLOUD_NAME");
        config.cloudinary_upload_preset = env_string("CLOUDINARY_UPLOAD_PRESET");
        if let Some(secs) = env_parse("AI_TIMEOUT_SECS") {
            config.ai_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse("WEATHER_TIMEOUT_SECS") {
            config.weather_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = env_parse("AI_RETRY_BASE_MS") {
            config.ai_retry_base = Duration::from_millis(ms);
        }
        if let Some(bytes) = env_parse("MAX_UPLOAD_BYTES") {
            config.max_upload_bytes = bytes;
        }
        if let Some(origins) = env_string("ALLOWED_ORIGINS") {
            config.allowed_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }

        config
    }

    /// Create config with custom base directory
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base = base_dir.into();
        Self {
            storage_dir: base.join("conversations"),
            blob_dir: base.join("blobs"),
            users_db: base.join("users.sqlite"),
            ..Self::default()
        }
    }

    /// Ensure all directories exist
    pub async fn ensure_dirs(&self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.storage_dir).await?;
        tokio::fs::create_dir_all(&self.blob_dir).await?;
        if let Some(parent) = self.users_db.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Hosted object store is used only when both Cloudinary settings are present
    pub fn cloudinary(&self) -> Option<(&str, &str)> {
        match (&self.cloudinary_cloud_name, &self.cloudinary_upload_preset) {
            (Some(cloud), Some(preset)) => Some((cloud.as_str(), preset.as_str())),
            _ => None,
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.trim().parse().ok())
}

/// App state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: ChatServerConfig,
    pub conversations: Arc<ConversationService>,
    pub users: Arc<UserDirectory>,
    pub presence: Arc<PresenceRegistry>,
    pub hub: Arc<ConnectionHub>,
    /// Present when media is hosted locally and served by `/blobs/{hash}`
    pub blobs: Option<Arc<LocalBlobStore>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_base_dir_reroots_storage() {
        let config = ChatServerConfig::with_base_dir("/tmp/chatty-test");
        assert_eq!(config.storage_dir, PathBuf::from("/tmp/chatty-test/conversations"));
        assert_eq!(config.blob_dir, PathBuf::from("/tmp/chatty-test/blobs"));
        assert_eq!(config.users_db, PathBuf::from("/tmp/chatty-test/users.sqlite"));
        assert_eq!(config.ai_timeout, Duration::from_secs(15));
    }

    #[test]
    fn cloudinary_requires_both_settings() {
        let mut config = ChatServerConfig::default();
        config.cloudinary_cloud_name = Some("demo".into());
        assert!(config.cloudinary().is_none());
        config.cloudinary_upload_preset = Some("unsigned".into());
        assert_eq!(config.cloudinary(), Some(("demo", "unsigned")));
    }
}
