//! Chatty Chat Server Library
//!
//! One-to-one chat with presence, media uploads and an AI contact that
//! answers weather questions itself and hands everything else to a
//! generative model.

pub mod chat;
pub mod config;
pub mod error;
pub mod handlers;
pub mod media;
pub mod models;
pub mod realtime;
pub mod responder;
pub mod store;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use chat::ConversationService;
use config::{AppState, ChatServerConfig};
use media::{CloudinaryStore, LocalBlobStore, MediaIngest, ObjectStore};
use realtime::{ConnectionHub, Delivery, PresenceRegistry};
use responder::{
    AiSkill, GeminiClient, GenerativeAi, HttpImageFetcher, ImageFetcher, OpenWeatherClient,
    Responder, WeatherApi, WeatherSkill,
};
use store::{JsonMessageStore, UserDirectory};

/// The outside services the chat depends on
pub struct Upstreams {
    pub objects: Arc<dyn ObjectStore>,
    /// Set when `objects` is the local blob store, so `/blobs` can serve it
    pub blobs: Option<Arc<LocalBlobStore>>,
    pub weather: Arc<dyn WeatherApi>,
    /// `None` when no model endpoint is configured
    pub model: Option<Arc<dyn GenerativeAi>>,
    pub images: Arc<dyn ImageFetcher>,
}

impl Upstreams {
    /// Real clients, chosen from the configuration
    pub async fn from_config(config: &ChatServerConfig) -> anyhow::Result<Self> {
        let (objects, blobs) = match config.cloudinary() {
            Some((cloud, preset)) => {
                info!("Media uploads go to Cloudinary ({})", cloud);
                let hosted = CloudinaryStore::new(cloud, preset, config.ai_timeout)?;
                (Arc::new(hosted) as Arc<dyn ObjectStore>, None)
            }
            None => {
                info!("Media uploads stored locally in {:?}", config.blob_dir);
                let local = Arc::new(
                    LocalBlobStore::new(&config.blob_dir, &config.public_base_url).await?,
                );
                (local.clone() as Arc<dyn ObjectStore>, Some(local))
            }
        };

        if config.openweather_api_key.is_none() {
            warn!("OPENWEATHER_API_KEY not set, weather questions will get an apology");
        }
        let weather = Arc::new(OpenWeatherClient::new(
            &config.openweather_base_url,
            config.openweather_api_key.clone(),
            config.weather_timeout,
        )?);

        let model: Option<Arc<dyn GenerativeAi>> = match &config.gemini_api_url {
            Some(url) => {
                let client = GeminiClient::new(url, config.ai_timeout)?;
                Some(Arc::new(client) as Arc<dyn GenerativeAi>)
            }
            None => {
                warn!("[Chatty AI] GEMINI_API_URL not set, AI replies will report a configuration error");
                None
            }
        };

        Ok(Self {
            objects,
            blobs,
            weather,
            model,
            images: Arc::new(HttpImageFetcher::new(config.ai_timeout)?),
        })
    }
}

/// Wire stores, real-time layer and responder into the shared state
pub async fn build_state(config: ChatServerConfig, upstreams: Upstreams) -> anyhow::Result<AppState> {
    config.ensure_dirs().await?;

    let messages = Arc::new(JsonMessageStore::new(&config.storage_dir).await?);
    let users = Arc::new(UserDirectory::new(&config.users_db).await?);

    let hub = Arc::new(ConnectionHub::new());
    let presence = Arc::new(PresenceRegistry::new(hub.clone()));
    let delivery = Delivery::new(presence.clone(), hub.clone());

    let responder = Arc::new(Responder::new(
        WeatherSkill::new(upstreams.weather),
        AiSkill::new(upstreams.model, upstreams.images, config.ai_retry_base),
    ));
    let media = MediaIngest::new(upstreams.objects, config.max_upload_bytes);
    let conversations = Arc::new(ConversationService::new(
        messages, media, delivery, responder,
    ));

    Ok(AppState {
        config,
        conversations,
        users,
        presence,
        hub,
        blobs: upstreams.blobs,
    })
}

pub fn router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid origin {:?}", origin);
                None
            }
        })
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(Any);

    // Embedded media arrives base64 encoded inside JSON
    let body_limit = state.config.max_upload_bytes * 2;

    Router::new()
        .route("/api/messages/users", get(handlers::list_contacts))
        .route("/api/messages/send/{receiver_id}", post(handlers::send_message))
        .route("/api/messages/{partner_id}", get(handlers::get_conversation))
        .route("/api/users/me", put(handlers::update_me))
        .route("/api/ai", get(handlers::ai_history))
        .route("/api/ai/send", post(handlers::send_ai_message))
        .route("/blobs/{hash}", get(handlers::get_blob))
        .route("/ws", get(handlers::ws_handler))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Already set by an embedding binary or test harness
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();

    info!("=== Chatty Server ===");

    let config = ChatServerConfig::from_env();
    info!("Storage directory: {:?}", config.storage_dir);
    info!("Users database: {:?}", config.users_db);

    let upstreams = Upstreams::from_config(&config).await?;
    let state = build_state(config, upstreams).await?;
    let presence = state.presence.clone();
    let port = state.config.port;

    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Chatty server listening on http://localhost:{}", port);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    presence.clear();
    info!("Chatty server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

async fn health_check() -> &'static str {
    "OK - Chatty Server"
}
