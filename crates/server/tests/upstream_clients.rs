//! HTTP clients against a local mock of the upstream services

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use chatty_server::media::{CloudinaryStore, ContentHint, MediaKind, ObjectStore, UploadError};
use chatty_server::responder::ai::{AI_QUOTA_EXCEEDED, AI_UNAVAILABLE};
use chatty_server::responder::{
    AiCallError, AiSkill, ContentPart, GeminiClient, GenerativeAi, HttpImageFetcher,
    ImageFetcher, OpenWeatherClient, Prompt, SkillKind, WeatherApi, WeatherSkill,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Default)]
struct Hits(Arc<AtomicUsize>);

impl Hits {
    fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

async fn overloaded(State(hits): State<Hits>) -> StatusCode {
    hits.bump();
    StatusCode::SERVICE_UNAVAILABLE
}

async fn quota(State(hits): State<Hits>) -> StatusCode {
    hits.bump();
    StatusCode::TOO_MANY_REQUESTS
}

async fn broken(State(hits): State<Hits>) -> StatusCode {
    hits.bump();
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn empty_reply(State(hits): State<Hits>) -> Json<Value> {
    hits.bump();
    Json(json!({"candidates": []}))
}

async fn generate(State(hits): State<Hits>, Json(body): Json<Value>) -> Json<Value> {
    hits.bump();
    let prompt = body["contents"][0]["parts"][0]["text"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    Json(json!({
        "candidates": [{"content": {"parts": [{"text": format!("  echo: {}  ", prompt)}]}}]
    }))
}

async fn image() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "image/png; charset=binary")], "png-bytes")
}

async fn geocode(Query(q): Query<HashMap<String, String>>) -> Result<Json<Value>, StatusCode> {
    if q.get("appid").map(String::as_str) != Some("test-key") {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let hits = if q.get("q").map(String::as_str) == Some("Kolkata") {
        json!([{"name": "Kolkata", "country": "IN", "lat": 22.57, "lon": 88.36}])
    } else {
        json!([])
    };
    Ok(Json(hits))
}

async fn current_weather(Query(q): Query<HashMap<String, String>>) -> Json<Value> {
    assert_eq!(q.get("units").map(String::as_str), Some("metric"));
    Json(json!({
        "dt": 1717223400,
        "timezone": 19800,
        "main": {"temp": 31.6, "feels_like": 36.2, "humidity": 70},
        "weather": [{"description": "haze"}],
        "wind": {"speed": 3.6},
        "clouds": {"all": 40},
        "sys": {"sunrise": 1717196400, "sunset": 1717243200}
    }))
}

async fn forecast() -> Json<Value> {
    let list: Vec<Value> = (0..8)
        .map(|i| {
            json!({
                "dt": 1717223400 + i * 10800,
                "main": {"temp": 30.0, "feels_like": 33.0, "humidity": 65},
                "weather": [{"description": "light rain"}],
                "wind": {"speed": 2.0}
            })
        })
        .collect();
    Json(json!({"list": list, "city": {"timezone": 19800}}))
}

async fn cloudinary_upload() -> Json<Value> {
    Json(json!({"secure_url": "https://res.cloudinary.test/demo/chat-images/abc.png"}))
}

async fn cloudinary_reject() -> StatusCode {
    StatusCode::BAD_REQUEST
}

async fn spawn_mock() -> (SocketAddr, Hits) {
    let hits = Hits::default();
    let app = Router::new()
        .route("/gemini/overloaded", post(overloaded))
        .route("/gemini/quota", post(quota))
        .route("/gemini/broken", post(broken))
        .route("/gemini/empty", post(empty_reply))
        .route("/gemini/ok", post(generate))
        .route("/img.png", get(image))
        .route("/geo/1.0/direct", get(geocode))
        .route("/data/2.5/weather", get(current_weather))
        .route("/data/2.5/forecast", get(forecast))
        .route("/v1_1/demo/image/upload", post(cloudinary_upload))
        .route("/v1_1/demo/video/upload", post(cloudinary_reject))
        .with_state(hits.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, hits)
}

fn gemini(addr: SocketAddr, route: &str) -> GeminiClient {
    GeminiClient::new(format!("http://{}/gemini/{}", addr, route), Duration::from_secs(5)).unwrap()
}

fn text(t: &str) -> Vec<ContentPart> {
    vec![ContentPart::Text(t.to_string())]
}

#[tokio::test]
async fn test_gemini_status_mapping() {
    let (addr, _) = spawn_mock().await;

    assert!(matches!(
        gemini(addr, "overloaded").complete(&text("hi")).await,
        Err(AiCallError::Overloaded)
    ));
    assert!(matches!(
        gemini(addr, "quota").complete(&text("hi")).await,
        Err(AiCallError::QuotaExceeded)
    ));
    assert!(matches!(
        gemini(addr, "broken").complete(&text("hi")).await,
        Err(AiCallError::Upstream(_))
    ));
    assert!(matches!(
        gemini(addr, "empty").complete(&text("hi")).await,
        Err(AiCallError::MalformedResponse)
    ));
    assert_eq!(
        gemini(addr, "ok").complete(&text("hi")).await.unwrap(),
        "  echo: hi  "
    );
}

fn skill_for(addr: SocketAddr, route: &str) -> AiSkill {
    AiSkill::new(
        Some(Arc::new(gemini(addr, route)) as Arc<dyn GenerativeAi>),
        Arc::new(HttpImageFetcher::new(Duration::from_secs(5)).unwrap()),
        Duration::from_millis(5),
    )
}

fn prompt(t: &str) -> Prompt {
    Prompt {
        text: Some(t.to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_ai_skill_retries_overload_three_times() {
    let (addr, hits) = spawn_mock().await;

    let reply = skill_for(addr, "overloaded").answer(&prompt("hi")).await;
    assert_eq!(reply.text, AI_UNAVAILABLE);
    assert_eq!(hits.count(), 3);
}

#[tokio::test]
async fn test_ai_skill_quota_is_single_attempt() {
    let (addr, hits) = spawn_mock().await;

    let reply = skill_for(addr, "quota").answer(&prompt("hi")).await;
    assert_eq!(reply.text, AI_QUOTA_EXCEEDED);
    assert_eq!(hits.count(), 1);
}

#[tokio::test]
async fn test_ai_skill_trims_reply() {
    let (addr, _) = spawn_mock().await;

    let reply = skill_for(addr, "ok").answer(&prompt("hello")).await;
    assert_eq!(reply.text, "echo: hello");
    assert_eq!(reply.skill, SkillKind::Ai);
    assert!(!reply.degraded);
}

#[tokio::test]
async fn test_image_fetcher_strips_content_type_params() {
    let (addr, _) = spawn_mock().await;

    let fetcher = HttpImageFetcher::new(Duration::from_secs(5)).unwrap();
    let image = fetcher
        .fetch(&format!("http://{}/img.png", addr))
        .await
        .unwrap();
    assert_eq!(image.mime_type, "image/png");
    assert_eq!(&image.bytes[..], b"png-bytes");

    assert!(fetcher
        .fetch(&format!("http://{}/missing.png", addr))
        .await
        .is_err());
}

fn openweather(addr: SocketAddr, key: &str) -> OpenWeatherClient {
    OpenWeatherClient::new(
        format!("http://{}", addr),
        Some(key.to_string()),
        Duration::from_secs(5),
    )
    .unwrap()
}

#[tokio::test]
async fn test_openweather_geocode_and_current() {
    let (addr, _) = spawn_mock().await;
    let client = openweather(addr, "test-key");

    let place = client.geocode("Kolkata").await.unwrap().unwrap();
    assert_eq!(place.country, "IN");
    assert!(client.geocode("Nowhereville").await.unwrap().is_none());

    let current = client.current(place.lat, place.lon).await.unwrap();
    assert_eq!(current.description, "haze");
    assert_eq!(current.utc_offset_secs, 19800);

    let forecast = client.forecast(place.lat, place.lon).await.unwrap();
    assert_eq!(forecast.entries.len(), 8);
}

#[tokio::test]
async fn test_openweather_bad_key_is_unavailable() {
    let (addr, _) = spawn_mock().await;
    let client = openweather(addr, "wrong-key");
    assert!(client.geocode("Kolkata").await.is_err());
}

#[tokio::test]
async fn test_weather_skill_end_to_end() {
    let (addr, _) = spawn_mock().await;
    let skill = WeatherSkill::new(Arc::new(openweather(addr, "test-key")));

    let current = skill.answer("weather in Kolkata").await;
    assert!(!current.degraded);
    assert!(current.text.contains("Kolkata, IN"), "{}", current.text);
    assert!(current.text.contains("32°C"), "{}", current.text);

    let forecast = skill.answer("forecast in Kolkata tomorrow").await;
    assert!(forecast.text.contains("light rain"), "{}", forecast.text);
}

#[tokio::test]
async fn test_cloudinary_upload_and_rejection() {
    let (addr, _) = spawn_mock().await;
    let store = CloudinaryStore::new("demo", "unsigned", Duration::from_secs(5))
        .unwrap()
        .with_api_base(format!("http://{}/v1_1", addr));

    let stored = store
        .upload(
            Bytes::from_static(b"png"),
            &ContentHint {
                kind: MediaKind::Image,
                mime_type: "image/png".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(stored.url, "https://res.cloudinary.test/demo/chat-images/abc.png");

    let err = store
        .upload(
            Bytes::from_static(b"ogg"),
            &ContentHint {
                kind: MediaKind::Audio,
                mime_type: "audio/ogg".into(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::Rejected(_)));
}
