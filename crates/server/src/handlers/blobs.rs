//! Serving media held by the local blob store

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
};
use bytes::Bytes;
use tracing::{error, info};

use super::AppState;

/// GET /blobs/{hash}
pub async fn get_blob(
    Path(hash): Path<String>,
    State(state): State<AppState>,
) -> Result<(HeaderMap, Bytes), StatusCode> {
    info!("GET /blobs/{}", hash);

    let blobs = state.blobs.as_ref().ok_or(StatusCode::NOT_FOUND)?;
    let (data, meta) = blobs
        .get(&hash)
        .await
        .map_err(|e| {
            error!("Failed to get blob: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&meta.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );

    Ok((headers, data))
}
