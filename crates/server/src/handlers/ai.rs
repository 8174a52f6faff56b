//! AI thread handlers, a turn-shaped view of the conversation with the AI contact

use axum::{extract::State, http::StatusCode, Json};
use tracing::info;

use super::{AppState, CurrentUser};
use crate::error::Result;
use crate::models::{MessageInput, Turn};

/// GET /api/ai
pub async fn ai_history(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<Turn>>> {
    info!("GET /api/ai - for {}", user.user_id());
    let turns = state.conversations.ai_history(user.user_id()).await?;
    Ok(Json(turns))
}

/// POST /api/ai/send
pub async fn send_ai_message(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(input): Json<MessageInput>,
) -> Result<(StatusCode, Json<[Turn; 2]>)> {
    info!("POST /api/ai/send - from {}", user.user_id());
    let turns = state
        .conversations
        .send_ai_message(user.user_id(), input)
        .await?;
    Ok((StatusCode::CREATED, Json(turns)))
}
