//! Direct message handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use super::{AppState, CurrentUser};
use crate::error::Result;
use crate::models::{Message, MessageInput};

/// POST /api/messages/send/{receiver_id}
///
/// Stores the message and pushes it to both participants. Messages to the
/// AI contact are answered before this returns; the answer arrives over the
/// socket.
pub async fn send_message(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(receiver_id): Path<String>,
    Json(input): Json<MessageInput>,
) -> Result<(StatusCode, Json<Message>)> {
    info!("POST /api/messages/send/{} - from {}", receiver_id, user.user_id());

    let outcome = state
        .conversations
        .send_message(user.user_id(), &receiver_id, input)
        .await?;

    Ok((StatusCode::CREATED, Json(outcome.message)))
}

/// GET /api/messages/{partner_id}
pub async fn get_conversation(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(partner_id): Path<String>,
) -> Result<Json<Vec<Message>>> {
    info!("GET /api/messages/{} - for {}", partner_id, user.user_id());

    let messages = state
        .conversations
        .get_conversation(user.user_id(), &partner_id)
        .await?;

    Ok(Json(messages))
}
