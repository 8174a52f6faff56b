//! Contact list and profile hand-off

use axum::{extract::State, Json};
use serde::Deserialize;
use tracing::info;

use super::{AppState, CurrentUser};
use crate::error::{Error, Result};
use crate::models::{is_ai_user, User};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub full_name: String,
    pub profile_pic: Option<String>,
}

/// GET /api/messages/users
///
/// Everyone except the caller, with the AI contact first.
pub async fn list_contacts(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<User>>> {
    info!("GET /api/messages/users - for {}", user.user_id());
    let contacts = state.users.contacts_for(user.user_id()).await?;
    Ok(Json(contacts))
}

/// PUT /api/users/me
pub async fn update_me(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<User>> {
    info!("PUT /api/users/me - {}", user.user_id());

    if is_ai_user(user.user_id()) {
        return Err(Error::Validation("The AI contact has no profile".into()));
    }
    let full_name = req.full_name.trim();
    if full_name.is_empty() {
        return Err(Error::Validation("Full name is required".into()));
    }

    let profile_pic = req.profile_pic.as_deref().filter(|p| !p.trim().is_empty());
    let updated = state
        .users
        .upsert(user.user_id(), full_name, profile_pic)
        .await?;
    Ok(Json(updated))
}
