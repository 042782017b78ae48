//! Registration and account settings

use axum::{extract::State, Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use spk_common::models::{HassMode, Role, User};
use tracing::{info, warn};

use super::auth::AuthUser;
use crate::store::{NewUser, UserSettingsPatch};
use crate::{ApiError, ApiResult, AppState};

/// Account as shown to its owner. Secrets are never echoed.
#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: Role,
    #[serde(rename = "hassUrl")]
    pub hass_url: String,
    #[serde(rename = "trayName")]
    pub tray_name: String,
    #[serde(rename = "hassMode")]
    pub hass_mode: HassMode,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role,
            hass_url: user.hass_url.clone(),
            tray_name: user.tray_name.clone(),
            hass_mode: user.hass_mode,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(rename = "adminKey", default)]
    pub admin_key: String,
    #[serde(default)]
    pub role: Option<Role>,
}

/// POST /register
///
/// Creates an account when the caller knows the admin registration key.
/// The response carries the new user's API token; it is not shown again.
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<Json<Value>> {
    if request.username.trim().is_empty() || request.email.trim().is_empty() {
        return Err(ApiError::BadRequest("Missing required fields".to_string()));
    }
    if request.admin_key != *state.admin_key {
        warn!(username = %request.username, "Registration rejected: invalid admin key");
        return Err(ApiError::Forbidden(
            "Invalid admin key. Only administrators can create new users.".to_string(),
        ));
    }

    let user = state
        .store
        .create_user(NewUser {
            username: request.username.trim().to_string(),
            email: request.email.trim().to_string(),
            role: request.role.unwrap_or_default(),
        })
        .await?;
    info!(username = %user.username, "Registered user");

    Ok(Json(json!({
        "message": "User created successfully",
        "user": UserView::from(&user),
        "apiToken": user.api_token,
    })))
}

/// GET /user/me
pub async fn get_me(Extension(AuthUser(user)): Extension<AuthUser>) -> Json<UserView> {
    Json(UserView::from(&user))
}

/// PUT /user/settings
pub async fn update_settings(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Json(patch): Json<UserSettingsPatch>,
) -> ApiResult<Json<UserView>> {
    let updated = state
        .store
        .update_user_settings(&user.id, patch)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    info!(username = %updated.username, mode = ?updated.hass_mode, "Updated user settings");
    Ok(Json(UserView::from(&updated)))
}
