//! AMS unit configuration endpoints

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use spk_common::models::{AmsConfig, AmsKind};

use super::auth::AuthUser;
use crate::store::{AmsConfigPatch, NewAmsConfig};
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct AmsConfigRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub sensor: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

fn parse_kind(raw: &str) -> ApiResult<AmsKind> {
    serde_json::from_value(Value::String(raw.to_string()))
        .map_err(|_| ApiError::BadRequest("Invalid AMS type".to_string()))
}

/// GET /ams-config
pub async fn list_ams_configs(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
) -> Json<Vec<AmsConfig>> {
    Json(state.store.ams_configs(&user.id).await)
}

/// POST /ams-config
pub async fn add_ams_config(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Json(request): Json<AmsConfigRequest>,
) -> ApiResult<Json<AmsConfig>> {
    let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
    let (Some(name), Some(kind), Some(sensor)) = (
        non_empty(request.name),
        non_empty(request.kind),
        non_empty(request.sensor),
    ) else {
        return Err(ApiError::BadRequest("Missing required fields".to_string()));
    };

    let config = state
        .store
        .add_ams_config(
            &user.id,
            NewAmsConfig {
                name,
                kind: parse_kind(&kind)?,
                sensor,
                enabled: request.enabled.unwrap_or(true),
            },
        )
        .await?;
    Ok(Json(config))
}

/// PUT /ams-config/:id
pub async fn update_ams_config(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(request): Json<AmsConfigRequest>,
) -> ApiResult<Json<AmsConfig>> {
    let patch = AmsConfigPatch {
        name: request.name,
        kind: request.kind.as_deref().map(parse_kind).transpose()?,
        sensor: request.sensor,
        enabled: request.enabled,
    };

    let config = state
        .store
        .update_ams_config(&user.id, &id, patch)
        .await?
        .ok_or_else(|| ApiError::NotFound("AMS configuration not found".to_string()))?;
    Ok(Json(config))
}

/// DELETE /ams-config/:id
pub async fn delete_ams_config(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    if !state.store.delete_ams_config(&user.id, &id).await? {
        return Err(ApiError::NotFound("AMS configuration not found".to_string()));
    }
    Ok(Json(json!({ "success": true })))
}
