//! Home Assistant push and manual sync endpoints

use axum::{extract::State, Extension, Json};
use spk_common::models::TraySnapshot;
use tracing::info;

use super::auth::AuthUser;
use crate::reconcile::ReconcileOutcome;
use crate::sync::SyncReport;
use crate::{ApiResult, AppState};

/// POST /hass/webhook
///
/// Body is a single tray snapshot; replies with the reconciliation outcome.
/// An invalid tag is reported in the body (`success: false`), not as an
/// HTTP error.
pub async fn hass_webhook(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Json(snapshot): Json<TraySnapshot>,
) -> ApiResult<Json<ReconcileOutcome>> {
    let outcome = state.reconciler.reconcile_one(&user.id, &snapshot).await?;
    info!(
        username = %user.username,
        tag = %snapshot.tag_id,
        action = ?outcome.action,
        "Webhook tray processed"
    );
    Ok(Json(outcome))
}

/// POST /hass/sync
///
/// Runs one polling pass for the caller right away.
pub async fn hass_sync(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
) -> ApiResult<Json<SyncReport>> {
    let report = state.scheduler.run_once(&user.id).await?;
    Ok(Json(report))
}
