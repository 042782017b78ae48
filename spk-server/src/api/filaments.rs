//! Filament inventory endpoints

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use spk_common::models::{CatalogEntry, FilamentRecord, User};
use std::collections::BTreeMap;
use tracing::info;

use super::auth::AuthUser;
use crate::store::FilamentFields;
use crate::{ApiError, ApiResult, AppState};

/// Filament record annotated with its owner's username
#[derive(Debug, Serialize)]
pub struct FilamentView {
    #[serde(flatten)]
    pub record: FilamentRecord,
    pub username: String,
}

impl FilamentView {
    fn new(mut record: FilamentRecord, username: String) -> Self {
        // Older files stored the owner's name on the record itself
        record.extra.remove("username");
        Self { record, username }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(rename = "viewAll", default)]
    pub view_all: bool,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    #[serde(rename = "tag_uid")]
    pub tag_id: String,
}

fn annotate(records: Vec<FilamentRecord>, usernames: &BTreeMap<String, String>) -> Vec<FilamentView> {
    records
        .into_iter()
        .map(|record| {
            let username = usernames
                .get(&record.owner_id)
                .cloned()
                .unwrap_or_else(|| "Unknown".to_string());
            FilamentView::new(record, username)
        })
        .collect()
}

async fn owner_filaments(state: &AppState, user: &User) -> Vec<FilamentView> {
    let usernames = state.store.usernames().await;
    annotate(state.store.get_by_owner(&user.id).await, &usernames)
}

/// GET /filaments[?viewAll=true]
pub async fn list_filaments(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<FilamentView>> {
    if query.view_all {
        let usernames = state.store.usernames().await;
        return Json(annotate(state.store.get_all().await, &usernames));
    }
    Json(owner_filaments(&state, &user).await)
}

/// GET /filaments/search/:code
///
/// Matches the caller's records by tag or serial number.
pub async fn search_filament(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(code): Path<String>,
) -> ApiResult<Json<FilamentView>> {
    let record = state
        .store
        .find_by_code(&user.id, &code)
        .await
        .ok_or_else(|| ApiError::NotFound("Filament not found".to_string()))?;
    Ok(Json(FilamentView::new(record, user.username)))
}

/// POST /update
///
/// Updates the record named by `tag_uid` if it exists, otherwise creates
/// one. A new, fully described filament also seeds the catalog when the
/// product is not in it yet. Returns the caller's filaments.
pub async fn update_filament(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Json(fields): Json<FilamentFields>,
) -> ApiResult<Json<Vec<FilamentView>>> {
    let existing = match fields.tag_id.as_deref().filter(|t| !t.is_empty()) {
        Some(tag) => state.store.get_by_tag(tag).await,
        None => None,
    };

    match existing {
        Some(record) => {
            if record.owner_id != user.id && !user.is_admin() {
                return Err(ApiError::Forbidden("Forbidden".to_string()));
            }
            state.store.update(&record.tag_id, fields).await?;
        }
        None => {
            let catalog_entry = described_product(&fields);
            let created = state.store.create(&user.id, fields).await?;
            info!(tag = %created.tag_id, username = %user.username, "Filament added");

            if let Some(entry) = catalog_entry {
                if state.catalog.insert_entry(entry).await? {
                    info!(name = %created.display_name, colorname = %created.color_name, "Added new material to catalog");
                }
            }
        }
    }

    Ok(Json(owner_filaments(&state, &user).await))
}

/// Catalog entry for a filament that names every descriptive field
fn described_product(fields: &FilamentFields) -> Option<CatalogEntry> {
    let present = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);

    Some(CatalogEntry {
        manufacturer: present(&fields.manufacturer)?,
        material_type: present(&fields.material_type)?,
        display_name: present(&fields.display_name)?,
        color_name: present(&fields.color_name)?,
        color: present(&fields.color)?,
        variation: fields.variation.clone().unwrap_or_default(),
        ..Default::default()
    })
}

/// POST /delete
///
/// Only the owner or an admin may delete. Returns the caller's filaments.
pub async fn delete_filament(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Json(request): Json<DeleteRequest>,
) -> ApiResult<Json<Vec<FilamentView>>> {
    let record = state
        .store
        .get_by_tag(&request.tag_id)
        .await
        .ok_or_else(|| ApiError::NotFound("Filament not found".to_string()))?;

    if record.owner_id != user.id && !user.is_admin() {
        return Err(ApiError::Forbidden("Forbidden".to_string()));
    }

    state.store.delete(&record.tag_id).await?;
    info!(tag = %record.tag_id, username = %user.username, "Filament deleted");
    Ok(Json(owner_filaments(&state, &user).await))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_described_product_requires_every_field() {
        let mut fields = FilamentFields {
            manufacturer: Some("BambuLab".into()),
            material_type: Some("PLA".into()),
            display_name: Some("Bambu PLA Basic".into()),
            color_name: Some("Red".into()),
            color: Some("#FF0000".into()),
            ..Default::default()
        };
        let entry = described_product(&fields).unwrap();
        assert_eq!(entry.color_name, "Red");

        fields.color_name = Some("  ".into());
        assert!(described_product(&fields).is_none());
    }
}
