//! Material catalog endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use spk_common::models::CatalogEntry;

use crate::catalog::storage::{split_eans, CatalogRow};
use crate::catalog::{ColorOption, ProductDescription};
use crate::{ApiError, ApiResult, AppState};

/// Catalog row as sent by the management UI
#[derive(Debug, Default, Deserialize)]
pub struct MaterialRequest {
    #[serde(default)]
    pub manufacturer: String,
    #[serde(default)]
    pub material: String,
    #[serde(default)]
    pub variation: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub colorname: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub ean: String,
}

impl MaterialRequest {
    fn require_tuple(&self) -> ApiResult<()> {
        let present = all_present(&[
            &self.manufacturer,
            &self.material,
            &self.name,
            &self.colorname,
            &self.color,
        ]);
        if !present {
            return Err(ApiError::BadRequest(
                "Manufacturer, material, name, colorname, and color are required".to_string(),
            ));
        }
        Ok(())
    }

    fn product(&self) -> ProductDescription {
        ProductDescription {
            manufacturer: self.manufacturer.clone(),
            material_type: self.material.clone(),
            display_name: self.name.clone(),
            color_name: self.colorname.clone(),
            color: self.color.clone(),
        }
    }

    fn into_entry(self) -> CatalogEntry {
        let mut entry = CatalogEntry {
            manufacturer: self.manufacturer,
            material_type: self.material,
            variation: self.variation,
            display_name: self.name,
            color_name: self.colorname,
            color: self.color,
            note: self.note,
            eans: Vec::new(),
        };
        for ean in split_eans(&self.ean) {
            entry.add_ean(ean);
        }
        entry
    }
}

#[derive(Debug, Deserialize)]
pub struct CustomColorRequest {
    #[serde(default)]
    pub material: String,
    #[serde(default)]
    pub colorname: String,
    #[serde(default)]
    pub color: String,
}

/// Product fields as named on a filament record
#[derive(Debug, Deserialize)]
pub struct FilamentProductRequest {
    #[serde(default)]
    pub manufacturer: String,
    #[serde(rename = "type", default)]
    pub material_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub colorname: String,
    #[serde(default)]
    pub color: String,
}

/// Catalog row found by barcode, tagged with where it came from
#[derive(Debug, Serialize)]
pub struct ProductInfo {
    #[serde(flatten)]
    pub row: CatalogRow,
    pub source: &'static str,
}

fn all_present(values: &[&String]) -> bool {
    values.iter().all(|v| !v.trim().is_empty())
}

/// GET /materials/types
pub async fn list_material_types(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.catalog.list_material_types().await)
}

/// GET /materials/:material_type/colors
pub async fn list_colors(
    State(state): State<AppState>,
    Path(material_type): Path<String>,
) -> Json<Vec<ColorOption>> {
    Json(state.catalog.list_colors(&material_type).await)
}

/// GET /materials/:material_type/variations
pub async fn list_variations(
    State(state): State<AppState>,
    Path(material_type): Path<String>,
) -> Json<Vec<String>> {
    Json(state.catalog.list_variations(&material_type).await)
}

/// GET /materials/all
pub async fn list_all_materials(State(state): State<AppState>) -> Json<Vec<CatalogRow>> {
    let entries = state.catalog.all().await;
    Json(entries.iter().map(CatalogRow::from).collect())
}

/// GET /product-info/:ean
pub async fn product_info(
    State(state): State<AppState>,
    Path(ean): Path<String>,
) -> ApiResult<Json<ProductInfo>> {
    let entry = state
        .catalog
        .lookup_by_ean(&ean)
        .await
        .ok_or_else(|| ApiError::NotFound("Product not found".to_string()))?;
    Ok(Json(ProductInfo {
        row: CatalogRow::from(&entry),
        source: "local_database",
    }))
}

/// POST /materials
///
/// Adds a custom colour for a material type.
pub async fn add_custom_color(
    State(state): State<AppState>,
    Json(request): Json<CustomColorRequest>,
) -> ApiResult<Json<Value>> {
    if !all_present(&[&request.material, &request.colorname, &request.color]) {
        return Err(ApiError::BadRequest(
            "Material, colorname, and color are required".to_string(),
        ));
    }

    let added = state
        .catalog
        .add_custom_color(&request.material, &request.colorname, &request.color)
        .await?;
    Ok(Json(json!({ "success": true, "added": added })))
}

/// POST /materials/update-ean
pub async fn update_ean(
    State(state): State<AppState>,
    Json(request): Json<MaterialRequest>,
) -> ApiResult<Json<Value>> {
    if request.ean.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "EAN, manufacturer, material, name, colorname, and color are required".to_string(),
        ));
    }
    request.require_tuple()?;

    let action = state
        .catalog
        .add_ean(&request.ean, &request.product())
        .await?;
    Ok(Json(json!({ "success": true, "action": action })))
}

/// POST /materials/update-from-filament
pub async fn update_from_filament(
    State(state): State<AppState>,
    Json(request): Json<FilamentProductRequest>,
) -> ApiResult<Json<Value>> {
    let present = all_present(&[
        &request.manufacturer,
        &request.material_type,
        &request.name,
        &request.colorname,
        &request.color,
    ]);
    if !present {
        return Err(ApiError::BadRequest(
            "Manufacturer, type, name, colorname, and color are required".to_string(),
        ));
    }

    let product = ProductDescription {
        manufacturer: request.manufacturer,
        material_type: request.material_type,
        display_name: request.name,
        color_name: request.colorname,
        color: request.color,
    };
    let (action, entry) = state.catalog.upsert_from_filament(&product).await?;
    Ok(Json(json!({
        "success": true,
        "action": action,
        "material": CatalogRow::from(&entry),
    })))
}

/// POST /materials/add
pub async fn add_material(
    State(state): State<AppState>,
    Json(request): Json<MaterialRequest>,
) -> ApiResult<Json<Value>> {
    request.require_tuple()?;

    if !state.catalog.insert_entry(request.into_entry()).await? {
        return Err(ApiError::Conflict(
            "Material already exists with the same properties".to_string(),
        ));
    }
    Ok(Json(json!({ "success": true, "message": "Material added successfully" })))
}

/// PUT /materials/update
///
/// Omitted variation, note or EANs keep their stored values.
pub async fn update_material(
    State(state): State<AppState>,
    Json(request): Json<MaterialRequest>,
) -> ApiResult<Json<Value>> {
    request.require_tuple()?;

    if !state.catalog.update_entry(request.into_entry()).await? {
        return Err(ApiError::NotFound("Material not found".to_string()));
    }
    Ok(Json(json!({ "success": true, "message": "Material updated successfully" })))
}

/// DELETE /materials/delete
pub async fn delete_material(
    State(state): State<AppState>,
    Json(request): Json<MaterialRequest>,
) -> ApiResult<Json<Value>> {
    request.require_tuple()?;

    if !state.catalog.delete_entry(&request.product()).await? {
        return Err(ApiError::NotFound("Material not found".to_string()));
    }
    Ok(Json(json!({ "success": true, "message": "Material deleted successfully" })))
}
