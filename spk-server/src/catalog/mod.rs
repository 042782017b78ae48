//! Material catalog: reference metadata for filament products
//!
//! Answers "which product is this (name, colour)?" for the tray
//! reconciler, and backs the material management endpoints. The dataset is
//! loaded once at startup and rewritten in full after every mutation.

mod hint;
pub mod storage;

pub use hint::{material_type_hint, recognize_material, strip_brand_prefix};

use serde::Serialize;
use spk_common::color::{self, Rgb};
use spk_common::models::CatalogEntry;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::persist::write_json_atomic;
use storage::CatalogRow;

/// Manufacturer recorded for custom colours added without one
pub const DEFAULT_MANUFACTURER: &str = "BambuLab";

/// Catalog errors
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Material dataset not found: {0}")]
    Missing(PathBuf),

    #[error("Material dataset I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Material dataset is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Outcome of [`MaterialCatalog::upsert_from_filament`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertAction {
    Exists,
    Updated,
    Created,
}

/// Outcome of [`MaterialCatalog::add_ean`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EanAction {
    Updated,
    EanAdded,
    Created,
}

/// Descriptive tuple identifying a catalog product
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductDescription {
    pub manufacturer: String,
    pub material_type: String,
    pub display_name: String,
    pub color_name: String,
    pub color: String,
}

impl ProductDescription {
    fn to_entry(&self, note: &str) -> CatalogEntry {
        CatalogEntry {
            manufacturer: self.manufacturer.clone(),
            material_type: self.material_type.clone(),
            display_name: self.display_name.clone(),
            color_name: self.color_name.clone(),
            color: color::normalize(&self.color),
            note: note.to_string(),
            ..Default::default()
        }
    }
}

/// Colour choice offered for a material type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColorOption {
    pub colorname: String,
    pub color: String,
    pub note: String,
}

/// A barcode attached to products that disagree on colour
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EanConflict {
    pub ean: String,
    /// `(display_name, color_name, color)` of every entry carrying the code
    pub products: Vec<(String, String, String)>,
}

/// In-memory reference table with write-through persistence
pub struct MaterialCatalog {
    path: PathBuf,
    color_threshold: f64,
    entries: RwLock<Vec<CatalogEntry>>,
}

impl MaterialCatalog {
    /// Load the dataset at `path`. Fails fast when the file is missing.
    pub async fn load(path: impl Into<PathBuf>, color_threshold: f64) -> Result<Self, CatalogError> {
        let path = path.into();
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CatalogError::Missing(path));
            }
            Err(e) => return Err(e.into()),
        };
        let rows: Vec<CatalogRow> = serde_json::from_str(&content)?;
        let entries: Vec<CatalogEntry> = rows.into_iter().map(CatalogEntry::from).collect();
        info!("Loaded {} materials from {}", entries.len(), path.display());

        Ok(Self::with_entries(path, color_threshold, entries))
    }

    /// Load the dataset, or start empty when it does not exist.
    ///
    /// Unreadable or malformed datasets are still errors.
    pub async fn load_or_empty(
        path: impl Into<PathBuf>,
        color_threshold: f64,
    ) -> Result<Self, CatalogError> {
        let path = path.into();
        match Self::load(path.clone(), color_threshold).await {
            Err(CatalogError::Missing(missing)) => {
                warn!(
                    "Material dataset {} not found, starting with an empty catalog",
                    missing.display()
                );
                Ok(Self::with_entries(path, color_threshold, Vec::new()))
            }
            other => other,
        }
    }

    /// Build a catalog from entries already in memory
    pub fn with_entries(path: impl Into<PathBuf>, color_threshold: f64, entries: Vec<CatalogEntry>) -> Self {
        Self {
            path: path.into(),
            color_threshold,
            entries: RwLock::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Snapshot of every entry
    pub async fn all(&self) -> Vec<CatalogEntry> {
        self.entries.read().await.clone()
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    /// Exact name + colour match, then nearest colour among entries with
    /// the same name, then a material-type search using a hint derived
    /// from the name when no entry carries that name at all.
    pub async fn lookup_by_name_and_color(&self, display_name: &str, color: &str) -> Option<CatalogEntry> {
        let entries = self.entries.read().await;
        find_by_name_and_color(&entries, display_name, color, self.color_threshold).cloned()
    }

    /// Exact material + colour match, then nearest colour within the material
    pub async fn lookup_by_material_type_and_color(
        &self,
        material_type: &str,
        color: &str,
    ) -> Option<CatalogEntry> {
        let entries = self.entries.read().await;
        find_by_material_and_color(&entries, material_type, color, self.color_threshold).cloned()
    }

    /// Entry carrying the given barcode
    pub async fn lookup_by_ean(&self, ean: &str) -> Option<CatalogEntry> {
        let ean = ean.trim();
        self.entries
            .read()
            .await
            .iter()
            .find(|e| e.has_ean(ean))
            .cloned()
    }

    /// Distinct material types, sorted
    pub async fn list_material_types(&self) -> Vec<String> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| !e.material_type.is_empty())
            .map(|e| e.material_type.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Colours of a material type; a repeated colour name keeps its first entry
    pub async fn list_colors(&self, material_type: &str) -> Vec<ColorOption> {
        let entries = self.entries.read().await;
        let mut seen = BTreeSet::new();
        entries
            .iter()
            .filter(|e| e.material_type == material_type)
            .filter(|e| seen.insert(e.color_name.clone()))
            .map(|e| ColorOption {
                colorname: e.color_name.clone(),
                color: e.color.clone(),
                note: e.note.clone(),
            })
            .collect()
    }

    /// Distinct variations of a material type offered by Bambu, sorted
    pub async fn list_variations(&self, material_type: &str) -> Vec<String> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| e.manufacturer.to_lowercase().contains("bambu"))
            .filter(|e| e.material_type == material_type && !e.variation.is_empty())
            .map(|e| e.variation.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    // ------------------------------------------------------------------
    // Mutations (each persists before returning)
    // ------------------------------------------------------------------

    /// Record the product described by a user-edited filament.
    ///
    /// - exact tuple present → `Exists`, nothing written
    /// - same tuple with another colour → colour overwritten, `Updated`
    /// - otherwise a new "Custom" entry is appended, `Created`
    pub async fn upsert_from_filament(
        &self,
        product: &ProductDescription,
    ) -> Result<(UpsertAction, CatalogEntry), CatalogError> {
        let mut entries = self.entries.write().await;
        let candidate = product.to_entry("Custom");

        if let Some(existing) = entries.iter().find(|e| e.same_product(&candidate)) {
            debug!(name = %product.display_name, "Material already exists, no update needed");
            return Ok((UpsertAction::Exists, existing.clone()));
        }

        let (action, entry) =
            if let Some(existing) = entries.iter_mut().find(|e| e.same_product_ignoring_color(&candidate)) {
                existing.color = candidate.color.clone();
                (UpsertAction::Updated, existing.clone())
            } else {
                entries.push(candidate.clone());
                (UpsertAction::Created, candidate)
            };

        self.persist(&entries).await?;
        info!(
            name = %entry.display_name,
            colorname = %entry.color_name,
            action = ?action,
            "Material recorded from filament"
        );
        Ok((action, entry))
    }

    /// Attach a barcode to a product.
    ///
    /// - barcode already known → that entry's descriptive fields are
    ///   overwritten, `Updated`
    /// - identical product exists → barcode appended to its set, `EanAdded`
    /// - otherwise a new entry carrying the barcode, `Created`
    pub async fn add_ean(
        &self,
        ean: &str,
        product: &ProductDescription,
    ) -> Result<EanAction, CatalogError> {
        let ean = ean.trim();
        let mut entries = self.entries.write().await;
        let candidate = product.to_entry("Custom");

        let action = if let Some(existing) = entries.iter_mut().find(|e| e.has_ean(ean)) {
            existing.manufacturer = candidate.manufacturer;
            existing.material_type = candidate.material_type;
            existing.display_name = candidate.display_name;
            existing.color_name = candidate.color_name;
            existing.color = candidate.color;
            EanAction::Updated
        } else if let Some(existing) = entries.iter_mut().find(|e| e.same_product(&candidate)) {
            existing.add_ean(ean);
            EanAction::EanAdded
        } else {
            let mut entry = candidate;
            entry.add_ean(ean);
            entries.push(entry);
            EanAction::Created
        };

        self.persist(&entries).await?;
        info!(ean = %ean, name = %product.display_name, action = ?action, "Barcode recorded");
        Ok(action)
    }

    /// Add a custom colour for a material type. Returns false if the
    /// material/colour-name/colour combination already exists.
    pub async fn add_custom_color(
        &self,
        material_type: &str,
        color_name: &str,
        color: &str,
    ) -> Result<bool, CatalogError> {
        let color = color::normalize(color);
        let mut entries = self.entries.write().await;

        let exists = entries.iter().any(|e| {
            e.material_type == material_type && e.color_name == color_name && e.color == color
        });
        if exists {
            return Ok(false);
        }

        entries.push(CatalogEntry {
            manufacturer: DEFAULT_MANUFACTURER.to_string(),
            material_type: material_type.to_string(),
            display_name: format!("Bambu {}", material_type),
            color_name: color_name.to_string(),
            color,
            note: "Custom".to_string(),
            ..Default::default()
        });
        self.persist(&entries).await?;
        info!("Added new material: {} - {}", material_type, color_name);
        Ok(true)
    }

    /// Insert a full entry unless the exact product already exists.
    /// Returns false when it does.
    pub async fn insert_entry(&self, entry: CatalogEntry) -> Result<bool, CatalogError> {
        let mut entry = entry;
        entry.color = color::normalize(&entry.color);

        let mut entries = self.entries.write().await;
        if entries.iter().any(|e| e.same_product(&entry)) {
            return Ok(false);
        }
        entries.push(entry);
        self.persist(&entries).await?;
        Ok(true)
    }

    /// Replace the entry matching manufacturer, material type, display name
    /// and colour name. Empty variation, note or barcode set in `entry` keep
    /// the stored values. Returns false when no entry matches.
    pub async fn update_entry(&self, entry: CatalogEntry) -> Result<bool, CatalogError> {
        let mut entries = self.entries.write().await;
        let Some(existing) = entries.iter_mut().find(|e| e.same_product_ignoring_color(&entry)) else {
            return Ok(false);
        };

        existing.color = color::normalize(&entry.color);
        if !entry.variation.is_empty() {
            existing.variation = entry.variation;
        }
        if !entry.note.is_empty() {
            existing.note = entry.note;
        }
        if !entry.eans.is_empty() {
            existing.eans = entry.eans;
        }

        self.persist(&entries).await?;
        Ok(true)
    }

    /// Remove the entry matching the full descriptive tuple.
    /// Returns false when nothing matched.
    pub async fn delete_entry(&self, product: &ProductDescription) -> Result<bool, CatalogError> {
        let target = product.to_entry("");
        let mut entries = self.entries.write().await;
        let Some(index) = entries.iter().position(|e| e.same_product(&target)) else {
            return Ok(false);
        };
        entries.remove(index);
        self.persist(&entries).await?;
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Collapse entries describing the same product into the first
    /// occurrence, unioning their barcodes. Returns the number removed.
    pub async fn merge_duplicates(&self) -> Result<usize, CatalogError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();

        let mut merged: Vec<CatalogEntry> = Vec::with_capacity(before);
        for entry in entries.drain(..) {
            match merged.iter_mut().find(|m| m.same_product(&entry)) {
                Some(first) => {
                    for ean in &entry.eans {
                        first.add_ean(ean);
                    }
                }
                None => merged.push(entry),
            }
        }
        *entries = merged;

        let removed = before - entries.len();
        if removed > 0 {
            self.persist(&entries).await?;
            info!("Merged {} duplicate materials ({} remain)", removed, entries.len());
        }
        Ok(removed)
    }

    /// Barcodes shared by entries with different colour names or colours
    pub async fn conflicting_eans(&self) -> Vec<EanConflict> {
        let entries = self.entries.read().await;
        let mut by_ean: BTreeMap<&str, Vec<&CatalogEntry>> = BTreeMap::new();
        for entry in entries.iter() {
            for ean in &entry.eans {
                by_ean.entry(ean.as_str()).or_default().push(entry);
            }
        }

        by_ean
            .into_iter()
            .filter(|(_, owners)| {
                let variants: BTreeSet<(&str, &str)> = owners
                    .iter()
                    .map(|e| (e.color_name.as_str(), e.color.as_str()))
                    .collect();
                variants.len() > 1
            })
            .map(|(ean, owners)| EanConflict {
                ean: ean.to_string(),
                products: owners
                    .iter()
                    .map(|e| (e.display_name.clone(), e.color_name.clone(), e.color.clone()))
                    .collect(),
            })
            .collect()
    }

    async fn persist(&self, entries: &[CatalogEntry]) -> Result<(), CatalogError> {
        let rows: Vec<CatalogRow> = entries.iter().map(CatalogRow::from).collect();
        write_json_atomic(&self.path, &rows).await?;
        debug!("Saved {} materials to {}", rows.len(), self.path.display());
        Ok(())
    }
}

fn find_by_name_and_color<'a>(
    entries: &'a [CatalogEntry],
    display_name: &str,
    color: &str,
    threshold: f64,
) -> Option<&'a CatalogEntry> {
    let target = color::normalize(color);

    if let Some(exact) = entries
        .iter()
        .find(|e| e.display_name == display_name && e.color == target)
    {
        debug!(name = %display_name, colorname = %exact.color_name, "Exact catalog match by name");
        return Some(exact);
    }

    let named: Vec<&CatalogEntry> = entries
        .iter()
        .filter(|e| e.display_name == display_name)
        .collect();

    if named.is_empty() {
        let hint = material_type_hint(display_name);
        debug!(name = %display_name, hint = %hint, "No catalog entry with this name, trying material type");
        return find_by_material_and_color(entries, &hint, &target, threshold);
    }

    nearest(&named, &target, threshold)
}

fn find_by_material_and_color<'a>(
    entries: &'a [CatalogEntry],
    material_type: &str,
    color: &str,
    threshold: f64,
) -> Option<&'a CatalogEntry> {
    let target = color::normalize(color);

    if let Some(exact) = entries
        .iter()
        .find(|e| e.material_type == material_type && e.color == target)
    {
        debug!(material = %material_type, colorname = %exact.color_name, "Exact catalog match by material");
        return Some(exact);
    }

    let typed: Vec<&CatalogEntry> = entries
        .iter()
        .filter(|e| e.material_type == material_type)
        .collect();
    nearest(&typed, &target, threshold)
}

fn nearest<'a>(candidates: &[&'a CatalogEntry], target: &str, threshold: f64) -> Option<&'a CatalogEntry> {
    let target_rgb = Rgb::parse(target)?;
    let keyed = candidates
        .iter()
        .filter_map(|e| Rgb::parse(&e.color).map(|rgb| (*e, rgb)));

    match color::find_closest(target_rgb, keyed, threshold) {
        Some((entry, distance)) => {
            debug!(
                colorname = %entry.color_name,
                distance = format!("{:.2}", distance),
                "Closest catalog colour"
            );
            Some(entry)
        }
        None => {
            debug!(candidates = candidates.len(), "No catalog colour within threshold");
            None
        }
    }
}
