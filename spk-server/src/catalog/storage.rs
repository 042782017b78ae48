//! On-disk layout of the material reference dataset
//!
//! The dataset is a JSON array of flat objects. Barcodes live in a single
//! comma-joined `ean` string; that quirk stays at this boundary and the rest
//! of the crate sees `CatalogEntry::eans` as a list.

use serde::{Deserialize, Deserializer, Serialize};
use spk_common::color;
use spk_common::models::CatalogEntry;

/// One dataset row exactly as stored
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogRow {
    #[serde(default)]
    pub manufacturer: String,
    #[serde(default)]
    pub material: String,
    #[serde(default, deserialize_with = "nullable")]
    pub variation: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub colorname: String,
    #[serde(default)]
    pub color: String,
    #[serde(default, deserialize_with = "nullable")]
    pub note: String,
    #[serde(default, deserialize_with = "nullable")]
    pub ean: String,
}

impl From<CatalogRow> for CatalogEntry {
    fn from(row: CatalogRow) -> Self {
        let mut entry = CatalogEntry {
            manufacturer: row.manufacturer,
            material_type: row.material,
            variation: row.variation,
            display_name: row.name,
            color_name: row.colorname,
            color: color::normalize(&row.color),
            note: row.note,
            eans: Vec::new(),
        };
        for ean in split_eans(&row.ean) {
            entry.add_ean(ean);
        }
        entry
    }
}

impl From<&CatalogEntry> for CatalogRow {
    fn from(entry: &CatalogEntry) -> Self {
        Self {
            manufacturer: entry.manufacturer.clone(),
            material: entry.material_type.clone(),
            variation: entry.variation.clone(),
            name: entry.display_name.clone(),
            colorname: entry.color_name.clone(),
            color: entry.color.clone(),
            note: entry.note.clone(),
            ean: join_eans(&entry.eans),
        }
    }
}

/// Older rows carry `null` instead of an empty string
fn nullable<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Split a stored `ean` field into individual trimmed codes
pub fn split_eans(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// Join codes back into the stored representation
pub fn join_eans(eans: &[String]) -> String {
    eans.join(",")
}
