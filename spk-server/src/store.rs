//! Inventory store: users, filament records and AMS configurations
//!
//! The whole inventory lives in one JSON document (`database.json`). It is
//! held in memory behind a lock and rewritten in full before any mutating
//! call returns, so a successful return means the change is on disk.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use spk_common::color;
use spk_common::models::{
    AmsConfig, AmsKind, FilamentRecord, HassMode, Role, User, DEFAULT_SPOOL_SIZE_GRAMS,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::persist::write_json_atomic;

/// Placeholder for descriptive fields a manual entry leaves blank
pub const UNKNOWN: &str = "Unknown";

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Inventory I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Inventory document is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Username already exists: {0}")]
    DuplicateUsername(String),
}

/// On-disk layout of `database.json`
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StoreDocument {
    #[serde(default)]
    pub users: BTreeMap<String, User>,
    #[serde(default)]
    pub filaments: BTreeMap<String, FilamentRecord>,
    #[serde(rename = "amsConfigs", default)]
    pub ams_configs: BTreeMap<String, Vec<AmsConfig>>,
}

/// Filament fields supplied by a caller.
///
/// Used both for creation (absent fields take defaults) and as a patch
/// (absent fields are left alone). Field names follow the stored layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilamentFields {
    #[serde(rename = "tag_uid", default, skip_serializing_if = "Option::is_none")]
    pub tag_id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub material_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(rename = "name", default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variation: Option<String>,
    #[serde(rename = "colorname", default, skip_serializing_if = "Option::is_none")]
    pub color_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(rename = "size", default, skip_serializing_if = "Option::is_none")]
    pub spool_size_grams: Option<u32>,
    #[serde(rename = "remain", default, skip_serializing_if = "Option::is_none")]
    pub remaining_percent: Option<i32>,
    #[serde(rename = "empty", default, skip_serializing_if = "Option::is_none")]
    pub is_empty: Option<bool>,
    #[serde(rename = "tracking", default, skip_serializing_if = "Option::is_none")]
    pub is_sensor_tracked: Option<bool>,
    #[serde(rename = "serialNumber", default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
}

impl FilamentFields {
    /// Fields describing an existing record, for re-creation under a new tag
    pub fn from_record(record: &FilamentRecord) -> Self {
        Self {
            tag_id: Some(record.tag_id.clone()),
            material_type: Some(record.material_type.clone()),
            manufacturer: Some(record.manufacturer.clone()),
            display_name: Some(record.display_name.clone()),
            variation: Some(record.variation.clone()),
            color_name: Some(record.color_name.clone()),
            color: Some(record.color.clone()),
            spool_size_grams: Some(record.spool_size_grams),
            remaining_percent: Some(record.remaining_percent),
            is_empty: Some(record.is_empty),
            is_sensor_tracked: Some(record.is_sensor_tracked),
            serial_number: record.serial_number.clone(),
        }
    }

    fn apply_to(self, record: &mut FilamentRecord) {
        if let Some(v) = self.material_type {
            record.material_type = v;
        }
        if let Some(v) = self.manufacturer {
            record.manufacturer = v;
        }
        if let Some(v) = self.display_name {
            record.display_name = v;
        }
        if let Some(v) = self.variation {
            record.variation = v;
        }
        if let Some(v) = self.color_name {
            record.color_name = v;
        }
        if let Some(v) = self.color {
            record.color = color::normalize(&v);
        }
        if let Some(v) = self.spool_size_grams {
            record.spool_size_grams = v;
        }
        if let Some(v) = self.remaining_percent {
            record.remaining_percent = v;
        }
        if let Some(v) = self.is_empty {
            record.is_empty = v;
        }
        if let Some(v) = self.is_sensor_tracked {
            record.is_sensor_tracked = v;
        }
        if self.serial_number.is_some() {
            record.serial_number = self.serial_number;
        }
    }
}

/// Descriptive fields used to find a manual spool awaiting a tag
#[derive(Debug, Clone, Copy)]
pub struct SpoolSpec<'a> {
    pub material_type: &'a str,
    pub manufacturer: &'a str,
    pub display_name: &'a str,
    pub color: &'a str,
}

/// Registration data for a new account
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub role: Role,
}

/// Partial update of a user's Home Assistant settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserSettingsPatch {
    #[serde(rename = "hassUrl", default)]
    pub hass_url: Option<String>,
    #[serde(rename = "hassToken", default)]
    pub hass_token: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(rename = "trayName", default)]
    pub tray_name: Option<String>,
    #[serde(rename = "hassMode", default)]
    pub hass_mode: Option<HassMode>,
}

/// New AMS unit definition
#[derive(Debug, Clone)]
pub struct NewAmsConfig {
    pub name: String,
    pub kind: AmsKind,
    pub sensor: String,
    pub enabled: bool,
}

/// Partial update of an AMS unit
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AmsConfigPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<AmsKind>,
    #[serde(default)]
    pub sensor: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// Authoritative inventory with write-through persistence
pub struct InventoryStore {
    path: PathBuf,
    doc: RwLock<StoreDocument>,
}

impl InventoryStore {
    /// Load the document at `path`, creating an empty one if absent.
    ///
    /// Colours are normalised and users without an API token are issued
    /// one; the document is rewritten if anything changed.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let (mut doc, mut dirty) = match tokio::fs::read_to_string(&path).await {
            Ok(content) => (serde_json::from_str::<StoreDocument>(&content)?, false),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No inventory found at {}, creating new one", path.display());
                (StoreDocument::default(), true)
            }
            Err(e) => return Err(e.into()),
        };

        for record in doc.filaments.values_mut() {
            let normalized = color::normalize(&record.color);
            if normalized != record.color {
                record.color = normalized;
                dirty = true;
            }
        }
        for user in doc.users.values_mut() {
            if user.api_token.is_empty() {
                user.api_token = new_api_token();
                info!(username = %user.username, "Issued API token to existing user");
                dirty = true;
            }
        }

        let store = Self {
            path,
            doc: RwLock::new(doc),
        };
        if dirty {
            let doc = store.doc.read().await;
            store.persist(&doc).await?;
        }

        let doc = store.doc.read().await;
        info!(
            "Inventory loaded: {} users, {} filaments",
            doc.users.len(),
            doc.filaments.len()
        );
        drop(doc);
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ------------------------------------------------------------------
    // Filaments
    // ------------------------------------------------------------------

    pub async fn get_by_owner(&self, owner_id: &str) -> Vec<FilamentRecord> {
        self.doc
            .read()
            .await
            .filaments
            .values()
            .filter(|f| f.owner_id == owner_id)
            .cloned()
            .collect()
    }

    pub async fn get_all(&self) -> Vec<FilamentRecord> {
        self.doc.read().await.filaments.values().cloned().collect()
    }

    pub async fn get_by_tag(&self, tag_id: &str) -> Option<FilamentRecord> {
        self.doc.read().await.filaments.get(tag_id).cloned()
    }

    /// Owner's record whose tag or serial number equals `code`
    pub async fn find_by_code(&self, owner_id: &str, code: &str) -> Option<FilamentRecord> {
        self.doc
            .read()
            .await
            .filaments
            .values()
            .filter(|f| f.owner_id == owner_id)
            .find(|f| f.tag_id == code || f.serial_number.as_deref() == Some(code))
            .cloned()
    }

    /// Owner's untagged manual record matching `spec` exactly (colour
    /// compared after normalisation)
    pub async fn find_unassociated(&self, owner_id: &str, spec: SpoolSpec<'_>) -> Option<FilamentRecord> {
        let color = color::normalize(spec.color);
        self.doc
            .read()
            .await
            .filaments
            .values()
            .filter(|f| f.owner_id == owner_id)
            .find(|f| {
                f.serial_number.is_none()
                    && !f.is_sensor_tracked
                    && f.material_type == spec.material_type
                    && f.manufacturer == spec.manufacturer
                    && f.display_name == spec.display_name
                    && color::normalize(&f.color) == color
            })
            .cloned()
    }

    /// Create a record for `owner_id`. A missing tag is synthesised; an
    /// existing record with the same tag is replaced.
    pub async fn create(&self, owner_id: &str, fields: FilamentFields) -> Result<FilamentRecord, StoreError> {
        let now = Utc::now();
        let tag_id = fields
            .tag_id
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(manual_tag);

        let record = FilamentRecord {
            tag_id: tag_id.clone(),
            owner_id: owner_id.to_string(),
            material_type: non_empty_or(fields.material_type, UNKNOWN),
            manufacturer: non_empty_or(fields.manufacturer, UNKNOWN),
            display_name: non_empty_or(fields.display_name, UNKNOWN),
            variation: fields.variation.unwrap_or_default(),
            color_name: fields.color_name.unwrap_or_default(),
            color: fields
                .color
                .as_deref()
                .map(color::normalize)
                .unwrap_or_else(|| color::DEFAULT_COLOR.to_string()),
            spool_size_grams: fields
                .spool_size_grams
                .filter(|s| *s > 0)
                .unwrap_or(DEFAULT_SPOOL_SIZE_GRAMS),
            remaining_percent: fields.remaining_percent.unwrap_or(0),
            is_empty: fields.is_empty.unwrap_or(false),
            is_sensor_tracked: fields.is_sensor_tracked.unwrap_or(false),
            serial_number: fields.serial_number.filter(|s| !s.is_empty()),
            created_at: now,
            updated_at: now,
            extra: Default::default(),
        };

        let mut doc = self.doc.write().await;
        doc.filaments.insert(tag_id.clone(), record.clone());
        self.persist(&doc).await?;
        debug!(tag = %tag_id, owner = %owner_id, "Filament created");
        Ok(record)
    }

    /// Apply `patch` to the record with `tag_id`. The tag itself never
    /// changes. Returns `None` when no such record exists.
    pub async fn update(&self, tag_id: &str, patch: FilamentFields) -> Result<Option<FilamentRecord>, StoreError> {
        let mut doc = self.doc.write().await;
        let Some(record) = doc.filaments.get_mut(tag_id) else {
            return Ok(None);
        };
        patch.apply_to(record);
        record.updated_at = Utc::now();
        let updated = record.clone();

        self.persist(&doc).await?;
        debug!(tag = %tag_id, "Filament updated");
        Ok(Some(updated))
    }

    /// Remove the record with `tag_id`; false when it did not exist
    pub async fn delete(&self, tag_id: &str) -> Result<bool, StoreError> {
        let mut doc = self.doc.write().await;
        if doc.filaments.remove(tag_id).is_none() {
            return Ok(false);
        }
        self.persist(&doc).await?;
        debug!(tag = %tag_id, "Filament deleted");
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    /// Register a user and issue their API token
    pub async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        let mut doc = self.doc.write().await;
        if doc.users.values().any(|u| u.username == new_user.username) {
            return Err(StoreError::DuplicateUsername(new_user.username));
        }

        let user = User {
            id: prefixed_id("user"),
            username: new_user.username,
            email: new_user.email,
            role: new_user.role,
            api_token: new_api_token(),
            hass_url: String::new(),
            hass_token: String::new(),
            tray_name: "tray".to_string(),
            hass_mode: HassMode::default(),
            created_at: Utc::now(),
            updated_at: None,
            extra: Default::default(),
        };
        doc.users.insert(user.id.clone(), user.clone());
        self.persist(&doc).await?;
        info!(username = %user.username, id = %user.id, "User created");
        Ok(user)
    }

    pub async fn list_users(&self) -> Vec<User> {
        self.doc.read().await.users.values().cloned().collect()
    }

    pub async fn user_by_id(&self, id: &str) -> Option<User> {
        self.doc.read().await.users.get(id).cloned()
    }

    pub async fn user_by_token(&self, token: &str) -> Option<User> {
        if token.is_empty() {
            return None;
        }
        self.doc
            .read()
            .await
            .users
            .values()
            .find(|u| u.api_token == token)
            .cloned()
    }

    /// Username for every user id, for annotating listings
    pub async fn usernames(&self) -> BTreeMap<String, String> {
        self.doc
            .read()
            .await
            .users
            .values()
            .map(|u| (u.id.clone(), u.username.clone()))
            .collect()
    }

    pub async fn update_user_settings(
        &self,
        id: &str,
        patch: UserSettingsPatch,
    ) -> Result<Option<User>, StoreError> {
        let mut doc = self.doc.write().await;
        let Some(user) = doc.users.get_mut(id) else {
            return Ok(None);
        };

        if let Some(v) = patch.hass_url {
            user.hass_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = patch.hass_token {
            user.hass_token = v;
        }
        if let Some(v) = patch.email {
            user.email = v;
        }
        if let Some(v) = patch.tray_name {
            user.tray_name = v;
        }
        if let Some(v) = patch.hass_mode {
            user.hass_mode = v;
        }
        user.updated_at = Some(Utc::now());
        let updated = user.clone();

        self.persist(&doc).await?;
        Ok(Some(updated))
    }

    // ------------------------------------------------------------------
    // AMS configurations
    // ------------------------------------------------------------------

    pub async fn ams_configs(&self, owner_id: &str) -> Vec<AmsConfig> {
        self.doc
            .read()
            .await
            .ams_configs
            .get(owner_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn add_ams_config(&self, owner_id: &str, new: NewAmsConfig) -> Result<AmsConfig, StoreError> {
        let config = AmsConfig {
            id: prefixed_id("ams"),
            name: new.name,
            kind: new.kind,
            sensor: new.sensor,
            enabled: new.enabled,
            created_at: Utc::now(),
            updated_at: None,
            extra: Default::default(),
        };

        let mut doc = self.doc.write().await;
        doc.ams_configs
            .entry(owner_id.to_string())
            .or_default()
            .push(config.clone());
        self.persist(&doc).await?;
        info!(owner = %owner_id, sensor = %config.sensor, kind = ?config.kind, "AMS configuration added");
        Ok(config)
    }

    pub async fn update_ams_config(
        &self,
        owner_id: &str,
        ams_id: &str,
        patch: AmsConfigPatch,
    ) -> Result<Option<AmsConfig>, StoreError> {
        let mut doc = self.doc.write().await;
        let Some(config) = doc
            .ams_configs
            .get_mut(owner_id)
            .and_then(|configs| configs.iter_mut().find(|c| c.id == ams_id))
        else {
            return Ok(None);
        };

        if let Some(v) = patch.name {
            config.name = v;
        }
        if let Some(v) = patch.kind {
            config.kind = v;
        }
        if let Some(v) = patch.sensor {
            config.sensor = v;
        }
        if let Some(v) = patch.enabled {
            config.enabled = v;
        }
        config.updated_at = Some(Utc::now());
        let updated = config.clone();

        self.persist(&doc).await?;
        Ok(Some(updated))
    }

    pub async fn delete_ams_config(&self, owner_id: &str, ams_id: &str) -> Result<bool, StoreError> {
        let mut doc = self.doc.write().await;
        let Some(configs) = doc.ams_configs.get_mut(owner_id) else {
            return Ok(false);
        };
        let Some(index) = configs.iter().position(|c| c.id == ams_id) else {
            return Ok(false);
        };
        configs.remove(index);
        self.persist(&doc).await?;
        Ok(true)
    }

    async fn persist(&self, doc: &StoreDocument) -> Result<(), StoreError> {
        write_json_atomic(&self.path, doc).await?;
        Ok(())
    }
}

fn non_empty_or(value: Option<String>, default: &str) -> String {
    value
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// `<prefix>-<millis>-<9 random chars>`
fn prefixed_id(prefix: &str) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", prefix, Utc::now().timestamp_millis(), &random[..9])
}

fn manual_tag() -> String {
    prefixed_id("manual")
}

fn new_api_token() -> String {
    Uuid::new_v4().simple().to_string()
}
