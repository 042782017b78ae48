//! Tray reconciliation
//!
//! Applies one sensor-reported tray snapshot to the inventory. Each
//! snapshot produces exactly one outcome:
//!
//! ```text
//! invalid     tag empty or the all-zero placeholder, nothing changes
//! deleted     tray empty/depleted and a record existed
//! skipped     tray empty/depleted and no record existed
//! updated     record exists, remaining/empty refreshed
//! associated  untagged manual spool matched, re-keyed under the tag
//! created     new sensor-tracked record
//! ```
//!
//! Re-applying an unchanged snapshot yields `updated` and leaves the
//! descriptive fields alone.

use serde::Serialize;
use spk_common::color;
use spk_common::models::{
    is_depleted, is_placeholder_tag, FilamentRecord, TraySnapshot, DEFAULT_SPOOL_SIZE_GRAMS,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::catalog::{MaterialCatalog, DEFAULT_MANUFACTURER};
use crate::store::{FilamentFields, InventoryStore, SpoolSpec, StoreError, UNKNOWN};

/// What reconciliation did with one snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileAction {
    Deleted,
    Skipped,
    Updated,
    Associated,
    Created,
    Invalid,
}

/// Result of [`TrayReconciler::reconcile_one`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    pub success: bool,
    pub action: ReconcileAction,
    #[serde(rename = "tagId", skip_serializing_if = "Option::is_none")]
    pub tag_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ReconcileOutcome {
    fn new(action: ReconcileAction, tag_id: &str) -> Self {
        Self {
            success: action != ReconcileAction::Invalid,
            action,
            tag_id: Some(tag_id.to_string()),
            message: None,
        }
    }

    fn with_message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }
}

/// Snapshot with descriptive fields resolved against the catalog
#[derive(Debug, Clone)]
struct ResolvedTray {
    tag_id: String,
    material_type: String,
    manufacturer: String,
    display_name: String,
    color_name: String,
    color: String,
    spool_size_grams: u32,
    remaining_percent: i32,
    is_empty: bool,
}

impl ResolvedTray {
    fn is_depleted(&self) -> bool {
        self.is_empty || is_depleted(self.remaining_percent)
    }

    fn spec(&self) -> SpoolSpec<'_> {
        SpoolSpec {
            material_type: &self.material_type,
            manufacturer: &self.manufacturer,
            display_name: &self.display_name,
            color: &self.color,
        }
    }
}

/// Applies tray snapshots to the inventory.
///
/// Reconciliations are serialised: one snapshot is fully applied before
/// the next starts, whether it came from the scheduler or a webhook.
pub struct TrayReconciler {
    store: Arc<InventoryStore>,
    catalog: Arc<MaterialCatalog>,
    guard: Mutex<()>,
}

impl TrayReconciler {
    pub fn new(store: Arc<InventoryStore>, catalog: Arc<MaterialCatalog>) -> Self {
        Self {
            store,
            catalog,
            guard: Mutex::new(()),
        }
    }

    /// Apply one snapshot for `owner_id`
    pub async fn reconcile_one(
        &self,
        owner_id: &str,
        snapshot: &TraySnapshot,
    ) -> Result<ReconcileOutcome, StoreError> {
        let tag_id = snapshot.tag_id.trim();
        if is_placeholder_tag(tag_id) {
            return Ok(ReconcileOutcome {
                success: false,
                action: ReconcileAction::Invalid,
                tag_id: Some(snapshot.tag_id.clone()),
                message: Some("Invalid or empty tag_uid".to_string()),
            });
        }

        let _guard = self.guard.lock().await;
        let tray = self.resolve(snapshot).await;
        debug!(
            tag = %tray.tag_id,
            name = %tray.display_name,
            material = %tray.material_type,
            colorname = %tray.color_name,
            remain = tray.remaining_percent,
            "Reconciling tray"
        );

        if tray.is_depleted() {
            if self.store.delete(&tray.tag_id).await? {
                info!(tag = %tray.tag_id, "Auto-deleted empty/depleted filament");
                return Ok(ReconcileOutcome::new(ReconcileAction::Deleted, &tray.tag_id));
            }
            return Ok(ReconcileOutcome::new(ReconcileAction::Skipped, &tray.tag_id)
                .with_message("Empty tray, nothing to delete"));
        }

        if self.store.get_by_tag(&tray.tag_id).await.is_some() {
            self.store
                .update(
                    &tray.tag_id,
                    FilamentFields {
                        remaining_percent: Some(tray.remaining_percent),
                        is_empty: Some(tray.is_empty),
                        is_sensor_tracked: Some(true),
                        ..Default::default()
                    },
                )
                .await?;
            return Ok(ReconcileOutcome::new(ReconcileAction::Updated, &tray.tag_id));
        }

        if let Some(manual) = self.store.find_unassociated(owner_id, tray.spec()).await {
            self.associate(owner_id, &manual, &tray).await?;
            return Ok(ReconcileOutcome::new(ReconcileAction::Associated, &tray.tag_id));
        }

        self.create(owner_id, &tray).await?;
        Ok(ReconcileOutcome::new(ReconcileAction::Created, &tray.tag_id))
    }

    /// Delete every record of `owner_id` whose remaining amount is used
    /// up. Returns the deleted tags.
    pub async fn cleanup_depleted(&self, owner_id: &str) -> Result<Vec<String>, StoreError> {
        let _guard = self.guard.lock().await;
        let mut deleted = Vec::new();
        for record in self.store.get_by_owner(owner_id).await {
            if is_depleted(record.remaining_percent) && self.store.delete(&record.tag_id).await? {
                info!(tag = %record.tag_id, "Auto-deleted depleted filament");
                deleted.push(record.tag_id);
            }
        }
        Ok(deleted)
    }

    /// Fill in descriptive fields. The catalog is authoritative for
    /// manufacturer, material type and colour name; on a miss only the
    /// reported material type is kept.
    async fn resolve(&self, snapshot: &TraySnapshot) -> ResolvedTray {
        let display_name = snapshot.display_name.clone().unwrap_or_default();
        let color = color::normalize(snapshot.color.as_deref().unwrap_or(""));
        let entry = self.catalog.lookup_by_name_and_color(&display_name, &color).await;

        let reported_type = snapshot.material_type.clone().filter(|t| !t.is_empty());

        let (material_type, manufacturer, color_name) = match entry {
            Some(entry) => (entry.material_type, entry.manufacturer, entry.color_name),
            None => (
                reported_type.unwrap_or_else(|| UNKNOWN.to_string()),
                DEFAULT_MANUFACTURER.to_string(),
                String::new(),
            ),
        };

        ResolvedTray {
            tag_id: snapshot.tag_id.trim().to_string(),
            material_type: non_empty_or(material_type, UNKNOWN),
            manufacturer: non_empty_or(manufacturer, DEFAULT_MANUFACTURER),
            display_name,
            color_name,
            color,
            spool_size_grams: snapshot
                .spool_size_grams
                .filter(|s| *s > 0)
                .unwrap_or(DEFAULT_SPOOL_SIZE_GRAMS),
            remaining_percent: snapshot.remaining_percent.unwrap_or(0),
            is_empty: snapshot.is_empty,
        }
    }

    /// Re-key a manual spool under the sensor tag
    async fn associate(
        &self,
        owner_id: &str,
        manual: &FilamentRecord,
        tray: &ResolvedTray,
    ) -> Result<(), StoreError> {
        info!(tag = %tray.tag_id, manual = %manual.tag_id, "Associating tag with existing filament");

        self.store.delete(&manual.tag_id).await?;
        let fields = FilamentFields {
            tag_id: Some(tray.tag_id.clone()),
            serial_number: Some(tray.tag_id.clone()),
            is_sensor_tracked: Some(true),
            remaining_percent: Some(tray.remaining_percent),
            is_empty: Some(tray.is_empty),
            ..FilamentFields::from_record(manual)
        };
        self.store.create(owner_id, fields).await?;
        Ok(())
    }

    async fn create(&self, owner_id: &str, tray: &ResolvedTray) -> Result<(), StoreError> {
        let mut color_name = tray.color_name.clone();
        if color_name.is_empty() {
            color_name = self
                .store
                .get_by_owner(owner_id)
                .await
                .into_iter()
                .find(|f| {
                    !f.color_name.is_empty()
                        && f.matches_description(
                            &tray.color,
                            &tray.material_type,
                            &tray.display_name,
                            &tray.manufacturer,
                        )
                })
                .map(|f| {
                    debug!(tag = %tray.tag_id, colorname = %f.color_name, "Borrowed colour name from sibling spool");
                    f.color_name
                })
                .unwrap_or_default();
        }

        let fields = FilamentFields {
            tag_id: Some(tray.tag_id.clone()),
            material_type: Some(tray.material_type.clone()),
            manufacturer: Some(tray.manufacturer.clone()),
            display_name: Some(tray.display_name.clone()),
            color_name: Some(color_name),
            color: Some(tray.color.clone()),
            spool_size_grams: Some(tray.spool_size_grams),
            remaining_percent: Some(tray.remaining_percent),
            is_empty: Some(tray.is_empty),
            is_sensor_tracked: Some(true),
            serial_number: Some(tray.tag_id.clone()),
            ..Default::default()
        };
        self.store.create(owner_id, fields).await?;
        info!(tag = %tray.tag_id, owner = %owner_id, "Created sensor-tracked filament");
        Ok(())
    }
}

fn non_empty_or(value: String, default: &str) -> String {
    if value.trim().is_empty() {
        default.to_string()
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn reconciler(dir: &tempfile::TempDir) -> (Arc<InventoryStore>, TrayReconciler) {
        let store = Arc::new(InventoryStore::load(dir.path().join("database.json")).await.unwrap());
        let catalog = Arc::new(MaterialCatalog::with_entries(
            dir.path().join("materials.json"),
            30.0,
            Vec::new(),
        ));
        (store.clone(), TrayReconciler::new(store, catalog))
    }

    #[tokio::test]
    async fn test_missing_fields_take_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (store, reconciler) = reconciler(&dir).await;

        let snapshot = TraySnapshot {
            tag_id: "T1".into(),
            remaining_percent: Some(20),
            ..Default::default()
        };
        let outcome = reconciler.reconcile_one("u1", &snapshot).await.unwrap();
        assert_eq!(outcome.action, ReconcileAction::Created);

        let record = store.get_by_tag("T1").await.unwrap();
        assert_eq!(record.color, "#FFFFFF");
        assert_eq!(record.manufacturer, "BambuLab");
        assert_eq!(record.material_type, "Unknown");
        assert_eq!(record.spool_size_grams, 1000);
    }

    #[tokio::test]
    async fn test_missing_remaining_counts_as_depleted() {
        let dir = tempfile::tempdir().unwrap();
        let (store, reconciler) = reconciler(&dir).await;

        let snapshot = TraySnapshot {
            tag_id: "T1".into(),
            ..Default::default()
        };
        let outcome = reconciler.reconcile_one("u1", &snapshot).await.unwrap();
        assert_eq!(outcome.action, ReconcileAction::Skipped);
        assert!(outcome.success);
        assert!(store.get_by_tag("T1").await.is_none());
    }

    #[tokio::test]
    async fn test_outcome_wire_shape() {
        let outcome = ReconcileOutcome::new(ReconcileAction::Associated, "XYZ");
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["action"], "associated");
        assert_eq!(json["tagId"], "XYZ");
        assert_eq!(json["success"], true);
        assert!(json.get("message").is_none());
    }
}
