//! Domain records shared by the store, the catalog and the HTTP API
//!
//! Field names on the wire follow the established `database.json` layout
//! (`tag_uid`, `userId`, `colorname`, ...) so existing data files load
//! unchanged. Keys this crate does not know about are carried in `extra`
//! and written back on the next save.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Unrecognised keys of a stored object
pub type ExtraFields = Map<String, Value>;

/// `remaining_percent` value meaning "not tracked"
pub const REMAIN_UNKNOWN: i32 = -1;

/// Tag reported by a tray that holds no tagged spool
pub const EMPTY_TAG: &str = "0000000000000000";

/// Spool weight assumed when nothing better is known
pub const DEFAULT_SPOOL_SIZE_GRAMS: u32 = 1000;

/// True when `remaining` counts as used up.
///
/// The [`REMAIN_UNKNOWN`] sentinel never counts as depleted.
pub fn is_depleted(remaining: i32) -> bool {
    remaining <= 0 && remaining != REMAIN_UNKNOWN
}

/// True for a tag that cannot identify a spool
pub fn is_placeholder_tag(tag: &str) -> bool {
    let tag = tag.trim();
    tag.is_empty() || tag == EMPTY_TAG
}

/// One tracked spool, either sensor-tracked or manually maintained
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilamentRecord {
    /// Physical tag UID, or a synthesized `manual-...` id
    #[serde(rename = "tag_uid")]
    pub tag_id: String,

    #[serde(rename = "userId")]
    pub owner_id: String,

    #[serde(rename = "type", default)]
    pub material_type: String,

    #[serde(default)]
    pub manufacturer: String,

    #[serde(rename = "name", default)]
    pub display_name: String,

    #[serde(default)]
    pub variation: String,

    #[serde(rename = "colorname", default)]
    pub color_name: String,

    /// Normalised `#RRGGBB`
    #[serde(default = "default_color")]
    pub color: String,

    #[serde(rename = "size", default = "default_spool_size")]
    pub spool_size_grams: u32,

    /// 0..=100, or [`REMAIN_UNKNOWN`]
    #[serde(rename = "remain", default, deserialize_with = "de_percent")]
    pub remaining_percent: i32,

    #[serde(rename = "empty", default)]
    pub is_empty: bool,

    #[serde(rename = "tracking", default)]
    pub is_sensor_tracked: bool,

    /// Mirrors `tag_id` once sensor-tracked
    #[serde(rename = "serialNumber", default)]
    pub serial_number: Option<String>,

    #[serde(rename = "createdAt", default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(rename = "updatedAt", default = "Utc::now")]
    pub updated_at: DateTime<Utc>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl FilamentRecord {
    /// Identity used to borrow a colour name from a sibling spool
    pub fn matches_description(
        &self,
        color: &str,
        material_type: &str,
        display_name: &str,
        manufacturer: &str,
    ) -> bool {
        self.color == color
            && self.material_type == material_type
            && self.display_name == display_name
            && self.manufacturer == manufacturer
    }
}

/// One row of the material reference dataset
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CatalogEntry {
    pub manufacturer: String,
    pub material_type: String,
    pub variation: String,
    pub display_name: String,
    pub color_name: String,
    /// Normalised `#RRGGBB`
    pub color: String,
    pub note: String,
    /// Barcodes, in insertion order without duplicates
    pub eans: Vec<String>,
}

impl CatalogEntry {
    /// Returns true when every descriptive field matches, colour included
    pub fn same_product(&self, other: &CatalogEntry) -> bool {
        self.same_product_ignoring_color(other) && self.color == other.color
    }

    /// Matches manufacturer, material type, display name and colour name
    pub fn same_product_ignoring_color(&self, other: &CatalogEntry) -> bool {
        self.manufacturer == other.manufacturer
            && self.material_type == other.material_type
            && self.display_name == other.display_name
            && self.color_name == other.color_name
    }

    pub fn has_ean(&self, ean: &str) -> bool {
        self.eans.iter().any(|e| e == ean)
    }

    /// Add a barcode unless already present; returns true when added
    pub fn add_ean(&mut self, ean: &str) -> bool {
        let ean = ean.trim();
        if ean.is_empty() || self.has_ean(ean) {
            return false;
        }
        self.eans.push(ean.to_string());
        true
    }
}

/// Tray state reported by a sensor for one reconciliation tick.
///
/// Accepts both the Home Assistant attribute names and camelCase aliases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraySnapshot {
    #[serde(rename = "tag_uid", alias = "tagId", default)]
    pub tag_id: String,

    #[serde(rename = "type", alias = "materialType", default)]
    pub material_type: Option<String>,

    #[serde(alias = "colorRGB", default)]
    pub color: Option<String>,

    #[serde(rename = "name", alias = "displayName", default)]
    pub display_name: Option<String>,

    #[serde(rename = "remain", alias = "remainingPercent", default, deserialize_with = "de_opt_percent")]
    pub remaining_percent: Option<i32>,

    #[serde(rename = "empty", alias = "isEmpty", default)]
    pub is_empty: bool,

    #[serde(rename = "size", default)]
    pub spool_size_grams: Option<u32>,
}

/// Account role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    User,
}

/// How a user's trays reach the reconciler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HassMode {
    /// Scheduler polls Home Assistant
    Polling,
    /// Home Assistant pushes snapshots to the webhook
    Webhook,
    #[default]
    Disabled,
}

/// Inventory owner and their Home Assistant settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: Role,
    #[serde(rename = "apiToken", default)]
    pub api_token: String,
    #[serde(rename = "hassUrl", default)]
    pub hass_url: String,
    #[serde(rename = "hassToken", default)]
    pub hass_token: String,
    #[serde(rename = "trayName", default = "default_tray_name")]
    pub tray_name: String,
    #[serde(rename = "hassMode", default)]
    pub hass_mode: HassMode,
    #[serde(rename = "createdAt", default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Legacy keys such as `password` survive a rewrite untouched
    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Multi-material unit model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmsKind {
    Ams,
    Ams2Pro,
    AmsHt,
    AmsLite,
}

impl AmsKind {
    /// Physical tray slots on this unit
    pub fn slot_count(self) -> u8 {
        match self {
            AmsKind::Ams | AmsKind::Ams2Pro | AmsKind::AmsLite => 4,
            AmsKind::AmsHt => 1,
        }
    }
}

/// One sensor-reporting unit configured by a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmsConfig {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AmsKind,
    /// Home Assistant entity prefix, e.g. `sensor.x1c_ams_1`
    pub sensor: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(rename = "createdAt", default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

fn default_color() -> String {
    crate::color::DEFAULT_COLOR.to_string()
}

fn default_spool_size() -> u32 {
    DEFAULT_SPOOL_SIZE_GRAMS
}

fn default_tray_name() -> String {
    "tray".to_string()
}

fn default_true() -> bool {
    true
}

/// Read a percentage written as an integer, a float or a numeric string.
/// Anything else (null included) yields `None`.
fn lenient_percent(value: &Value) -> Option<i32> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then(|| number.round() as i32)
}

fn de_percent<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(lenient_percent(&value).unwrap_or(0))
}

fn de_opt_percent<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(lenient_percent(&value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depletion_excludes_unknown_sentinel() {
        assert!(is_depleted(0));
        assert!(is_depleted(-5));
        assert!(!is_depleted(REMAIN_UNKNOWN));
        assert!(!is_depleted(1));
    }

    #[test]
    fn test_placeholder_tags() {
        assert!(is_placeholder_tag(""));
        assert!(is_placeholder_tag("   "));
        assert!(is_placeholder_tag(EMPTY_TAG));
        assert!(!is_placeholder_tag("ABC123"));
    }

    #[test]
    fn test_slot_counts() {
        assert_eq!(AmsKind::Ams.slot_count(), 4);
        assert_eq!(AmsKind::Ams2Pro.slot_count(), 4);
        assert_eq!(AmsKind::AmsLite.slot_count(), 4);
        assert_eq!(AmsKind::AmsHt.slot_count(), 1);
    }

    #[test]
    fn test_filament_record_reads_legacy_layout() {
        let json = r##"{
            "tag_uid": "ABC",
            "userId": "user-1",
            "type": "PLA",
            "manufacturer": "BambuLab",
            "name": "Bambu PLA Basic",
            "color": "#FF0000FF",
            "colorname": "Red",
            "size": 1000,
            "remain": 42.6,
            "empty": false,
            "tracking": true,
            "serialNumber": "ABC",
            "createdAt": "2025-01-01T00:00:00Z",
            "updatedAt": "2025-01-01T00:00:00Z",
            "username": "ignored"
        }"##;
        let record: FilamentRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.material_type, "PLA");
        assert_eq!(record.remaining_percent, 43);
        assert_eq!(record.serial_number.as_deref(), Some("ABC"));
        assert!(record.is_sensor_tracked);
        assert_eq!(record.variation, "");
        assert_eq!(record.extra.get("username"), Some(&Value::from("ignored")));
    }

    #[test]
    fn test_percent_accepts_strings_and_null() {
        let base = r#""tag_uid":"ABC","userId":"user-1""#;
        let cases = [
            (r#""50""#, 50),
            (r#"" 12.5 ""#, 13),
            ("null", 0),
            (r#""lots""#, 0),
            ("-1", REMAIN_UNKNOWN),
        ];
        for (raw, expected) in cases {
            let json = format!("{{{},\"remain\":{}}}", base, raw);
            let record: FilamentRecord = serde_json::from_str(&json).unwrap();
            assert_eq!(record.remaining_percent, expected, "remain = {}", raw);
        }

        let snapshot: TraySnapshot = serde_json::from_str(r#"{"tag_uid":"T1","remain":"75"}"#).unwrap();
        assert_eq!(snapshot.remaining_percent, Some(75));
        let snapshot: TraySnapshot = serde_json::from_str(r#"{"tag_uid":"T1","remain":null}"#).unwrap();
        assert_eq!(snapshot.remaining_percent, None);
    }

    #[test]
    fn test_unknown_user_keys_survive_round_trip() {
        let json = r#"{"id":"user-1","username":"alice","password":"hash","theme":{"dark":true}}"#;
        let user: User = serde_json::from_str(json).unwrap();
        assert_eq!(user.api_token, "");

        let written = serde_json::to_value(&user).unwrap();
        assert_eq!(written["password"], "hash");
        assert_eq!(written["theme"]["dark"], true);
        assert_eq!(written["username"], "alice");
    }

    #[test]
    fn test_snapshot_accepts_both_naming_styles() {
        let hass: TraySnapshot = serde_json::from_str(
            r##"{"tag_uid":"T1","type":"PLA","color":"#000000FF","name":"Bambu PLA Basic","remain":55,"empty":false}"##,
        )
        .unwrap();
        let camel: TraySnapshot = serde_json::from_str(
            r##"{"tagId":"T1","materialType":"PLA","colorRGB":"#000000FF","displayName":"Bambu PLA Basic","remainingPercent":55,"isEmpty":false}"##,
        )
        .unwrap();
        assert_eq!(hass, camel);
        assert_eq!(hass.remaining_percent, Some(55));
    }

    #[test]
    fn test_ams_kind_wire_names() {
        let kind: AmsKind = serde_json::from_str("\"ams2pro\"").unwrap();
        assert_eq!(kind, AmsKind::Ams2Pro);
        assert_eq!(serde_json::to_string(&AmsKind::AmsHt).unwrap(), "\"amsht\"");
        assert!(serde_json::from_str::<AmsKind>("\"bogus\"").is_err());
    }

    #[test]
    fn test_catalog_entry_ean_set_semantics() {
        let mut entry = CatalogEntry::default();
        assert!(entry.add_ean("123"));
        assert!(!entry.add_ean("123"));
        assert!(!entry.add_ean("  "));
        assert!(entry.add_ean(" 456 "));
        assert_eq!(entry.eans, vec!["123".to_string(), "456".to_string()]);
    }
}
