//! Home Assistant tray sensor client
//!
//! Each AMS slot is exposed by Home Assistant as one entity,
//! `{sensor}_{trayName}_{slot}`, whose attributes carry the spool tag,
//! material, colour and remaining amount.

use async_trait::async_trait;
use serde::Deserialize;
use spk_common::models::{User, DEFAULT_SPOOL_SIZE_GRAMS, EMPTY_TAG, REMAIN_UNKNOWN, TraySnapshot};
use std::time::Duration;
use thiserror::Error;

use super::TraySource;

/// Home Assistant client errors
#[derive(Debug, Error)]
pub enum HassError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("API error {0}: {1}")]
    Status(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for HassError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            HassError::Timeout
        } else if e.is_decode() {
            HassError::Parse(e.to_string())
        } else {
            HassError::Network(e.to_string())
        }
    }
}

/// Entity state as returned by `GET /api/states/{entity_id}`
#[derive(Debug, Deserialize)]
struct EntityState {
    #[serde(default)]
    attributes: Option<TraySnapshot>,
}

/// Polls tray entities over the Home Assistant REST API
pub struct HassClient {
    http_client: reqwest::Client,
}

impl HassClient {
    pub fn new(timeout: Duration) -> Result<Self, HassError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("SpoolKeeper/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| HassError::Network(e.to_string()))?;

        Ok(Self { http_client })
    }
}

/// Entity id for one tray slot
pub fn tray_entity(sensor: &str, tray_name: &str, slot: u8) -> String {
    let tray_name = if tray_name.is_empty() { "tray" } else { tray_name };
    format!("{}_{}_{}", sensor, tray_name, slot)
}

/// Accept a tray's attributes only when they identify a tagged spool with
/// a known remaining amount
fn snapshot_from_attributes(attributes: Option<TraySnapshot>) -> Option<TraySnapshot> {
    let mut snapshot = attributes?;
    if snapshot.tag_id == EMPTY_TAG || snapshot.remaining_percent == Some(REMAIN_UNKNOWN) {
        return None;
    }
    snapshot.spool_size_grams.get_or_insert(DEFAULT_SPOOL_SIZE_GRAMS);
    Some(snapshot)
}

#[async_trait]
impl TraySource for HassClient {
    async fn fetch_tray(
        &self,
        user: &User,
        sensor: &str,
        slot: u8,
    ) -> Result<Option<TraySnapshot>, HassError> {
        let entity = tray_entity(sensor, &user.tray_name, slot);
        let url = format!("{}/api/states/{}", user.hass_url.trim_end_matches('/'), entity);

        tracing::debug!(entity = %entity, "Querying Home Assistant");

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&user.hass_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(HassError::Status(status.as_u16(), error_text));
        }

        let state: EntityState = response
            .json()
            .await
            .map_err(|e| HassError::Parse(e.to_string()))?;

        Ok(snapshot_from_attributes(state.attributes))
    }
}
