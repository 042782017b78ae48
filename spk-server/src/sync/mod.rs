//! Periodic tray synchronisation
//!
//! For each user in polling mode, fetch every slot of every enabled AMS
//! unit, reconcile the snapshots in slot order, then delete whatever the
//! pass left depleted.

mod hass_client;

pub use hass_client::{tray_entity, HassClient, HassError};

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use spk_common::models::{HassMode, TraySnapshot, User};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::reconcile::{ReconcileOutcome, TrayReconciler};
use crate::store::{InventoryStore, StoreError};

/// Source of per-slot tray state
#[async_trait]
pub trait TraySource: Send + Sync {
    /// State of slot `slot` (1-based) of the unit `sensor`; `None` when the
    /// slot holds no usable spool
    async fn fetch_tray(
        &self,
        user: &User,
        sensor: &str,
        slot: u8,
    ) -> Result<Option<TraySnapshot>, HassError>;
}

/// Why a pass did not run, or failed
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("User not found: {0}")]
    UnknownUser(String),

    #[error("Polling not configured: {0}")]
    NotConfigured(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of one pass for one user
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub outcomes: Vec<ReconcileOutcome>,
    /// Tags removed by the post-pass cleanup
    pub cleaned: Vec<String>,
}

/// Drives [`TrayReconciler`] from a [`TraySource`]
pub struct SyncScheduler {
    store: Arc<InventoryStore>,
    reconciler: Arc<TrayReconciler>,
    source: Arc<dyn TraySource>,
}

impl SyncScheduler {
    pub fn new(
        store: Arc<InventoryStore>,
        reconciler: Arc<TrayReconciler>,
        source: Arc<dyn TraySource>,
    ) -> Self {
        Self {
            store,
            reconciler,
            source,
        }
    }

    /// One full pass for `owner_id`
    pub async fn run_once(&self, owner_id: &str) -> Result<SyncReport, SyncError> {
        let user = self
            .store
            .user_by_id(owner_id)
            .await
            .ok_or_else(|| SyncError::UnknownUser(owner_id.to_string()))?;

        if user.hass_mode != HassMode::Polling {
            return Err(SyncError::NotConfigured(format!(
                "{} is not in polling mode",
                user.username
            )));
        }
        if user.hass_url.is_empty() || user.hass_token.is_empty() {
            return Err(SyncError::NotConfigured(format!(
                "{} has no Home Assistant URL/token",
                user.username
            )));
        }

        let configs = self.store.ams_configs(owner_id).await;
        if configs.is_empty() {
            return Err(SyncError::NotConfigured(format!(
                "{} has no AMS configurations",
                user.username
            )));
        }

        // Fetch every slot concurrently; results keep slot order
        let slots: Vec<(String, u8)> = configs
            .iter()
            .filter(|c| c.enabled)
            .flat_map(|c| (1..=c.kind.slot_count()).map(move |slot| (c.sensor.clone(), slot)))
            .collect();
        let fetches = slots
            .iter()
            .map(|(sensor, slot)| self.source.fetch_tray(&user, sensor, *slot));
        let results = join_all(fetches).await;

        let mut snapshots = Vec::with_capacity(results.len());
        for ((sensor, slot), result) in slots.iter().zip(results) {
            match result {
                Ok(Some(snapshot)) => snapshots.push(snapshot),
                Ok(None) => debug!(sensor = %sensor, slot, "Slot empty"),
                Err(e) => warn!(sensor = %sensor, slot, "Error reading tray: {}", e),
            }
        }

        let mut report = SyncReport::default();
        for snapshot in &snapshots {
            report.outcomes.push(self.reconciler.reconcile_one(owner_id, snapshot).await?);
        }
        report.cleaned = self.reconciler.cleanup_depleted(owner_id).await?;

        info!(
            username = %user.username,
            trays = snapshots.len(),
            cleaned = report.cleaned.len(),
            "Tray sync complete"
        );
        Ok(report)
    }

    /// One pass for every user. A failing user does not stop the others.
    pub async fn sync_all(&self) {
        for user in self.store.list_users().await {
            match self.run_once(&user.id).await {
                Ok(_) => {}
                Err(SyncError::NotConfigured(reason)) => debug!("Skipping sync: {}", reason),
                Err(e) => warn!(username = %user.username, "Error syncing user: {}", e),
            }
        }
    }

    /// Run [`sync_all`](Self::sync_all) immediately and then every
    /// `interval` until `cancel` fires
    pub fn spawn(self: Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!("Tray sync started (every {:?})", interval);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Tray sync stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.sync_all().await;
                    }
                }
            }
        })
    }
}
