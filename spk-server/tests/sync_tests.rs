//! Sync scheduler tests with a scripted tray source

use async_trait::async_trait;
use spk_common::models::{AmsKind, HassMode, TraySnapshot, User};
use spk_server::catalog::MaterialCatalog;
use spk_server::reconcile::{ReconcileAction, TrayReconciler};
use spk_server::store::{FilamentFields, InventoryStore, NewAmsConfig, NewUser, UserSettingsPatch};
use spk_server::sync::{HassError, SyncError, SyncScheduler, TraySource};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Returns canned results per `(sensor, slot)` and records every request
#[derive(Default)]
struct ScriptedSource {
    trays: HashMap<(String, u8), Result<TraySnapshot, ()>>,
    calls: Mutex<Vec<(String, u8)>>,
}

impl ScriptedSource {
    fn with_tray(mut self, sensor: &str, slot: u8, tag: &str, remain: i32) -> Self {
        let snapshot = TraySnapshot {
            tag_id: tag.into(),
            material_type: Some("PLA".into()),
            display_name: Some("Generic PLA".into()),
            color: Some("#FF0000".into()),
            remaining_percent: Some(remain),
            ..Default::default()
        };
        self.trays.insert((sensor.into(), slot), Ok(snapshot));
        self
    }

    fn with_failure(mut self, sensor: &str, slot: u8) -> Self {
        self.trays.insert((sensor.into(), slot), Err(()));
        self
    }

    fn calls(&self) -> Vec<(String, u8)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TraySource for ScriptedSource {
    async fn fetch_tray(&self, _: &User, sensor: &str, slot: u8) -> Result<Option<TraySnapshot>, HassError> {
        self.calls.lock().unwrap().push((sensor.to_string(), slot));
        match self.trays.get(&(sensor.to_string(), slot)) {
            Some(Ok(snapshot)) => Ok(Some(snapshot.clone())),
            Some(Err(())) => Err(HassError::Timeout),
            None => Ok(None),
        }
    }
}

struct Fixture {
    _dir: TempDir,
    store: Arc<InventoryStore>,
    scheduler: Arc<SyncScheduler>,
    source: Arc<ScriptedSource>,
}

async fn setup(source: ScriptedSource) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(InventoryStore::load(dir.path().join("database.json")).await.unwrap());
    let catalog = Arc::new(MaterialCatalog::with_entries(
        dir.path().join("materials.json"),
        30.0,
        Vec::new(),
    ));
    let reconciler = Arc::new(TrayReconciler::new(store.clone(), catalog));
    let source = Arc::new(source);
    let scheduler = Arc::new(SyncScheduler::new(store.clone(), reconciler, source.clone()));
    Fixture {
        _dir: dir,
        store,
        scheduler,
        source,
    }
}

async fn polling_user(store: &InventoryStore, username: &str) -> User {
    let user = store
        .create_user(NewUser {
            username: username.into(),
            email: format!("{}@local", username),
            ..Default::default()
        })
        .await
        .unwrap();
    store
        .update_user_settings(
            &user.id,
            UserSettingsPatch {
                hass_url: Some("http://ha.local:8123".into()),
                hass_token: Some("token".into()),
                hass_mode: Some(HassMode::Polling),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap()
}

async fn add_unit(store: &InventoryStore, owner: &str, sensor: &str, kind: AmsKind, enabled: bool) {
    store
        .add_ams_config(
            owner,
            NewAmsConfig {
                name: sensor.into(),
                kind,
                sensor: sensor.into(),
                enabled,
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_pass_reconciles_in_slot_order() {
    let source = ScriptedSource::default()
        .with_tray("sensor.ams_1", 3, "A3", 50)
        .with_tray("sensor.ams_1", 1, "A1", 70)
        .with_tray("sensor.ams_ht", 1, "H1", 90);
    let fx = setup(source).await;
    let user = polling_user(&fx.store, "alice").await;
    add_unit(&fx.store, &user.id, "sensor.ams_1", AmsKind::Ams, true).await;
    add_unit(&fx.store, &user.id, "sensor.ams_ht", AmsKind::AmsHt, true).await;

    let report = fx.scheduler.run_once(&user.id).await.unwrap();

    let tags: Vec<_> = report
        .outcomes
        .iter()
        .map(|o| o.tag_id.clone().unwrap_or_default())
        .collect();
    assert_eq!(tags, vec!["A1", "A3", "H1"]);
    assert!(report.outcomes.iter().all(|o| o.action == ReconcileAction::Created));

    let mut calls = fx.source.calls();
    calls.sort();
    assert_eq!(calls.len(), 5);
    assert_eq!(calls[4], ("sensor.ams_ht".to_string(), 1));
    assert_eq!(fx.store.get_by_owner(&user.id).await.len(), 3);
}

#[tokio::test]
async fn test_disabled_unit_is_not_polled() {
    let fx = setup(ScriptedSource::default().with_tray("sensor.off", 1, "X1", 50)).await;
    let user = polling_user(&fx.store, "alice").await;
    add_unit(&fx.store, &user.id, "sensor.off", AmsKind::AmsLite, false).await;
    add_unit(&fx.store, &user.id, "sensor.on", AmsKind::AmsHt, true).await;

    let report = fx.scheduler.run_once(&user.id).await.unwrap();
    assert!(report.outcomes.is_empty());
    assert_eq!(fx.source.calls(), vec![("sensor.on".to_string(), 1)]);
}

#[tokio::test]
async fn test_failed_slot_is_treated_as_absent() {
    let source = ScriptedSource::default()
        .with_tray("sensor.ams_1", 1, "A1", 70)
        .with_failure("sensor.ams_1", 2)
        .with_tray("sensor.ams_1", 3, "A3", 40);
    let fx = setup(source).await;
    let user = polling_user(&fx.store, "alice").await;
    add_unit(&fx.store, &user.id, "sensor.ams_1", AmsKind::Ams2Pro, true).await;

    let report = fx.scheduler.run_once(&user.id).await.unwrap();
    assert_eq!(report.outcomes.len(), 2);
    assert!(fx.store.get_by_tag("A1").await.is_some());
    assert!(fx.store.get_by_tag("A3").await.is_some());
}

#[tokio::test]
async fn test_cleanup_runs_after_pass() {
    let fx = setup(ScriptedSource::default().with_tray("sensor.ams_1", 1, "A1", 70)).await;
    let user = polling_user(&fx.store, "alice").await;
    add_unit(&fx.store, &user.id, "sensor.ams_1", AmsKind::Ams, true).await;
    fx.store
        .create(
            &user.id,
            FilamentFields {
                tag_id: Some("OLD".into()),
                remaining_percent: Some(0),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let report = fx.scheduler.run_once(&user.id).await.unwrap();
    assert_eq!(report.cleaned, vec!["OLD".to_string()]);
    assert!(fx.store.get_by_tag("OLD").await.is_none());
    assert!(fx.store.get_by_tag("A1").await.is_some());
}

#[tokio::test]
async fn test_unconfigured_users_are_rejected() {
    let fx = setup(ScriptedSource::default()).await;

    assert!(matches!(
        fx.scheduler.run_once("user-missing").await,
        Err(SyncError::UnknownUser(_))
    ));

    let webhook_user = fx
        .store
        .create_user(NewUser {
            username: "bob".into(),
            email: "bob@local".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(matches!(
        fx.scheduler.run_once(&webhook_user.id).await,
        Err(SyncError::NotConfigured(_))
    ));

    let no_units = polling_user(&fx.store, "carol").await;
    assert!(matches!(
        fx.scheduler.run_once(&no_units.id).await,
        Err(SyncError::NotConfigured(_))
    ));

    let no_token = polling_user(&fx.store, "dave").await;
    add_unit(&fx.store, &no_token.id, "sensor.ams_1", AmsKind::Ams, true).await;
    fx.store
        .update_user_settings(
            &no_token.id,
            UserSettingsPatch {
                hass_token: Some(String::new()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(matches!(
        fx.scheduler.run_once(&no_token.id).await,
        Err(SyncError::NotConfigured(_))
    ));

    assert!(fx.source.calls().is_empty());
}

#[tokio::test]
async fn test_sync_all_skips_unconfigured_users() {
    let fx = setup(ScriptedSource::default().with_tray("sensor.ams_1", 2, "A2", 60)).await;
    fx.store
        .create_user(NewUser {
            username: "idle".into(),
            email: "idle@local".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    let user = polling_user(&fx.store, "alice").await;
    add_unit(&fx.store, &user.id, "sensor.ams_1", AmsKind::Ams, true).await;

    fx.scheduler.sync_all().await;

    let record = fx.store.get_by_tag("A2").await.unwrap();
    assert_eq!(record.owner_id, user.id);
}

#[tokio::test]
async fn test_spawned_loop_stops_on_cancel() {
    let fx = setup(ScriptedSource::default().with_tray("sensor.ams_1", 1, "A1", 70)).await;
    let user = polling_user(&fx.store, "alice").await;
    add_unit(&fx.store, &user.id, "sensor.ams_1", AmsKind::Ams, true).await;

    let cancel = CancellationToken::new();
    let handle = fx
        .scheduler
        .clone()
        .spawn(Duration::from_secs(3600), cancel.clone());

    // First tick fires immediately
    let synced = tokio::time::timeout(Duration::from_secs(5), async {
        while fx.store.get_by_tag("A1").await.is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(synced.is_ok());

    cancel.cancel();
    let stopped = tokio::time::timeout(Duration::from_secs(5), handle).await;
    assert!(matches!(stopped, Ok(Ok(()))));
}
