//! Unit tests for bootstrap configuration resolution
//!
//! Covers the CLI → ENV → TOML → default priority chain and TOML parsing.
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate SPK_* variables are marked with #[serial].

use serial_test::serial;
use spk_common::config::{
    load_toml_config, resolve_data_dir, BootstrapConfig, CliOverrides, TomlConfig,
    DEFAULT_COLOR_THRESHOLD, DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_SYNC_INTERVAL_SECS, ENV_BIND,
    ENV_DATA_DIR,
};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn clear_env() {
    env::remove_var(ENV_DATA_DIR);
    env::remove_var(ENV_BIND);
    env::remove_var("SPK_ADMIN_KEY");
}

#[test]
fn test_toml_defaults_when_keys_missing() {
    let config: TomlConfig = toml::from_str("").unwrap();
    assert!(config.data_dir.is_none());
    assert_eq!(config.sync.interval_secs, DEFAULT_SYNC_INTERVAL_SECS);
    assert_eq!(config.sync.fetch_timeout_secs, DEFAULT_FETCH_TIMEOUT_SECS);
    assert_eq!(config.matching.color_threshold, DEFAULT_COLOR_THRESHOLD);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_toml_full_document() {
    let config: TomlConfig = toml::from_str(
        r#"
        data_dir = "/srv/spools"
        bind = "127.0.0.1:8080"
        admin_registration_key = "secret"

        [sync]
        interval_secs = 120
        fetch_timeout_secs = 5

        [matching]
        color_threshold = 12.5

        [logging]
        level = "debug"
        "#,
    )
    .unwrap();

    assert_eq!(config.data_dir, Some(PathBuf::from("/srv/spools")));
    assert_eq!(config.bind.as_deref(), Some("127.0.0.1:8080"));
    assert_eq!(config.sync.interval_secs, 120);
    assert_eq!(config.matching.color_threshold, 12.5);
    assert_eq!(config.logging.level, "debug");
}

#[test]
#[serial]
fn test_cli_overrides_env_and_toml() {
    clear_env();
    env::set_var(ENV_DATA_DIR, "/tmp/spk-env");
    let toml_config = TomlConfig {
        data_dir: Some(PathBuf::from("/tmp/spk-toml")),
        ..Default::default()
    };

    let resolved = resolve_data_dir(Some(Path::new("/tmp/spk-cli")), ENV_DATA_DIR, &toml_config);
    assert_eq!(resolved, PathBuf::from("/tmp/spk-cli"));

    clear_env();
}

#[test]
#[serial]
fn test_env_overrides_toml() {
    clear_env();
    env::set_var(ENV_DATA_DIR, "/tmp/spk-env");
    let toml_config = TomlConfig {
        data_dir: Some(PathBuf::from("/tmp/spk-toml")),
        ..Default::default()
    };

    let resolved = resolve_data_dir(None, ENV_DATA_DIR, &toml_config);
    assert_eq!(resolved, PathBuf::from("/tmp/spk-env"));

    clear_env();
}

#[test]
#[serial]
fn test_toml_used_without_cli_or_env() {
    clear_env();
    let toml_config = TomlConfig {
        data_dir: Some(PathBuf::from("/tmp/spk-toml")),
        ..Default::default()
    };

    let resolved = resolve_data_dir(None, ENV_DATA_DIR, &toml_config);
    assert_eq!(resolved, PathBuf::from("/tmp/spk-toml"));
}

#[test]
#[serial]
fn test_bootstrap_resolution_and_paths() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let cli = CliOverrides {
        config_file: None,
        data_dir: Some(dir.path().join("data")),
        bind: Some("127.0.0.1:4000".to_string()),
    };

    let config = BootstrapConfig::from_sources(&cli, &TomlConfig::default()).unwrap();
    assert_eq!(config.bind.port(), 4000);
    assert_eq!(config.sync_interval, Duration::from_secs(60));
    assert_eq!(config.fetch_timeout, Duration::from_secs(10));
    assert_eq!(config.database_path(), dir.path().join("data").join("database.json"));
    assert_eq!(config.materials_path(), dir.path().join("data").join("materials.json"));

    config.ensure_data_dir().unwrap();
    assert!(dir.path().join("data").is_dir());
}

#[test]
#[serial]
fn test_invalid_bind_is_config_error() {
    clear_env();
    let cli = CliOverrides {
        bind: Some("not-an-address".to_string()),
        ..Default::default()
    };
    let err = BootstrapConfig::from_sources(&cli, &TomlConfig::default()).unwrap_err();
    assert!(err.to_string().contains("Invalid bind address"));
}

#[test]
#[serial]
fn test_zero_interval_rejected() {
    clear_env();
    let mut toml_config = TomlConfig::default();
    toml_config.sync.interval_secs = 0;
    assert!(BootstrapConfig::from_sources(&CliOverrides::default(), &toml_config).is_err());
}

#[test]
#[serial]
fn test_explicit_config_file_is_loaded() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        format!(
            "data_dir = \"{}\"\n[matching]\ncolor_threshold = 20.0\n",
            dir.path().display()
        ),
    )
    .unwrap();

    let cli = CliOverrides {
        config_file: Some(path.clone()),
        ..Default::default()
    };
    let config = BootstrapConfig::resolve(&cli).unwrap();
    assert_eq!(config.data_dir, dir.path());
    assert_eq!(config.color_threshold, 20.0);

    let loaded = load_toml_config(&path).unwrap();
    assert_eq!(loaded.data_dir.as_deref(), Some(dir.path()));
}

#[test]
fn test_loader_rejects_unreadable_file() {
    assert!(load_toml_config(Path::new("/nonexistent/spoolkeeper.toml")).is_err());
}

#[test]
#[serial]
fn test_missing_explicit_config_file_falls_back_to_defaults() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let cli = CliOverrides {
        config_file: Some(dir.path().join("absent.toml")),
        data_dir: Some(dir.path().to_path_buf()),
        ..Default::default()
    };

    let config = BootstrapConfig::resolve(&cli).unwrap();
    assert_eq!(config.data_dir, dir.path());
    assert_eq!(config.color_threshold, DEFAULT_COLOR_THRESHOLD);
    assert_eq!(config.sync_interval, Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS));
}

#[test]
#[serial]
fn test_malformed_explicit_config_file_is_error() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[sync\ninterval_secs = ").unwrap();

    let cli = CliOverrides {
        config_file: Some(path),
        ..Default::default()
    };
    assert!(BootstrapConfig::resolve(&cli).is_err());
}
