//! Bootstrap configuration loading and data folder resolution
//!
//! Settings are resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)

use crate::{Error, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable overriding the data folder
pub const ENV_DATA_DIR: &str = "SPK_DATA_DIR";
/// Environment variable overriding the HTTP bind address
pub const ENV_BIND: &str = "SPK_BIND";
/// Environment variable overriding the admin registration key
pub const ENV_ADMIN_KEY: &str = "SPK_ADMIN_KEY";

/// File name of the inventory document inside the data folder
pub const DATABASE_FILE: &str = "database.json";
/// File name of the material reference dataset inside the data folder
pub const MATERIALS_FILE: &str = "materials.json";

/// Default polling period of the sync scheduler
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 60;
/// Default bound on a single sensor request
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
/// Default maximum RGB distance accepted as "the same colour"
pub const DEFAULT_COLOR_THRESHOLD: f64 = 30.0;

const DEFAULT_BIND: &str = "0.0.0.0:3000";
const DEFAULT_ADMIN_KEY: &str = "change-this-key";

/// Contents of the TOML configuration file. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Folder holding database.json and materials.json
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// HTTP listen address, e.g. "0.0.0.0:3000"
    #[serde(default)]
    pub bind: Option<String>,

    /// Key required by POST /register
    #[serde(default)]
    pub admin_registration_key: Option<String>,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub matching: MatchingConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Sync scheduler tuning
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_sync_interval")]
    pub interval_secs: u64,

    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
        }
    }
}

/// Colour matching tuning
#[derive(Debug, Clone, Deserialize)]
pub struct MatchingConfig {
    #[serde(default = "default_color_threshold")]
    pub color_threshold: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            color_threshold: DEFAULT_COLOR_THRESHOLD,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_sync_interval() -> u64 {
    DEFAULT_SYNC_INTERVAL_SECS
}

fn default_fetch_timeout() -> u64 {
    DEFAULT_FETCH_TIMEOUT_SECS
}

fn default_color_threshold() -> f64 {
    DEFAULT_COLOR_THRESHOLD
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Values given on the command line; `None` means "not specified".
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_file: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub bind: Option<String>,
}

/// Fully resolved bootstrap settings
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    pub data_dir: PathBuf,
    pub bind: SocketAddr,
    pub admin_registration_key: String,
    pub sync_interval: Duration,
    pub fetch_timeout: Duration,
    pub color_threshold: f64,
    pub log_level: String,
}

impl BootstrapConfig {
    /// Resolve every setting through the CLI → ENV → TOML → default chain.
    ///
    /// A missing config file is not an error, even one named with
    /// `--config`: a warning is logged and compiled defaults are used. A file
    /// that exists but cannot be read or parsed is an error.
    pub fn resolve(cli: &CliOverrides) -> Result<Self> {
        let toml_config = match cli.config_file.clone().or_else(locate_config_file) {
            Some(path) if path.exists() => load_toml_config(&path)?,
            Some(path) => {
                warn!("Config file {} not found, using built-in defaults", path.display());
                TomlConfig::default()
            }
            None => {
                warn!("No config file found, using built-in defaults");
                TomlConfig::default()
            }
        };
        Self::from_sources(cli, &toml_config)
    }

    /// Resolve against an already loaded TOML document
    pub fn from_sources(cli: &CliOverrides, toml_config: &TomlConfig) -> Result<Self> {
        let data_dir = resolve_data_dir(cli.data_dir.as_deref(), ENV_DATA_DIR, toml_config);

        let bind_str = cli
            .bind
            .clone()
            .or_else(|| std::env::var(ENV_BIND).ok())
            .or_else(|| toml_config.bind.clone())
            .unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_str
            .parse::<SocketAddr>()
            .map_err(|e| Error::Config(format!("Invalid bind address '{}': {}", bind_str, e)))?;

        let admin_registration_key = std::env::var(ENV_ADMIN_KEY)
            .ok()
            .or_else(|| toml_config.admin_registration_key.clone())
            .unwrap_or_else(|| DEFAULT_ADMIN_KEY.to_string());

        if toml_config.sync.interval_secs == 0 {
            return Err(Error::Config("sync.interval_secs must be at least 1".to_string()));
        }
        if !(toml_config.matching.color_threshold > 0.0) {
            return Err(Error::Config(
                "matching.color_threshold must be positive".to_string(),
            ));
        }

        Ok(Self {
            data_dir,
            bind,
            admin_registration_key,
            sync_interval: Duration::from_secs(toml_config.sync.interval_secs),
            fetch_timeout: Duration::from_secs(toml_config.sync.fetch_timeout_secs),
            color_threshold: toml_config.matching.color_threshold,
            log_level: toml_config.logging.level.clone(),
        })
    }

    /// Path of the inventory document
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    /// Path of the material reference dataset
    pub fn materials_path(&self) -> PathBuf {
        self.data_dir.join(MATERIALS_FILE)
    }

    /// Create the data folder if it does not exist yet
    pub fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)?;
            info!("Created data folder: {}", self.data_dir.display());
        }
        Ok(())
    }
}

/// Data folder resolution: CLI, then environment, then TOML, then OS default
pub fn resolve_data_dir(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_config: &TomlConfig,
) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = &toml_config.data_dir {
        return path.clone();
    }

    // Priority 4: OS-dependent compiled default
    default_data_dir()
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Find the first existing config file among the platform locations
pub fn locate_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("spoolkeeper").join("config.toml"));
    let system_config = PathBuf::from("/etc/spoolkeeper/config.toml");

    user_config
        .into_iter()
        .chain(std::iter::once(system_config))
        .find(|path| path.exists())
}

/// OS-dependent default data folder
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("spoolkeeper"))
        .unwrap_or_else(|| PathBuf::from("./data"))
}
