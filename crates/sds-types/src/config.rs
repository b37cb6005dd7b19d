//! Configuration loading for the smart data store.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at `<config dir>/smart-data-store/config.toml`.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::RegistryError;
use crate::retention::{
    DropMode, RetentionPolicy, DEFAULT_MAX_DAYS, DEFAULT_MAX_ENTRIES, DEFAULT_NUM_TO_AGE,
};
use crate::state::State;

const APP_NAME: &str = "smart-data-store";

/// Which retention branch is active
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// Bound tables by row count (default)
    #[default]
    Limited,
    /// Bound tables by row age
    MaxDays,
}

/// Retention settings as they appear in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionSettings {
    #[serde(default)]
    pub policy: PolicyKind,

    /// Row limit per table for the limited policy
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,

    /// Rows evicted per insert once the limit is reached
    #[serde(default = "default_num_to_age")]
    pub num_to_age: u64,

    #[serde(default)]
    pub drop_mode: DropMode,

    /// Age limit for the max_days policy
    #[serde(default = "default_max_days")]
    pub max_days: u32,
}

fn default_max_entries() -> u64 {
    DEFAULT_MAX_ENTRIES
}

fn default_num_to_age() -> u64 {
    DEFAULT_NUM_TO_AGE
}

fn default_max_days() -> u32 {
    DEFAULT_MAX_DAYS
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            policy: PolicyKind::default(),
            max_entries: default_max_entries(),
            num_to_age: default_num_to_age(),
            drop_mode: DropMode::default(),
            max_days: default_max_days(),
        }
    }
}

impl RetentionSettings {
    /// Build and validate the active retention policy.
    pub fn to_policy(&self) -> Result<RetentionPolicy, RegistryError> {
        let policy = match self.policy {
            PolicyKind::Limited => {
                RetentionPolicy::limited(self.max_entries, self.num_to_age, self.drop_mode)
            }
            PolicyKind::MaxDays => RetentionPolicy::max_days(self.max_days),
        };
        policy.validate().map_err(RegistryError::Config)?;
        Ok(policy)
    }
}

/// Publish settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishSettings {
    /// State applied to rows after the transport accepted them
    #[serde(default = "default_success_state")]
    pub success_state: State,
}

fn default_success_state() -> State {
    State::Sent
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            success_state: default_success_state(),
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path to the SQLite database file
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// SQLCipher key; never written back out
    #[serde(default, skip_serializing)]
    pub encryption_key: Option<SecretString>,

    #[serde(default)]
    pub retention: RetentionSettings,

    #[serde(default)]
    pub publish: PublishSettings,
}

fn default_db_path() -> String {
    ProjectDirs::from("", "", APP_NAME)
        .map(|p| p.data_local_dir().join("sds.db"))
        .unwrap_or_else(|| PathBuf::from("./sds.db"))
        .to_string_lossy()
        .to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            log_level: default_log_level(),
            encryption_key: None,
            retention: RetentionSettings::default(),
            publish: PublishSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (`<config dir>/smart-data-store/config.toml`)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (`SDS_DB_PATH`, `SDS_RETENTION__MAX_DAYS`, ...)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, RegistryError> {
        let config_dir = ProjectDirs::from("", "", APP_NAME)
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("db_path", default_db_path())
            .map_err(|e| RegistryError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| RegistryError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("SDS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| RegistryError::Config(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| RegistryError::Config(e.to_string()))
    }

    /// Expand a leading `~/` in db_path
    pub fn expanded_db_path(&self) -> PathBuf {
        if let Some(rest) = self.db_path.strip_prefix("~/") {
            if let Some(dirs) = directories::BaseDirs::new() {
                return dirs.home_dir().join(rest);
            }
        }
        PathBuf::from(&self.db_path)
    }
}
