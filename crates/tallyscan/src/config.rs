//! Configuration management for tallyscan.
//!
//! Configuration is layered with figment: built-in defaults, then a TOML
//! file, then environment variables.

use std::path::PathBuf;

use chrono::Weekday;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::transaction::validate_currency;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "tallyscan";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "tallyscan.db";

/// Prefix for environment overrides.
///
/// Nested keys use a double underscore: `TALLYSCAN_SCAN__CONCURRENCY=8`.
const ENV_PREFIX: &str = "TALLYSCAN_";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `TALLYSCAN_`)
/// 2. TOML config file at `~/.config/tallyscan/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Receipt scanning configuration.
    pub scan: ScanConfig,
    /// Defaults for newly created settings.
    pub defaults: DefaultsConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/tallyscan/tallyscan.db`
    pub database_path: Option<PathBuf>,
    /// Number of transactions listed when no limit is given.
    pub recent_limit: usize,
}

/// Scanning-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Number of receipts scanned at once.
    pub concurrency: usize,
    /// Results below this confidence are flagged for review.
    pub review_threshold: f32,
    /// Maximum number of images in one batch.
    pub max_batch_size: usize,
}

/// Defaults applied when no settings have been saved yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// ISO 4217 currency code.
    pub currency: String,
    /// First day of the week for weekly reports.
    pub week_start: Weekday,
    /// Rows per page in transaction listings.
    pub page_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            recent_limit: 20,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            review_threshold: 0.7,
            max_batch_size: 50,
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            currency: crate::transaction::DEFAULT_CURRENCY.to_string(),
            week_start: Weekday::Mon,
            page_size: 20,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let config: Config = Self::figment(config_file).extract()?;
        config.validate()?;
        Ok(config)
    }

    fn figment(config_file: PathBuf) -> Figment {
        Self::layered(config_file, Env::prefixed(ENV_PREFIX))
    }

    /// Defaults, then the TOML file, then `env`. Top-level TOML tables map
    /// to config sections, not figment profiles.
    fn layered(config_file: PathBuf, env: Env) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_file))
            .merge(env.split("__"))
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| Err(Error::ConfigValidation { message });

        if self.scan.concurrency == 0 {
            return invalid("scan.concurrency must be greater than 0".to_string());
        }
        if self.scan.max_batch_size == 0 {
            return invalid("scan.max_batch_size must be greater than 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.scan.review_threshold) {
            return invalid(format!(
                "scan.review_threshold must be between 0 and 1, got {}",
                self.scan.review_threshold
            ));
        }
        if self.defaults.page_size == 0 {
            return invalid("defaults.page_size must be greater than 0".to_string());
        }
        if validate_currency(&self.defaults.currency).is_err() {
            return invalid(format!(
                "defaults.currency '{}' is not a 3-letter code",
                self.defaults.currency
            ));
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }
}
