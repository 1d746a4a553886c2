//! Configuration management for motorpool.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{Project, DEFAULT_LOCATION};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "motorpool";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "motorpool.db";

/// Default cache directory name, inside the data directory.
const CACHE_DIR_NAME: &str = "cache";

/// Prefix for environment overrides.
const ENV_PREFIX: &str = "MOTORPOOL_";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `MOTORPOOL_`, sections split on `__`)
/// 2. TOML config file at `~/.config/motorpool/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backing store configuration.
    pub store: StoreConfig,
    /// Local cache configuration.
    pub cache: CacheConfig,
    /// Ledger behaviour.
    pub ledger: LedgerConfig,
}

/// Shown in place of a configured secret.
pub const MASKED_SECRET: &str = "********";

fn mask_secret<S: serde::Serializer>(
    value: &Option<String>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match value {
        Some(_) => serializer.serialize_some(MASKED_SECRET),
        None => serializer.serialize_none(),
    }
}

/// Which repository implementation to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Embedded `SQLite` database.
    #[default]
    Sqlite,
    /// Hosted database behind a `PostgREST` endpoint.
    Postgrest,
    /// In-process store; nothing survives the process.
    Memory,
}

impl Backend {
    /// Configuration name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgrest => "postgrest",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "postgrest" => Ok(Self::Postgrest),
            "memory" => Ok(Self::Memory),
            _ => Err(Error::invalid_input("backend", s)),
        }
    }
}

/// Store-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Repository implementation.
    pub backend: Backend,
    /// Path to the database file.
    /// Defaults to `~/.local/share/motorpool/motorpool.db`
    pub database_path: Option<PathBuf>,
    /// Base URL of the hosted project, e.g. `https://abc.supabase.co`.
    pub url: Option<String>,
    /// Anonymous API key for the hosted project. Masked when serialized.
    #[serde(serialize_with = "mask_secret")]
    pub api_key: Option<String>,
    /// HTTP request timeout in seconds.
    pub timeout_secs: u64,
}

    /// Local cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Mirror state to disk and read it back at startup.
    pub enabled: bool,
    /// Cache directory.
    /// Defaults to `~/.local/share/motorpool/cache`
    pub dir: Option<PathBuf>,
}

/// Ledger behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Site selected at startup.
    pub default_project: Project,
    /// Let check-in succeed when a vehicle has no ongoing trip.
    pub allow_orphan_check_in: bool,
    /// Location suggested on check-in.
    pub default_location: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Sqlite,
            database_path: None, // Will be resolved to default at runtime
            url: None,
            api_key: None,
            timeout_secs: 10,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            default_project: Project::default(),
            allow_orphan_check_in: true,
            default_location: DEFAULT_LOCATION.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. TOML config file (if exists)
    /// 3. Environment variables (prefixed with `MOTORPOOL_`)
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
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
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
        if self.store.backend == Backend::Postgrest {
            if is_blank(self.store.url.as_deref()) {
                return Err(Error::ConfigValidation {
                    message: "store.url is required for the postgrest backend".to_string(),
                });
            }
            if is_blank(self.store.api_key.as_deref()) {
                return Err(Error::ConfigValidation {
                    message: "store.api_key is required for the postgrest backend".to_string(),
                });
            }
        }

        if self.store.timeout_secs == 0 {
            return Err(Error::ConfigValidation {
                message: "timeout_secs must be greater than 0".to_string(),
            });
        }

        if self.ledger.default_location.trim().is_empty() {
            return Err(Error::ConfigValidation {
                message: "default_location must not be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.store
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the cache directory, resolving defaults if not set.
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.cache
            .dir
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(CACHE_DIR_NAME))
    }

    /// Get the HTTP timeout as a Duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.store.timeout_secs)
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}
