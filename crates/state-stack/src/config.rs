//! Store configuration
//!
//! Configuration loaded from `.state-stack.toml`. Every field has a default, so
//! a partial file (or none at all) is fine.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const CONFIG_FILE: &str = ".state-stack.toml";

/// Top-level configuration, one table per concern.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackConfig {
    #[serde(default)]
    pub logger: LoggerConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub api: ApiConfig,
}

/// Settings for [`LoggerMiddleware`](crate::LoggerMiddleware).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// Install the logger at all
    #[serde(default = "default_logger_enabled")]
    pub enabled: bool,

    /// `log` level actions are emitted at ("error" ... "trace")
    #[serde(default = "default_logger_level")]
    pub level: String,

    /// How many entries the in-memory history keeps (0 keeps none)
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Compute the changed top-level keys for each entry
    #[serde(default = "default_logger_diff")]
    pub diff: bool,
}

/// Settings for [`combine_reducers`](crate::combine_reducers).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Check every slice for an initial state when the root reducer is built
    #[serde(default = "default_validate_slices")]
    pub validate_slices: bool,

    /// Warn about preloaded keys that no slice reducer owns
    #[serde(default = "default_warn_unexpected_keys")]
    pub warn_unexpected_keys: bool,
}

/// Settings for [`ApiMiddleware`](crate::ApiMiddleware).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Prefix for relative request URLs
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_logger_enabled() -> bool {
    true
}

fn default_logger_level() -> String {
    "debug".to_string()
}

fn default_max_entries() -> usize {
    100
}

fn default_logger_diff() -> bool {
    true
}

fn default_validate_slices() -> bool {
    true
}

fn default_warn_unexpected_keys() -> bool {
    true
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            enabled: default_logger_enabled(),
            level: default_logger_level(),
            max_entries: default_max_entries(),
            diff: default_logger_diff(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            validate_slices: default_validate_slices(),
            warn_unexpected_keys: default_warn_unexpected_keys(),
        }
    }
}

impl LoggerConfig {
    /// The configured level, falling back to `Debug` for unknown names.
    pub fn level(&self) -> log::Level {
        self.level.parse().unwrap_or_else(|_| {
            log::warn!("Unknown logger level \"{}\", using debug", self.level);
            log::Level::Debug
        })
    }
}

impl StackConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load config from CWD first, then home directory, or use defaults
    pub fn load() -> Self {
        if let Some(content) = load_config_file() {
            match Self::from_toml_str(&content) {
                Ok(config) => {
                    log::info!("Loaded store config from file");
                    return config;
                }
                Err(e) => {
                    log::warn!("Failed to parse config file: {}", e);
                }
            }
        }

        log::debug!("Using default store config");
        Self::default()
    }
}

fn load_config_file() -> Option<String> {
    if let Ok(content) = std::fs::read_to_string(CONFIG_FILE) {
        log::debug!("Loaded config from {}", CONFIG_FILE);
        return Some(content);
    }

    let home_config = home_config_path()?;
    let content = std::fs::read_to_string(&home_config).ok()?;
    log::debug!("Loaded config from {}", home_config.display());
    Some(content)
}

fn home_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[test]
    fn test_default_config() {
        let config = StackConfig::default();
        assert!(config.logger.enabled);
        assert_eq!(config.logger.level(), log::Level::Debug);
        assert_eq!(config.logger.max_entries, 100);
        assert!(config.logger.diff);
        assert!(config.store.validate_slices);
        assert!(config.store.warn_unexpected_keys);
        assert_eq!(config.api.base_url, None);
    }

    #[test]
    fn test_config_deserialize_partial() {
        let config = StackConfig::from_toml_str(
            r#"
            [logger]
            level = "trace"
            max_entries = 5

            [api]
            base_url = "https://api.example.test"
        "#,
        )
        .unwrap();

        assert_eq!(config.logger.level(), log::Level::Trace);
        assert_eq!(config.logger.max_entries, 5);
        // Unset fields keep their defaults
        assert!(config.logger.enabled);
        assert!(config.store.validate_slices);
        assert_eq!(config.api.base_url.as_deref(), Some("https://api.example.test"));
    }

    #[test]
    fn test_unknown_level_falls_back_to_debug() {
        let config = LoggerConfig {
            level: "chatty".to_string(),
            ..LoggerConfig::default()
        };
        assert_eq!(config.level(), log::Level::Debug);
    }

    #[test]
    fn test_invalid_toml_is_a_config_error() {
        let err = StackConfig::from_toml_str("[logger\nenabled = ").unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
        assert!(!err.is_contract_violation());
    }
}
