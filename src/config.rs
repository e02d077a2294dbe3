use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryStrategy;
use crate::{olog_debug, Error, Result};

/// Runtime configuration, stored as TOML in `~/.vpn-orchestrator/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub transport: TransportConfig,
}

/// Retry policy for account and device API calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let strategy = RetryStrategy::default();
        Self {
            max_retries: strategy.max_retries,
            initial_delay_ms: strategy.initial_delay.as_millis() as u64,
            max_delay_ms: strategy.max_delay.as_millis() as u64,
            multiplier: strategy.multiplier,
        }
    }
}

impl RetryConfig {
    pub fn strategy(&self) -> RetryStrategy {
        RetryStrategy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: self.multiplier.max(1),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TransportConfig {
    /// Route API traffic through a bridge relay unless the caller says otherwise.
    #[serde(default)]
    pub use_bridges_by_default: bool,
}

impl Config {
    pub fn base_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir()
            .ok_or(Error::NoHomeDir)?
            .join(".vpn-orchestrator"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join("config.toml"))
    }

    pub fn log_path() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join("orchestrator.log"))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        olog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            olog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        olog_debug!(
            "Config loaded: debug={}, max_retries={}, bridges={}",
            config.debug,
            config.retry.max_retries,
            config.transport.use_bridges_by_default
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                olog_debug!("Creating config directory: {}", dir.display());
                fs::create_dir_all(dir)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        olog_debug!("Config saved to {}", path.display());
        Ok(())
    }
}
