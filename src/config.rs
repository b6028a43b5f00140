//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (bot tokens, chat ids) are referenced by env-var name in the
//! config and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::scan::ScanLimits;
use crate::types::{Cadence, ContractType, ScanCriteria};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub scanner: ScannerConfig,
    pub criteria: CriteriaConfig,
    pub telegram: TelegramConfig,
    pub ledger: LedgerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScannerConfig {
    /// Underlyings examined each pass, in scan order.
    pub symbols: Vec<String>,
    pub scan_interval_secs: u64,
    pub cache_duration_secs: u64,
    pub max_expirations: usize,
    pub max_alerts_per_symbol: usize,
    pub inter_alert_delay_ms: u64,
    /// "call" or "put".
    pub contract_type: String,
    /// "daily" or "weekly".
    pub cadence: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CriteriaConfig {
    pub min_volume: u64,
    pub min_volume_oi_ratio: f64,
    pub max_strike_distance: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token_env: String,
    pub chat_id_env: String,
    pub min_send_interval_secs: u64,
    /// Wait before the single retry when a throttle response carries no
    /// Retry-After header.
    pub throttle_retry_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    pub path: String,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}

impl ScannerConfig {
    pub fn contract_type(&self) -> Result<ContractType> {
        self.contract_type.parse()
    }

    pub fn cadence(&self) -> Result<Cadence> {
        self.cadence.parse()
    }

    pub fn limits(&self) -> ScanLimits {
        ScanLimits {
            max_expirations: self.max_expirations,
            max_alerts_per_symbol: self.max_alerts_per_symbol,
            inter_alert_delay: Duration::from_millis(self.inter_alert_delay_ms),
        }
    }

    pub fn cache_duration(&self) -> Duration {
        Duration::from_secs(self.cache_duration_secs)
    }
}

impl CriteriaConfig {
    pub fn to_criteria(&self) -> ScanCriteria {
        ScanCriteria {
            min_volume: self.min_volume,
            min_volume_oi_ratio: self.min_volume_oi_ratio,
            max_strike_distance: self.max_strike_distance,
        }
    }
}
