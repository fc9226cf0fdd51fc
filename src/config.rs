//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Every table has defaults, so a partial file (or none at all, via
//! [`AppConfig::load_or_default`]) still yields a runnable config.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::warn;

use crate::eligibility::EligibilityPolicy;
use crate::marketplace::MarketplaceConfig;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub eligibility: EligibilityConfig,
    #[serde(default)]
    pub marketplace: MarketplaceSection,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "LOADBOARD-001".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EligibilityConfig {
    /// Minimum onboarding score, 0–100, inclusive.
    pub score_threshold: u8,
    /// Consent ids every carrier must sign.
    pub required_consents: Vec<String>,
    /// How long an eligible verdict may be reused.
    pub cache_ttl_secs: u64,
}

impl Default for EligibilityConfig {
    fn default() -> Self {
        Self {
            score_threshold: 60,
            required_consents: vec![
                "carrier-agreement".to_string(),
                "w9".to_string(),
                "insurance-certificate".to_string(),
            ],
            cache_ttl_secs: 300,
        }
    }
}

impl EligibilityConfig {
    pub fn policy(&self) -> EligibilityPolicy {
        EligibilityPolicy {
            threshold: self.score_threshold.min(100),
            cache_ttl: chrono::Duration::seconds(self.cache_ttl_secs as i64),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MarketplaceSection {
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl Default for MarketplaceSection {
    fn default() -> Self {
        let defaults = MarketplaceConfig::default();
        Self {
            default_page_size: defaults.default_page_size,
            max_page_size: defaults.max_page_size,
        }
    }
}

impl MarketplaceSection {
    pub fn to_config(&self) -> MarketplaceConfig {
        MarketplaceConfig {
            default_page_size: self.default_page_size,
            max_page_size: self.max_page_size,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub snapshot_path: String,
    pub snapshot_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            snapshot_path: crate::storage::DEFAULT_SNAPSHOT_FILE.to_string(),
            snapshot_interval_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8080,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EventsConfig {
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    pub filter: String,
    /// JSON lines instead of plain text. `LOADBOARD_LOG_JSON` also enables it.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "loadboard=info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Like [`AppConfig::load`], but a missing file means defaults.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            warn!(path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }
}
