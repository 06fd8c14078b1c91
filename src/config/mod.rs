mod env;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Complete sync configuration.
///
/// Every section is optional in the TOML file; environment variables are
/// applied on top by [`SyncConfig::apply_env`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub hubspot: HubSpotConfig,
    #[serde(default)]
    pub backoff: BackoffConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub properties: PropertiesConfig,
    /// Skip persisting accounts after a run (watermarks stay where they were)
    #[serde(default)]
    pub dry_run: bool,
}

/// HubSpot API endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct HubSpotConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_base_url() -> String {
    "https://api.hubapi.com".to_string()
}

impl Default for HubSpotConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

/// Retry policy for remote calls
#[derive(Debug, Clone, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay; retry `n` waits `base_delay_ms * 2^n`
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    4
}

fn default_base_delay_ms() -> u64 {
    5000
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

/// Search pagination limits
#[derive(Debug, Clone, Deserialize)]
pub struct PaginationConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Highest offset the provider serves; reaching it triggers a rebase
    #[serde(default = "default_offset_ceiling")]
    pub offset_ceiling: u64,
}

fn default_page_size() -> u32 {
    100
}

fn default_offset_ceiling() -> u64 {
    9900
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            offset_ceiling: default_offset_ceiling(),
        }
    }
}

/// Action queue batching
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,
}

fn default_flush_threshold() -> usize {
    2000
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            flush_threshold: default_flush_threshold(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    #[default]
    Log,
    Http,
}

/// Where emitted actions go
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SinkConfig {
    #[serde(default)]
    pub kind: SinkKind,
    /// Base URL for the HTTP sink
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

/// Account database
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_path() -> String {
    "accounts.db".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

/// Extra provider properties to pull per resource
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PropertiesConfig {
    #[serde(default)]
    pub companies: Vec<String>,
    #[serde(default)]
    pub contacts: Vec<String>,
    #[serde(default)]
    pub meetings: Vec<String>,
}

/// Load configuration from a TOML file
pub fn load_config(path: &str) -> Result<SyncConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path))?;
    let config: SyncConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file '{}'", path))?;
    Ok(config)
}
