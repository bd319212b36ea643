use serde::Deserialize;
use std::fs;
use std::env;
use anyhow::{Context, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub reviews: ReviewsConfig,
    pub storage: StorageConfig,
    pub maintenance: MaintenanceConfig,
    pub activity: ActivityConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReviewsConfig {
    pub daily_limit: u32,
    pub max_review_chars: usize,
    pub max_username_chars: usize,
    pub list_limit: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Development and tests only. Lookups scan every stored review and
    /// nothing survives a restart.
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub database_url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ActivityConfig {
    pub capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enable: bool,
    pub bind_addr: String,
    pub path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_addr: "0.0.0.0:3000".into() }
    }
}

impl Default for ReviewsConfig {
    fn default() -> Self {
        Self {
            daily_limit: 10,
            max_review_chars: 5000,
            max_username_chars: 60,
            list_limit: 200,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            database_url: "sqlite://anime_hub.db?mode=rwc".into(),
            max_connections: 5,
        }
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self { interval_secs: 3600 }
    }
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self { capacity: 1000 }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enable: false,
            bind_addr: "127.0.0.1:9100".into(),
            path: "/metrics".into(),
        }
    }
}

pub fn load_config() -> Result<Config> {
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());

    let config_content = fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read config file: {}", config_path))?;

    parse_config(&config_content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content)
        .with_context(|| "Failed to parse configuration")?;

    Ok(config)
}
