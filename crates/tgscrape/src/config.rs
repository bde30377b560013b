//! Configuration parsing and validation.
//!
//! tgscrape is configured via a TOML file (default: `config/tgscrape.toml`).
//! The file defines the database location, the targets to scrape, scrape
//! tunables, and the message bridge endpoint.
//!
//! # Example
//!
//! ```toml
//! targets = ["@durov", "https://t.me/telegram"]
//!
//! [db]
//! path = "./data/tgscrape.sqlite"
//!
//! [scrape]
//! limit_per_target = 2000
//! since_days = 30
//! sleep_min_ms = 600
//! sleep_max_ms = 1400
//! batch_size = 200
//! max_retries = 3
//!
//! [source]
//! base_url = "http://127.0.0.1:8088"
//! token_env = "TGSCRAPE_SOURCE_TOKEN"
//! ```
//!
//! Targets are normalized and deduplicated at load time, so every later
//! stage sees them in canonical `@handle` form.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use tgscrape_core::scrape::ScrapeSettings;
use tgscrape_core::target::normalize_targets;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    /// Targets in config order, normalized after load.
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub scrape: ScrapeConfig,
    #[serde(default)]
    pub source: SourceConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/tgscrape.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScrapeConfig {
    #[serde(default = "default_limit_per_target")]
    pub limit_per_target: u64,
    #[serde(default)]
    pub since_days: Option<u32>,
    #[serde(default = "default_sleep_min_ms")]
    pub sleep_min_ms: u64,
    #[serde(default = "default_sleep_max_ms")]
    pub sleep_max_ms: u64,
    #[serde(default)]
    pub include_media_metadata: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            limit_per_target: default_limit_per_target(),
            since_days: None,
            sleep_min_ms: default_sleep_min_ms(),
            sleep_max_ms: default_sleep_max_ms(),
            include_media_metadata: false,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_limit_per_target() -> u64 {
    2000
}
fn default_sleep_min_ms() -> u64 {
    600
}
fn default_sleep_max_ms() -> u64 {
    1400
}
fn default_batch_size() -> u64 {
    200
}
fn default_max_retries() -> u32 {
    3
}

impl ScrapeConfig {
    pub fn to_settings(&self) -> ScrapeSettings {
        ScrapeSettings {
            limit_per_target: self.limit_per_target,
            since_days: self.since_days,
            sleep_min_ms: self.sleep_min_ms,
            sleep_max_ms: self.sleep_max_ms,
            include_media_metadata: self.include_media_metadata,
            batch_size: self.batch_size,
            max_retries: self.max_retries,
        }
    }
}

/// Connection settings for the HTTP message bridge.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Environment variable holding the bearer token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: default_timeout_secs(),
            token_env: default_token_env(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_token_env() -> String {
    "TGSCRAPE_SOURCE_TOKEN".to_string()
}

impl SourceConfig {
    /// Bearer token from the configured environment variable, if set and non-empty.
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env)
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    config.targets = normalize_targets(&config.targets).context("Invalid entry in targets")?;

    validate_scrape(&config.scrape)?;

    if config.source.timeout_secs == 0 {
        bail!("source.timeout_secs must be > 0");
    }

    Ok(config)
}

fn validate_scrape(scrape: &ScrapeConfig) -> Result<()> {
    if scrape.limit_per_target == 0 {
        bail!("scrape.limit_per_target must be > 0");
    }
    if scrape.sleep_min_ms > scrape.sleep_max_ms {
        bail!(
            "scrape.sleep_min_ms ({}) must be <= scrape.sleep_max_ms ({})",
            scrape.sleep_min_ms,
            scrape.sleep_max_ms
        );
    }
    if scrape.since_days == Some(0) {
        bail!("scrape.since_days must be > 0 when set");
    }
    if scrape.batch_size == 0 {
        bail!("scrape.batch_size must be > 0");
    }
    if scrape.max_retries == 0 {
        bail!("scrape.max_retries must be > 0");
    }
    Ok(())
}
