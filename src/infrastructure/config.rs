//! Configuration infrastructure
//!
//! Contains configuration loading and management for the archive crawler.
//!
//! Configuration is split into two documents:
//! 1. `AppConfig` - crawl, HTTP, cache, logging and page selector settings (JSON, created on first run)
//! 2. `ProxyCredentials` - proxy username, password and egress hosts (JSON, never written)

#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

use super::crawl_error::{CrawlError, CrawlResult};
use super::parsing::config::ExtractionSelectors;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub crawl: CrawlConfig,
    pub http: HttpConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
    pub selectors: ExtractionSelectors,
}

/// Crawl queue, output and politeness settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Folder receiving one `<id>.json` per extracted experience
    pub experiences_dir: PathBuf,

    /// Folder receiving listing output (`<start>_<end>.txt`), also the default URL input folder
    pub listings_dir: PathBuf,

    /// Folder receiving `failed_urls_<Kind>.txt` logs
    pub failure_log_dir: PathBuf,

    /// Lower bound of the wait between non-cached items, in seconds
    pub min_wait_seconds: u64,

    /// Upper bound of the wait between non-cached items, in seconds
    pub max_wait_seconds: u64,

    /// Re-raise item errors instead of logging them (debug mode)
    pub raise_exceptions: bool,

    /// First candidate experience id when no URL list is given
    pub candidate_id_start: u32,

    /// One past the last candidate experience id
    pub candidate_id_end: u32,

    /// Seed for the candidate id shuffle
    pub candidate_seed: u64,

    /// Listing pagination plan
    pub listing: ListingPlanConfig,
}

/// Offsets of the paginated listing crawl
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingPlanConfig {
    pub start: u32,
    pub step: u32,
    pub final_start: u32,
}

/// HTTP identity and block detection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,

    /// Request timeout in seconds
    pub timeout_seconds: u64,

    /// Body substring that marks a soft block
    pub block_marker: String,

    /// Proxy URL scheme, e.g. `socks5`
    pub proxy_scheme: String,

    /// Fixed port used for every egress host
    pub proxy_port: u16,
}

/// Durable response cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub path: PathBuf,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted logs
    pub json_format: bool,

    /// Enable console output
    pub console_output: bool,

    /// Enable file output
    pub file_output: bool,

    /// Directory for log files
    pub log_dir: PathBuf,

    /// Log file name inside `log_dir`
    pub file_name: String,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            experiences_dir: PathBuf::from(defaults::EXPERIENCES_DIR),
            listings_dir: PathBuf::from(defaults::LISTINGS_DIR),
            failure_log_dir: PathBuf::from(defaults::LISTINGS_DIR),
            min_wait_seconds: defaults::MIN_WAIT_SECONDS,
            max_wait_seconds: defaults::MAX_WAIT_SECONDS,
            raise_exceptions: false,
            candidate_id_start: defaults::CANDIDATE_ID_START,
            candidate_id_end: defaults::CANDIDATE_ID_END,
            candidate_seed: defaults::CANDIDATE_SEED,
            listing: ListingPlanConfig::default(),
        }
    }
}

impl Default for ListingPlanConfig {
    fn default() -> Self {
        Self {
            start: defaults::LISTING_START,
            step: defaults::LISTING_STEP,
            final_start: defaults::LISTING_FINAL_START,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::USER_AGENT.to_string(),
            timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            block_marker: defaults::BLOCK_MARKER.to_string(),
            proxy_scheme: defaults::PROXY_SCHEME.to_string(),
            proxy_port: defaults::PROXY_PORT,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from(defaults::CACHE_PATH),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: false,
            console_output: true,
            file_output: false,
            log_dir: PathBuf::from(defaults::LOG_DIR),
            file_name: defaults::LOG_FILE_NAME.to_string(),
        }
    }
}

/// Proxy credentials document: `{"username": .., "password": .., "servers": [..]}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyCredentials {
    pub username: String,
    pub password: String,
    pub servers: Vec<String>,
}

impl ProxyCredentials {
    pub async fn load(path: &Path) -> CrawlResult<Self> {
        let content = fs::read_to_string(path).await?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> CrawlResult<Self> {
        let credentials: Self = serde_json::from_str(content)?;
        if credentials.servers.is_empty() {
            return Err(CrawlError::Configuration(
                "proxy credentials list no servers".to_string(),
            ));
        }
        Ok(credentials)
    }
}

pub struct ConfigManager {
    pub config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join("erowid-crawler");

        Ok(config_dir)
    }

    /// Configuration manager using the per-user config directory
    pub fn new() -> Result<Self> {
        let config_path = Self::get_config_dir()?.join("config.json");
        Ok(Self { config_path })
    }

    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    /// Load configuration from file, creating default if it doesn't exist
    pub async fn load_config(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!("Configuration file not found, creating default: {:?}", self.config_path);
            let default_config = AppConfig::default();
            self.save_config(&default_config).await?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .context("Failed to read configuration file")?;

        let config = serde_json::from_str::<AppConfig>(&content)
            .with_context(|| format!("Invalid configuration file {:?}", self.config_path))?;
        info!("Loaded configuration from: {:?}", self.config_path);
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content =
            serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;

        fs::write(&self.config_path, content)
            .await
            .context("Failed to write configuration file")?;

        info!("Saved configuration to: {:?}", self.config_path);
        Ok(())
    }

    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }
}

/// Erowid website URLs
pub mod erowid {
    /// Detail page URL prefix; the experience id is appended
    pub const EXPERIENCE_URL_PREFIX: &str = "https://www.erowid.org/experiences/exp.php?ID=";

    /// Listing (search results) endpoint
    pub const LISTING_URL: &str = "https://www.erowid.org/experiences/exp.cgi";

    /// Base path prefixed to the relative links found on listing pages
    pub const LISTING_LINK_BASE: &str = "https://www.erowid.org/experiences/";

    /// Fixed listing query parameters, besides `Start` and `Max`
    pub const LISTING_FIXED_PARAMS: &[(&str, &str)] = &[("ShowViews", "0"), ("Cellar", "1")];

    pub fn experience_url(id: u32) -> String {
        format!("{}{}", EXPERIENCE_URL_PREFIX, id)
    }
}

/// Default configuration values
pub mod defaults {
    pub const EXPERIENCES_DIR: &str = "data/experiences_db";
    pub const LISTINGS_DIR: &str = "data/exp_links";
    pub const CACHE_PATH: &str = "data/erowid_cache.sqlite";

    pub const MIN_WAIT_SECONDS: u64 = 20;
    pub const MAX_WAIT_SECONDS: u64 = 23;

    pub const CANDIDATE_ID_START: u32 = 1;
    pub const CANDIDATE_ID_END: u32 = 130_000;
    pub const CANDIDATE_SEED: u64 = 666;

    pub const LISTING_START: u32 = 0;
    pub const LISTING_STEP: u32 = 1000;
    pub const LISTING_FINAL_START: u32 = 39_300;

    pub const USER_AGENT: &str =
        "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:87.0) Gecko/20100101 Firefox/87.0";
    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;
    pub const BLOCK_MARKER: &str = "IP address has been blocked";
    pub const PROXY_SCHEME: &str = "socks5";
    pub const PROXY_PORT: u16 = 1080;

    pub const LOG_LEVEL: &str = "info";
    pub const LOG_DIR: &str = "logs";
    pub const LOG_FILE_NAME: &str = "erowid-crawler.log";
}
