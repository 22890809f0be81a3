//! Configuration management for the outreach service.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Default marketplace seller API base URL.
pub const DEFAULT_MARKETPLACE_URL: &str = "https://api-seller.ozon.ru";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Main service configuration, stored as `config.json` in the base directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Marketplace seller API credentials and endpoint.
    #[serde(default)]
    pub marketplace: MarketplaceConfig,
    /// Delivery queue tuning.
    #[serde(default)]
    pub outreach: OutreachTuning,
}

/// Marketplace seller API settings used for sending chat messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketplaceConfig {
    #[serde(default = "default_marketplace_url")]
    pub base_url: String,
    /// Client id with write access to seller chats.
    #[serde(default)]
    pub client_id: String,
    /// API key paired with `client_id`. Usually supplied through the environment.
    #[serde(default, skip_serializing)]
    pub api_key: String,
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

/// Tunables for the outreach delivery queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutreachTuning {
    /// Capacity of the in-memory delivery queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Global floor between two outbound sends, in milliseconds.
    #[serde(default = "default_min_send_interval_ms")]
    pub min_send_interval_ms: u64,
    /// How long a delivered idempotency key is remembered.
    #[serde(default = "default_sent_retention_days")]
    pub sent_retention_days: u32,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_marketplace_url() -> String {
    DEFAULT_MARKETPLACE_URL.to_string()
}

fn default_http_timeout_secs() -> u64 {
    35
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_min_send_interval_ms() -> u64 {
    1000
}

fn default_sent_retention_days() -> u32 {
    30
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            base_url: default_marketplace_url(),
            client_id: String::new(),
            api_key: String::new(),
            timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl Default for OutreachTuning {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            min_send_interval_ms: default_min_send_interval_ms(),
            sent_retention_days: default_sent_retention_days(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            marketplace: MarketplaceConfig::default(),
            outreach: OutreachTuning::default(),
        }
    }
}

impl Config {
    /// Load configuration from `paths`, falling back to defaults, then apply
    /// environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file. The API key is never written.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Override fields from environment variables.
    ///
    /// Write-scoped credentials take precedence over the generic ones.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(level) = non_empty("SELLER_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(url) = non_empty("OZON_API_BASE_URL") {
            self.marketplace.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(client_id) = non_empty("OZON_WRITE_CLIENT_ID").or_else(|| non_empty("OZON_CLIENT_ID")) {
            self.marketplace.client_id = client_id;
        }
        if let Some(api_key) = non_empty("OZON_WRITE_API_KEY").or_else(|| non_empty("OZON_API_KEY")) {
            self.marketplace.api_key = api_key;
        }
        if let Some(timeout) = non_empty("OZON_HTTP_TIMEOUT_S").and_then(|raw| raw.parse::<f64>().ok()) {
            self.marketplace.timeout_secs = timeout.max(1.0).round() as u64;
        }
    }

    /// Get the marketplace base URL as a parsed URL.
    pub fn marketplace_url(&self) -> CoreResult<Url> {
        Url::parse(&self.marketplace.base_url).map_err(CoreError::from)
    }

    /// Whether both halves of the write credentials are present.
    pub fn has_write_credentials(&self) -> bool {
        !self.marketplace.client_id.trim().is_empty() && !self.marketplace.api_key.trim().is_empty()
    }
}
