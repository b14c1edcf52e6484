use std::time::Duration;

use crate::error::{AppError, Result};
use crate::types::Marketplace;

pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// How often a full monitoring pass is started (seconds).
pub const MONITOR_INTERVAL_SECS: u64 = 600;

/// Global noise floor: changes smaller than this (in percent, either direction) are
/// recorded in history but never reach fanout.
pub const MIN_SIGNIFICANT_PERCENT: f64 = 1.0;

/// Source-wide ceiling on pages scanned for one category target in one pass.
pub const DEFAULT_PAGE_HARD_CAP: u32 = 10;

/// Delay between consecutive page fetches for the same target (milliseconds).
pub const DEFAULT_INTER_PAGE_DELAY_MS: u64 = 1500;

/// A delivery task is dropped once its retry count exceeds this.
pub const DELIVERY_MAX_RETRIES: u32 = 3;

/// Global pause before every outbound send, retries included (milliseconds).
/// Telegram allows roughly 30 messages/second per bot.
pub const DELIVERY_PACING_MS: u64 = 50;

/// Backoff unit; a task on its Nth retry waits N times this (milliseconds).
pub const DELIVERY_BACKOFF_MS: u64 = 1000;

/// Channel capacity for internal message routing.
pub const CHANNEL_CAPACITY: usize = 1024;

/// Telegram rejects photo captions longer than this many characters.
pub const TELEGRAM_CAPTION_LIMIT: usize = 1024;

/// Timeout for listing-feed and chat API requests (seconds).
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Change magnitude thresholds (absolute percent).
pub mod magnitude_thresholds {
    pub const MINOR_MAX: f64 = 5.0;
    pub const MODERATE_MAX: f64 = 15.0;
    pub const MAJOR_MAX: f64 = 30.0;
}

/// Per-marketplace scanning settings.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub marketplace: Marketplace,
    /// Listing URL for category targets; `{id}` and `{page}` are substituted.
    pub category_url: String,
    /// Listing URL for single-product targets; `{id}` is substituted.
    pub product_url: String,
    pub page_hard_cap: u32,
    pub inter_page_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    pub monitor_interval: Duration,
    pub min_significant_percent: f64,
    pub telegram_api_url: String,
    pub telegram_bot_token: String,
    /// Bound on delivery retries (DELIVERY_MAX_RETRIES)
    pub delivery_max_retries: u32,
    /// Pause before every send (DELIVERY_PACING_MS)
    pub delivery_pacing: Duration,
    /// Backoff unit multiplied by retry count (DELIVERY_BACKOFF_MS)
    pub delivery_backoff: Duration,
    /// Marketplaces to scan (SOURCES, comma-separated), each configured through
    /// SOURCE_<NAME>_* variables.
    pub sources: Vec<SourceConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let telegram_bot_token = std::env::var("TELEGRAM_BOT_TOKEN")
            .map_err(|_| AppError::Config("TELEGRAM_BOT_TOKEN must be set".to_string()))?;

        let sources = std::env::var("SOURCES")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(|name| source_from_env(&name))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "price_watch.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            monitor_interval: Duration::from_secs(
                std::env::var("MONITOR_INTERVAL_SECS")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                    .filter(|v| *v > 0)
                    .unwrap_or(MONITOR_INTERVAL_SECS),
            ),
            min_significant_percent: min_significant_percent(
                std::env::var("MIN_SIGNIFICANT_PERCENT").ok().as_deref(),
            ),
            telegram_api_url: std::env::var("TELEGRAM_API_URL")
                .unwrap_or_else(|_| TELEGRAM_API_URL.to_string()),
            telegram_bot_token,
            delivery_max_retries: std::env::var("DELIVERY_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(DELIVERY_MAX_RETRIES),
            delivery_pacing: Duration::from_millis(
                std::env::var("DELIVERY_PACING_MS")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(DELIVERY_PACING_MS),
            ),
            delivery_backoff: Duration::from_millis(
                std::env::var("DELIVERY_BACKOFF_MS")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(DELIVERY_BACKOFF_MS),
            ),
            sources,
        })
    }
}

fn source_from_env(name: &str) -> Result<SourceConfig> {
    let key = env_key(name);
    let var = |suffix: &str| std::env::var(format!("SOURCE_{key}_{suffix}"));

    let category_url = var("CATEGORY_URL")
        .map_err(|_| AppError::Config(format!("SOURCE_{key}_CATEGORY_URL must be set")))?;
    let product_url = var("PRODUCT_URL")
        .map_err(|_| AppError::Config(format!("SOURCE_{key}_PRODUCT_URL must be set")))?;

    Ok(SourceConfig {
        marketplace: Marketplace::new(name),
        category_url,
        product_url,
        page_hard_cap: var("MAX_PAGES")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_PAGE_HARD_CAP),
        inter_page_delay: Duration::from_millis(
            var("PAGE_DELAY_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(DEFAULT_INTER_PAGE_DELAY_MS),
        ),
    })
}

/// Unparseable, negative and non-finite values fall back to the default.
fn min_significant_percent(raw: Option<&str>) -> f64 {
    raw.and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
        .unwrap_or(MIN_SIGNIFICANT_PERCENT)
}

/// `wb-eu` → `WB_EU`
fn env_key(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}
