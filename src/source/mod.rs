pub mod http;

pub use http::HttpListingAdapter;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::SourceConfig;
use crate::error::Result;
use crate::types::{ScrapedItem, WatchTarget};

/// Marketplace listing adapter. Pages are 1-based; an empty page ends pagination and
/// an error is a page-level failure.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn fetch_page(&self, target: &WatchTarget, page: u32) -> Result<Vec<ScrapedItem>>;
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    /// Ceiling on pages per category target, whatever subscribers request.
    pub page_hard_cap: u32,
    /// Sleep between consecutive page fetches of one target.
    pub inter_page_delay: Duration,
}

impl From<&SourceConfig> for SourceSettings {
    fn from(cfg: &SourceConfig) -> Self {
        Self {
            page_hard_cap: cfg.page_hard_cap,
            inter_page_delay: cfg.inter_page_delay,
        }
    }
}

#[derive(Clone)]
pub struct RegisteredSource {
    pub adapter: Arc<dyn SourceAdapter>,
    pub settings: SourceSettings,
}
