use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::{SourceConfig, HTTP_TIMEOUT_SECS};
use crate::error::{AppError, Result};
use crate::source::SourceAdapter;
use crate::types::{ScrapedItem, TargetKind, WatchTarget};

/// Generic JSON listing feed.
///
/// Fetches `category_url` / `product_url` with `{id}` and `{page}` substituted and
/// accepts either a bare array or `{"items": [...]}`. Each entry needs an `id`
/// (string or number), a `name` (or `title`) and an integer `price` in minor units;
/// `brand`, `rating`, `reviews` and `image` are optional.
pub struct HttpListingAdapter {
    client: reqwest::Client,
    category_url: String,
    product_url: String,
}

impl HttpListingAdapter {
    pub fn new(category_url: String, product_url: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client, category_url, product_url })
    }

    pub fn from_config(cfg: &SourceConfig) -> Result<Self> {
        Self::new(cfg.category_url.clone(), cfg.product_url.clone())
    }

    fn url_for(&self, target: &WatchTarget, page: u32) -> String {
        let template = match target.kind() {
            TargetKind::Category => &self.category_url,
            TargetKind::Product => &self.product_url,
        };
        template
            .replace("{id}", target.id())
            .replace("{page}", &page.to_string())
    }
}

#[async_trait]
impl SourceAdapter for HttpListingAdapter {
    async fn fetch_page(&self, target: &WatchTarget, page: u32) -> Result<Vec<ScrapedItem>> {
        let url = self.url_for(target, page);
        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::Source(format!("{target} page {page}: HTTP {status}")));
        }

        let body: serde_json::Value = resp.json().await?;
        let (items, discarded) = parse_listing(&body)
            .ok_or_else(|| AppError::Source(format!("{target} page {page}: unexpected body shape")))?;

        if discarded > 0 {
            debug!(target = %target, page, discarded, "Discarded unparseable listing entries");
        }
        Ok(items)
    }
}

/// Returns the parsed items plus the number of entries that could not be parsed.
/// None when the body is neither an array nor an object with an `items` array.
pub fn parse_listing(body: &serde_json::Value) -> Option<(Vec<ScrapedItem>, usize)> {
    let entries = match body {
        serde_json::Value::Array(a) => a,
        serde_json::Value::Object(o) => o.get("items")?.as_array()?,
        _ => return None,
    };

    let mut items = Vec::with_capacity(entries.len());
    let mut discarded = 0usize;
    for entry in entries {
        match parse_item(entry) {
            Some(item) => items.push(item),
            None => discarded += 1,
        }
    }
    Some((items, discarded))
}

pub fn parse_item(v: &serde_json::Value) -> Option<ScrapedItem> {
    let id = match v.get("id")? {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let name = v
        .get("name")
        .or_else(|| v.get("title"))?
        .as_str()?
        .to_string();
    let price = v.get("price")?.as_i64()?;

    Some(ScrapedItem {
        id,
        name,
        brand: v.get("brand").and_then(|b| b.as_str()).map(str::to_string),
        price,
        rating: v.get("rating").and_then(|r| r.as_f64()),
        review_count: v
            .get("reviews")
            .and_then(|r| r.as_u64())
            .map(|r| r.min(u32::MAX as u64) as u32),
        image: v.get("image").and_then(|i| i.as_str()).map(str::to_string),
    })
}
