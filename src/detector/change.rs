use std::sync::Arc;

use tracing::debug;

use crate::db::PriceStore;
use crate::detector::classifier;
use crate::error::Result;
use crate::types::{ChangeEvent, ScrapedItem, WatchTarget};

/// Outcome of observing one scraped item.
#[derive(Debug, Clone)]
pub enum Observation {
    /// Item failed validation; nothing was read or written.
    Invalid,
    /// No history yet; the first observation was written as a baseline.
    FirstSeen,
    /// Same price as the latest observation; nothing was written.
    Unchanged,
    /// A new observation was written.
    Changed(ChangeEvent),
}

/// Compares scraped prices against history and appends only on change.
///
/// Writes for one item are never concurrent: an item belongs to exactly one target,
/// and a target is scanned by at most one task at a time.
pub struct ChangeDetector {
    prices: Arc<dyn PriceStore>,
    min_significant_percent: f64,
}

impl ChangeDetector {
    pub fn new(prices: Arc<dyn PriceStore>, min_significant_percent: f64) -> Self {
        Self { prices, min_significant_percent }
    }

    pub async fn observe(
        &self,
        item: &ScrapedItem,
        target: &WatchTarget,
        observed_at: i64,
    ) -> Result<Observation> {
        if !item.is_valid() {
            return Ok(Observation::Invalid);
        }

        let Some(latest) = self.prices.latest_observation(&item.id).await? else {
            self.prices.append_observation(&item.id, item.price, observed_at).await?;
            debug!(item_id = %item.id, price = item.price, "Baseline price recorded");
            return Ok(Observation::FirstSeen);
        };

        if latest.price == item.price {
            return Ok(Observation::Unchanged);
        }

        // History timestamps must strictly increase even if the wall clock steps back.
        let observed_at = observed_at.max(latest.observed_at + 1);
        self.prices.append_observation(&item.id, item.price, observed_at).await?;

        let change = ChangeEvent::new(item.clone(), target.clone(), latest.price);
        debug!(
            item_id = %item.id,
            old_price = change.old_price,
            new_price = change.new_price,
            percent = change.percent_change,
            "Price change recorded",
        );
        Ok(Observation::Changed(change))
    }

    pub fn is_significant(&self, change: &ChangeEvent) -> bool {
        classifier::is_significant(change.percent_change, self.min_significant_percent)
    }
}
