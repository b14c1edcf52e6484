//! In-memory store fakes for pipeline tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::db::{PriceStore, SubscriptionStore};
use crate::error::{AppError, Result};
use crate::types::{Marketplace, PriceObservation, Subscription};

#[derive(Default)]
pub struct MemoryPriceStore {
    rows: Mutex<HashMap<String, Vec<PriceObservation>>>,
    /// When set, every append fails.
    pub fail_writes: AtomicBool,
}

impl MemoryPriceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, item_id: &str, price: i64, observed_at: i64) {
        self.rows
            .lock()
            .unwrap()
            .entry(item_id.to_string())
            .or_default()
            .push(PriceObservation { item_id: item_id.to_string(), price, observed_at });
    }

    /// Oldest first.
    pub fn history(&self, item_id: &str) -> Vec<PriceObservation> {
        self.rows.lock().unwrap().get(item_id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl PriceStore for MemoryPriceStore {
    async fn latest_observation(&self, item_id: &str) -> Result<Option<PriceObservation>> {
        Ok(self.history(item_id).last().cloned())
    }

    async fn append_observation(&self, item_id: &str, price: i64, observed_at: i64) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Database(sqlx::Error::PoolClosed));
        }
        self.seed(item_id, price, observed_at);
        Ok(())
    }

    async fn last_two_observations(&self, item_id: &str) -> Result<Vec<PriceObservation>> {
        Ok(self.history(item_id).into_iter().rev().take(2).collect())
    }
}

#[derive(Default)]
pub struct MemorySubscriptionStore {
    subs: Mutex<Vec<Subscription>>,
}

impl MemorySubscriptionStore {
    pub fn new(subs: Vec<Subscription>) -> Self {
        Self { subs: Mutex::new(subs) }
    }

    pub fn get(&self, subscription_id: i64) -> Option<Subscription> {
        self.subs.lock().unwrap().iter().find(|s| s.id == subscription_id).cloned()
    }
}

#[async_trait]
impl SubscriptionStore for MemorySubscriptionStore {
    async fn active_subscriptions_by_source(&self, source: &Marketplace) -> Result<Vec<Subscription>> {
        Ok(self
            .subs
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.target.marketplace() == source)
            .cloned()
            .collect())
    }

    async fn update_last_scan_at(&self, subscription_id: i64, scanned_at: i64) -> Result<()> {
        if let Some(s) = self.subs.lock().unwrap().iter_mut().find(|s| s.id == subscription_id) {
            s.last_scan_at = Some(scanned_at);
        }
        Ok(())
    }
}
