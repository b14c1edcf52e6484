//! Scripted collaborators shared by pipeline tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::delivery::sender::{ChatSender, SendError};
use crate::delivery::{DeliveryQueue, DeliverySettings};
use crate::error::{AppError, Result};
use crate::source::SourceAdapter;
use crate::types::{Marketplace, ScrapedItem, Subscription, WatchTarget};

pub fn item(id: &str, price: i64) -> ScrapedItem {
    ScrapedItem {
        id: id.to_string(),
        name: format!("Item {id}"),
        brand: Some("Acme".to_string()),
        price,
        rating: Some(4.5),
        review_count: Some(10),
        image: None,
    }
}

pub fn sub(id: i64, subscriber_id: i64, target: &WatchTarget, threshold: u32, pages: u32) -> Subscription {
    Subscription {
        id,
        subscriber_id,
        target: target.clone(),
        target_title: format!("Target {}", target.id()),
        alert_threshold_percent: threshold,
        scan_page_budget: pages,
        last_scan_at: None,
    }
}

pub fn wb() -> Marketplace {
    Marketplace::new("wb")
}

#[derive(Debug, Clone)]
pub struct Fetch {
    pub target: WatchTarget,
    pub page: u32,
    pub at: Instant,
}

/// Serves scripted pages per `(target, page)`; unscripted pages are empty.
#[derive(Default)]
pub struct FakeSource {
    pages: Mutex<HashMap<(WatchTarget, u32), std::result::Result<Vec<ScrapedItem>, String>>>,
    fetches: Mutex<Vec<Fetch>>,
    fetch_delay: Duration,
    in_flight: Mutex<HashMap<WatchTarget, usize>>,
    pub max_in_flight_per_target: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_fetch_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self { fetch_delay: delay, ..Default::default() })
    }

    pub fn page(&self, target: &WatchTarget, page: u32, items: Vec<ScrapedItem>) {
        self.pages.lock().unwrap().insert((target.clone(), page), Ok(items));
    }

    pub fn failing_page(&self, target: &WatchTarget, page: u32) {
        self.pages
            .lock()
            .unwrap()
            .insert((target.clone(), page), Err("connection reset".to_string()));
    }

    pub fn fetches(&self) -> Vec<Fetch> {
        self.fetches.lock().unwrap().clone()
    }

    pub fn fetches_for(&self, target: &WatchTarget) -> Vec<Fetch> {
        self.fetches().into_iter().filter(|f| &f.target == target).collect()
    }
}

#[async_trait]
impl SourceAdapter for FakeSource {
    async fn fetch_page(&self, target: &WatchTarget, page: u32) -> Result<Vec<ScrapedItem>> {
        {
            let mut in_flight = self.in_flight.lock().unwrap();
            let n = in_flight.entry(target.clone()).or_insert(0);
            *n += 1;
            self.max_in_flight_per_target.fetch_max(*n, Ordering::SeqCst);
        }
        self.fetches.lock().unwrap().push(Fetch {
            target: target.clone(),
            page,
            at: Instant::now(),
        });

        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }

        if let Some(n) = self.in_flight.lock().unwrap().get_mut(target) {
            *n -= 1;
        }

        match self.pages.lock().unwrap().get(&(target.clone(), page)) {
            Some(Ok(items)) => Ok(items.clone()),
            Some(Err(e)) => Err(AppError::Source(e.clone())),
            None => Ok(Vec::new()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Sent {
    pub recipient_id: i64,
    pub text: String,
    pub with_image: bool,
}

/// Accepts every message and records it.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingSender {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatSender for RecordingSender {
    async fn send_text(&self, recipient_id: i64, text: &str) -> std::result::Result<(), SendError> {
        self.sent.lock().unwrap().push(Sent {
            recipient_id,
            text: text.to_string(),
            with_image: false,
        });
        Ok(())
    }

    async fn send_photo(
        &self,
        recipient_id: i64,
        _image: &str,
        caption: &str,
    ) -> std::result::Result<(), SendError> {
        self.sent.lock().unwrap().push(Sent {
            recipient_id,
            text: caption.to_string(),
            with_image: true,
        });
        Ok(())
    }
}

pub fn instant_queue(sender: Arc<RecordingSender>) -> DeliveryQueue {
    DeliveryQueue::new(
        sender,
        DeliverySettings {
            max_retries: 3,
            pacing: Duration::ZERO,
            backoff_base: Duration::ZERO,
        },
    )
}
