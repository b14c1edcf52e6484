use serde::{Deserialize, Serialize};
use std::time::Instant;

// ---------------------------------------------------------------------------
// Watch targets
// ---------------------------------------------------------------------------

/// Marketplace identifier, e.g. `wildberries`. One source adapter per marketplace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Marketplace(String);

impl Marketplace {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Marketplace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What is being tracked. Identity of a scan: two subscriptions with equal targets
/// share a single scan per pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum WatchTarget {
    Category { marketplace: Marketplace, category_id: String },
    Product { marketplace: Marketplace, product_id: String },
}

impl WatchTarget {
    pub fn category(marketplace: Marketplace, category_id: impl Into<String>) -> Self {
        WatchTarget::Category { marketplace, category_id: category_id.into() }
    }

    pub fn product(marketplace: Marketplace, product_id: impl Into<String>) -> Self {
        WatchTarget::Product { marketplace, product_id: product_id.into() }
    }

    pub fn marketplace(&self) -> &Marketplace {
        match self {
            WatchTarget::Category { marketplace, .. } | WatchTarget::Product { marketplace, .. } => {
                marketplace
            }
        }
    }

    /// Category or product id within the marketplace.
    pub fn id(&self) -> &str {
        match self {
            WatchTarget::Category { category_id, .. } => category_id,
            WatchTarget::Product { product_id, .. } => product_id,
        }
    }

    pub fn kind(&self) -> TargetKind {
        match self {
            WatchTarget::Category { .. } => TargetKind::Category,
            WatchTarget::Product { .. } => TargetKind::Product,
        }
    }

    pub fn from_parts(marketplace: Marketplace, kind: TargetKind, id: impl Into<String>) -> Self {
        match kind {
            TargetKind::Category => WatchTarget::category(marketplace, id),
            TargetKind::Product => WatchTarget::product(marketplace, id),
        }
    }
}

impl std::fmt::Display for WatchTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.marketplace(), self.kind(), self.id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Category,
    Product,
}

impl TargetKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "category" => Some(TargetKind::Category),
            "product" => Some(TargetKind::Product),
            _ => None,
        }
    }
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetKind::Category => write!(f, "category"),
            TargetKind::Product => write!(f, "product"),
        }
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: i64,
    /// Chat id of the subscriber; also the delivery recipient.
    pub subscriber_id: i64,
    pub target: WatchTarget,
    /// Name the subscriber knows the target by (category title, product name).
    pub target_title: String,
    pub alert_threshold_percent: u32,
    /// Max pages to scan; ignored for product targets.
    pub scan_page_budget: u32,
    /// Nanosecond UTC epoch of the last completed scan.
    pub last_scan_at: Option<i64>,
}

// ---------------------------------------------------------------------------
// Scraped items and price history
// ---------------------------------------------------------------------------

/// One listing as returned by a source adapter. Never persisted as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedItem {
    pub id: String,
    pub name: String,
    pub brand: Option<String>,
    /// Minor currency units.
    pub price: i64,
    pub rating: Option<f64>,
    pub review_count: Option<u32>,
    pub image: Option<String>,
}

impl ScrapedItem {
    /// Items without an id or with a non-positive price are never observed.
    pub fn is_valid(&self) -> bool {
        !self.id.trim().is_empty() && self.price > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub item_id: String,
    pub price: i64,
    /// Nanosecond UTC epoch.
    pub observed_at: i64,
}

// ---------------------------------------------------------------------------
// Change classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeDirection {
    Drop,
    Rise,
}

impl std::fmt::Display for ChangeDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeDirection::Drop => write!(f, "drop"),
            ChangeDirection::Rise => write!(f, "rise"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeMagnitude {
    /// |change| < 5%
    Minor,
    /// 5%–15%
    Moderate,
    /// 15%–30%
    Major,
    /// 30% and more
    Extreme,
}

impl ChangeMagnitude {
    pub fn from_percent(percent: f64) -> Self {
        use crate::config::magnitude_thresholds::*;
        let abs = percent.abs();
        if abs < MINOR_MAX {
            ChangeMagnitude::Minor
        } else if abs < MODERATE_MAX {
            ChangeMagnitude::Moderate
        } else if abs < MAJOR_MAX {
            ChangeMagnitude::Major
        } else {
            ChangeMagnitude::Extreme
        }
    }
}

impl std::fmt::Display for ChangeMagnitude {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChangeMagnitude::Minor => "minor",
            ChangeMagnitude::Moderate => "moderate",
            ChangeMagnitude::Major => "major",
            ChangeMagnitude::Extreme => "extreme",
        };
        write!(f, "{s}")
    }
}

/// A recorded price change for one item. Lives for one detection cycle only.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub item: ScrapedItem,
    pub target: WatchTarget,
    pub old_price: i64,
    pub new_price: i64,
    /// Signed percent change relative to `old_price`.
    pub percent_change: f64,
}

impl ChangeEvent {
    pub fn new(item: ScrapedItem, target: WatchTarget, old_price: i64) -> Self {
        let new_price = item.price;
        Self {
            percent_change: percent_change(old_price, new_price),
            item,
            target,
            old_price,
            new_price,
        }
    }

    pub fn direction(&self) -> ChangeDirection {
        if self.new_price < self.old_price {
            ChangeDirection::Drop
        } else {
            ChangeDirection::Rise
        }
    }

    pub fn magnitude(&self) -> ChangeMagnitude {
        ChangeMagnitude::from_percent(self.percent_change)
    }

    /// True when the price fell by at least `threshold_percent`. Evaluated in integer
    /// arithmetic so a drop of exactly the threshold always qualifies.
    pub fn drop_meets(&self, threshold_percent: u32) -> bool {
        if self.new_price >= self.old_price {
            return false;
        }
        let drop = (self.old_price - self.new_price) as i128 * 100;
        drop >= threshold_percent as i128 * self.old_price as i128
    }
}

/// `(new - old) / old * 100`, scaled before dividing to keep whole percents exact.
pub fn percent_change(old_price: i64, new_price: i64) -> f64 {
    if old_price == 0 {
        return 0.0;
    }
    (new_price - old_price) as f64 * 100.0 / old_price as f64
}

// ---------------------------------------------------------------------------
// Alerts and delivery
// ---------------------------------------------------------------------------

/// One subscriber-facing notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub subscriber_id: i64,
    pub subscription_id: i64,
    pub item_id: String,
    pub item_name: String,
    pub brand: Option<String>,
    pub image: Option<String>,
    pub old_price: i64,
    pub new_price: i64,
    /// Timestamp of the previous observation, when history still has it.
    pub old_observed_at: Option<i64>,
    pub new_observed_at: i64,
    pub percent_change: f64,
    pub threshold_percent: u32,
    pub target_title: String,
}

/// A queued outbound message.
#[derive(Debug, Clone)]
pub struct DeliveryTask {
    pub recipient_id: i64,
    pub text: String,
    pub image: Option<String>,
    pub retry_count: u32,
    pub enqueued_at: Instant,
}

impl DeliveryTask {
    pub fn new(recipient_id: i64, text: String, image: Option<String>) -> Self {
        Self {
            recipient_id,
            text,
            image,
            retry_count: 0,
            enqueued_at: Instant::now(),
        }
    }
}
