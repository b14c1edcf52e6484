/// Database row types matching `migrations/0001_init.sql`.
use crate::types::{Marketplace, PriceObservation, Subscription, TargetKind, WatchTarget};

#[derive(Debug, sqlx::FromRow)]
pub struct SubscriptionRow {
    pub id: i64,
    pub subscriber_id: i64,
    pub marketplace: String,
    pub target_kind: String,
    pub target_id: String,
    pub target_title: String,
    pub alert_threshold_percent: i64,
    pub scan_page_budget: i64,
    pub last_scan_at: Option<i64>,
}

impl SubscriptionRow {
    /// None when `target_kind` holds an unknown value.
    pub fn into_subscription(self) -> Option<Subscription> {
        let kind = TargetKind::parse(&self.target_kind)?;
        Some(Subscription {
            id: self.id,
            subscriber_id: self.subscriber_id,
            target: WatchTarget::from_parts(Marketplace::new(self.marketplace), kind, self.target_id),
            target_title: self.target_title,
            alert_threshold_percent: self.alert_threshold_percent.clamp(0, u32::MAX as i64) as u32,
            scan_page_budget: self.scan_page_budget.clamp(0, u32::MAX as i64) as u32,
            last_scan_at: self.last_scan_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct ObservationRow {
    pub item_id: String,
    pub price: i64,
    pub observed_at: i64,
}

impl From<ObservationRow> for PriceObservation {
    fn from(r: ObservationRow) -> Self {
        PriceObservation {
            item_id: r.item_id,
            price: r.price,
            observed_at: r.observed_at,
        }
    }
}

#[derive(Debug, serde::Serialize, sqlx::FromRow)]
pub struct SentAlertRow {
    pub id: i64,
    pub subscriber_id: i64,
    pub subscription_id: i64,
    pub item_id: String,
    pub old_price: i64,
    pub new_price: i64,
    pub percent_change: f64,
    pub threshold_percent: i64,
    pub created_at: i64,
}
