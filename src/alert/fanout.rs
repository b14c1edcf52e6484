use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::db::PriceStore;
use crate::types::{Alert, ChangeEvent, Subscription};

/// Turns one ChangeEvent plus the subscriptions watching its target into Alerts.
///
/// Only price drops notify: a subscriber with threshold T hears about a change when the
/// price fell by at least T percent. Rises are kept in history and never alert.
pub struct AlertFanout {
    prices: Arc<dyn PriceStore>,
    /// Optional audit log; written with `try_send` so fanout never waits on it.
    alert_log: Option<mpsc::Sender<Alert>>,
}

impl AlertFanout {
    pub fn new(prices: Arc<dyn PriceStore>, alert_log: Option<mpsc::Sender<Alert>>) -> Self {
        Self { prices, alert_log }
    }

    /// Subscribers watching a target through several subscriptions receive one alert,
    /// attributed to their lowest qualifying threshold.
    pub async fn fanout(
        &self,
        change: &ChangeEvent,
        subscriptions: &[Subscription],
        observed_at: i64,
    ) -> Vec<Alert> {
        let mut qualifying: Vec<&Subscription> = subscriptions
            .iter()
            .filter(|s| change.drop_meets(s.alert_threshold_percent))
            .collect();
        if qualifying.is_empty() {
            return Vec::new();
        }
        qualifying.sort_by_key(|s| (s.subscriber_id, s.alert_threshold_percent, s.id));

        let (old_observed_at, new_observed_at) = self.observation_times(change, observed_at).await;

        let mut seen = HashSet::new();
        let alerts: Vec<Alert> = qualifying
            .into_iter()
            .filter(|s| seen.insert(s.subscriber_id))
            .map(|s| Alert {
                subscriber_id: s.subscriber_id,
                subscription_id: s.id,
                item_id: change.item.id.clone(),
                item_name: change.item.name.clone(),
                brand: change.item.brand.clone(),
                image: change.item.image.clone(),
                old_price: change.old_price,
                new_price: change.new_price,
                old_observed_at,
                new_observed_at,
                percent_change: change.percent_change,
                threshold_percent: s.alert_threshold_percent,
                target_title: s.target_title.clone(),
            })
            .collect();

        if let Some(log) = &self.alert_log {
            for alert in &alerts {
                if let Err(e) = log.try_send(alert.clone()) {
                    warn!("Alert log channel full: {e}");
                }
            }
        }

        debug!(
            item_id = %change.item.id,
            target = %change.target,
            candidates = subscriptions.len(),
            alerts = alerts.len(),
            "Fanout complete",
        );
        alerts
    }

    /// Timestamps of the two most recent observations ("was" / "became"). Falls back to
    /// the scan time when history cannot be read.
    async fn observation_times(&self, change: &ChangeEvent, observed_at: i64) -> (Option<i64>, i64) {
        match self.prices.last_two_observations(&change.item.id).await {
            Ok(rows) => {
                let new_at = rows.first().map(|o| o.observed_at).unwrap_or(observed_at);
                let old_at = rows.get(1).map(|o| o.observed_at);
                (old_at, new_at)
            }
            Err(e) => {
                warn!(item_id = %change.item.id, "History lookup failed during fanout: {e}");
                (None, observed_at)
            }
        }
    }
}
