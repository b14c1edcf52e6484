use async_trait::async_trait;
use tracing::warn;

use crate::db::models::SubscriptionRow;
use crate::db::SubscriptionStore;
use crate::error::Result;
use crate::types::{Marketplace, Subscription};

/// SQLite-backed subscription lookups used by the scan pipeline. Creation and
/// deletion belong to the chat front end.
#[derive(Clone)]
pub struct SqliteSubscriptionStore {
    pool: sqlx::SqlitePool,
}

impl SqliteSubscriptionStore {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    #[cfg(test)]
    pub async fn insert(&self, sub: &Subscription, created_at: i64) -> Result<i64> {
        let kind = sub.target.kind().to_string();
        let result = sqlx::query(
            r#"
            INSERT INTO subscriptions (
                subscriber_id, marketplace, target_kind, target_id, target_title,
                alert_threshold_percent, scan_page_budget, last_scan_at, active, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, ?)
            "#,
        )
        .bind(sub.subscriber_id)
        .bind(sub.target.marketplace().as_str())
        .bind(kind)
        .bind(sub.target.id())
        .bind(&sub.target_title)
        .bind(sub.alert_threshold_percent as i64)
        .bind(sub.scan_page_budget as i64)
        .bind(sub.last_scan_at)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    #[cfg(test)]
    pub async fn deactivate(&self, subscription_id: i64) -> Result<()> {
        sqlx::query("UPDATE subscriptions SET active = 0 WHERE id = ?")
            .bind(subscription_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for SqliteSubscriptionStore {
    async fn active_subscriptions_by_source(&self, source: &Marketplace) -> Result<Vec<Subscription>> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            SELECT id, subscriber_id, marketplace, target_kind, target_id, target_title,
                   alert_threshold_percent, scan_page_budget, last_scan_at
            FROM subscriptions
            WHERE marketplace = ? AND active = 1
            ORDER BY id
            "#,
        )
        .bind(source.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut subs = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id;
            let kind = row.target_kind.clone();
            match row.into_subscription() {
                Some(sub) => subs.push(sub),
                None => warn!(subscription_id = id, target_kind = %kind, "Skipping subscription with unknown target kind"),
            }
        }
        Ok(subs)
    }

    async fn update_last_scan_at(&self, subscription_id: i64, scanned_at: i64) -> Result<()> {
        sqlx::query("UPDATE subscriptions SET last_scan_at = ? WHERE id = ?")
            .bind(scanned_at)
            .bind(subscription_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
