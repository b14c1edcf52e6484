use tokio::sync::mpsc;
use tracing::error;

use crate::db::models::SentAlertRow;
use crate::error::Result;
use crate::types::Alert;

/// Receives Alerts from fanout and appends them to the `sent_alerts` audit table.
/// Runs as a dedicated background task so fanout never waits on the database.
pub struct AlertLogWriter {
    pool: sqlx::SqlitePool,
    alert_rx: mpsc::Receiver<Alert>,
}

impl AlertLogWriter {
    pub fn new(pool: sqlx::SqlitePool, alert_rx: mpsc::Receiver<Alert>) -> Self {
        Self { pool, alert_rx }
    }

    pub async fn run(mut self) {
        while let Some(alert) = self.alert_rx.recv().await {
            if let Err(e) = write_alert(&self.pool, &alert).await {
                error!(subscriber_id = alert.subscriber_id, item_id = %alert.item_id, "Alert log write error: {e}");
            }
        }
    }
}

async fn write_alert(pool: &sqlx::SqlitePool, a: &Alert) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sent_alerts (
            subscriber_id, subscription_id, item_id,
            old_price, new_price, percent_change, threshold_percent, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(a.subscriber_id)
    .bind(a.subscription_id)
    .bind(&a.item_id)
    .bind(a.old_price)
    .bind(a.new_price)
    .bind(a.percent_change)
    .bind(a.threshold_percent as i64)
    .bind(a.new_observed_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Most recent first.
pub async fn recent_for_subscriber(
    pool: &sqlx::SqlitePool,
    subscriber_id: i64,
    limit: i64,
) -> Result<Vec<SentAlertRow>> {
    let rows = sqlx::query_as::<_, SentAlertRow>(
        r#"
        SELECT id, subscriber_id, subscription_id, item_id,
               old_price, new_price, percent_change, threshold_percent, created_at
        FROM sent_alerts
        WHERE subscriber_id = ?
        ORDER BY created_at DESC, id DESC
        LIMIT ?
        "#,
    )
    .bind(subscriber_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
