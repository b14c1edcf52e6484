pub mod alert_log;
#[cfg(test)]
pub mod memory;
pub mod models;
pub mod price_store;
pub mod subscription_store;

pub use alert_log::AlertLogWriter;
pub use price_store::SqlitePriceStore;
pub use subscription_store::SqliteSubscriptionStore;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Marketplace, PriceObservation, Subscription};

/// Append-only price history per item.
#[async_trait]
pub trait PriceStore: Send + Sync {
    async fn latest_observation(&self, item_id: &str) -> Result<Option<PriceObservation>>;

    async fn append_observation(&self, item_id: &str, price: i64, observed_at: i64) -> Result<()>;

    /// Most recent first; at most two rows.
    async fn last_two_observations(&self, item_id: &str) -> Result<Vec<PriceObservation>>;
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn active_subscriptions_by_source(&self, source: &Marketplace) -> Result<Vec<Subscription>>;

    async fn update_last_scan_at(&self, subscription_id: i64, scanned_at: i64) -> Result<()>;
}

/// Opens the database and applies migrations.
pub async fn connect(db_path: &str) -> Result<sqlx::SqlitePool> {
    let options = sqlx::sqlite::SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true);
    let pool = sqlx::SqlitePool::connect_with(options).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

/// Single-connection in-memory database with migrations applied.
#[cfg(test)]
pub async fn test_pool() -> sqlx::SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    sqlx::migrate!("./migrations").run(&pool).await.expect("migrations");
    pool
}
