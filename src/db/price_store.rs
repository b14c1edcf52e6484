use async_trait::async_trait;

use crate::db::models::ObservationRow;
use crate::db::PriceStore;
use crate::error::Result;
use crate::types::PriceObservation;

/// SQLite-backed price history.
#[derive(Clone)]
pub struct SqlitePriceStore {
    pool: sqlx::SqlitePool,
}

impl SqlitePriceStore {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    /// Most recent first.
    pub async fn history(&self, item_id: &str, limit: i64) -> Result<Vec<PriceObservation>> {
        let rows = sqlx::query_as::<_, ObservationRow>(
            r#"
            SELECT item_id, price, observed_at
            FROM price_observations
            WHERE item_id = ?
            ORDER BY observed_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(item_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PriceObservation::from).collect())
    }
}

#[async_trait]
impl PriceStore for SqlitePriceStore {
    async fn latest_observation(&self, item_id: &str) -> Result<Option<PriceObservation>> {
        Ok(self.history(item_id, 1).await?.into_iter().next())
    }

    async fn append_observation(&self, item_id: &str, price: i64, observed_at: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO price_observations (item_id, price, observed_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(item_id)
        .bind(price)
        .bind(observed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn last_two_observations(&self, item_id: &str) -> Result<Vec<PriceObservation>> {
        self.history(item_id, 2).await
    }
}
