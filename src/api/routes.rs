use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::{HealthState, LatencyStats};
use crate::db::alert_log::recent_for_subscriber;
use crate::db::models::SentAlertRow;
use crate::db::SqlitePriceStore;
use crate::delivery::DeliveryQueue;
use crate::error::AppError;
use crate::scan::ScanOrchestrator;
use crate::types::PriceObservation;

#[derive(Clone)]
pub struct ApiState {
    pub pool: sqlx::SqlitePool,
    pub prices: SqlitePriceStore,
    pub health: Arc<HealthState>,
    pub latency: Arc<LatencyStats>,
    pub delivery: DeliveryQueue,
    pub scanner: Arc<ScanOrchestrator>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/stats/latency", get(get_stats_latency))
        .route("/items/:item_id/history", get(get_item_history))
        .route("/subscribers/:subscriber_id/alerts", get(get_subscriber_alerts))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

impl LimitQuery {
    fn limit_or(&self, default: i64) -> i64 {
        self.limit.unwrap_or(default).clamp(1, 1000)
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub pass_running: bool,
    pub last_pass_started_at: Option<u64>,
    pub last_pass_finished_at: Option<u64>,
    pub passes_completed: u64,
    pub passes_skipped: u64,
    pub source_failures: u64,
    pub sources: Vec<String>,
    pub scans_in_flight: usize,
    pub delivery: DeliveryHealth,
}

#[derive(Serialize)]
pub struct DeliveryHealth {
    pub queued: usize,
    pub draining: bool,
    pub delivered: u64,
    pub dropped: u64,
    pub retried: u64,
    pub blocked_recipients: usize,
}

#[derive(Serialize)]
pub struct LatencyResponse {
    pub samples: u64,
    pub p50_ms: Option<u64>,
    pub p95_ms: Option<u64>,
    pub p99_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let h = &state.health;
    let nonzero = |ns: u64| (ns != 0).then_some(ns);

    Json(HealthResponse {
        status: "ok",
        pass_running: h.pass_running(),
        last_pass_started_at: nonzero(h.last_pass_started_at_ns()),
        last_pass_finished_at: nonzero(h.last_pass_finished_at_ns()),
        passes_completed: h.passes_completed(),
        passes_skipped: h.passes_skipped(),
        source_failures: h.source_failures(),
        sources: state.scanner.sources().iter().map(|s| s.to_string()).collect(),
        scans_in_flight: state.scanner.in_flight().len(),
        delivery: DeliveryHealth {
            queued: state.delivery.len(),
            draining: state.delivery.is_draining(),
            delivered: state.delivery.delivered_count(),
            dropped: state.delivery.dropped_count(),
            retried: state.delivery.retried_count(),
            blocked_recipients: state.delivery.blocked_count(),
        },
    })
}

/// Target scan durations.
async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencyResponse> {
    let (p50_ms, p95_ms, p99_ms) = state.latency.percentiles();
    Json(LatencyResponse {
        samples: state.latency.len(),
        p50_ms,
        p95_ms,
        p99_ms,
    })
}

async fn get_item_history(
    State(state): State<ApiState>,
    Path(item_id): Path<String>,
    Query(params): Query<LimitQuery>,
) -> Result<Json<Vec<PriceObservation>>, AppError> {
    let history = state.prices.history(&item_id, params.limit_or(100)).await?;
    Ok(Json(history))
}

async fn get_subscriber_alerts(
    State(state): State<ApiState>,
    Path(subscriber_id): Path<i64>,
    Query(params): Query<LimitQuery>,
) -> Result<Json<Vec<SentAlertRow>>, AppError> {
    let rows = recent_for_subscriber(&state.pool, subscriber_id, params.limit_or(50)).await?;
    Ok(Json(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertFanout;
    use crate::db::memory::MemorySubscriptionStore;
    use crate::db::{test_pool, PriceStore};
    use crate::detector::ChangeDetector;
    use crate::testing::{instant_queue, RecordingSender};
    use std::collections::HashMap;

    async fn serve(state: ApiState) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router(state)).await.unwrap() });
        format!("http://{addr}")
    }

    async fn state() -> ApiState {
        let pool = test_pool().await;
        let prices = SqlitePriceStore::new(pool.clone());
        let queue = instant_queue(RecordingSender::new());
        let latency = Arc::new(LatencyStats::new());
        let scanner = Arc::new(ScanOrchestrator::new(
            HashMap::new(),
            Arc::new(MemorySubscriptionStore::new(Vec::new())),
            ChangeDetector::new(Arc::new(prices.clone()), 1.0),
            AlertFanout::new(Arc::new(prices.clone()), None),
            queue.clone(),
            latency.clone(),
        ));
        ApiState {
            pool,
            prices,
            health: Arc::new(HealthState::new()),
            latency,
            delivery: queue,
            scanner,
        }
    }

    #[tokio::test]
    async fn health_reports_pass_and_queue_state() {
        let state = state().await;
        state.health.pass_started(5);
        state.health.pass_finished(9);
        let base = serve(state).await;

        let body: serde_json::Value = reqwest::get(format!("{base}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["status"], "ok");
        assert_eq!(body["passes_completed"], 1);
        assert_eq!(body["last_pass_finished_at"], 9);
        assert_eq!(body["delivery"]["queued"], 0);
        assert_eq!(body["scans_in_flight"], 0);
    }

    #[tokio::test]
    async fn item_history_is_newest_first() {
        let state = state().await;
        state.prices.append_observation("42", 1000, 1).await.unwrap();
        state.prices.append_observation("42", 900, 2).await.unwrap();
        let base = serve(state).await;

        let body: Vec<PriceObservation> = reqwest::get(format!("{base}/items/42/history?limit=5"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        let prices: Vec<i64> = body.iter().map(|o| o.price).collect();
        assert_eq!(prices, vec![900, 1000]);
    }

    #[tokio::test]
    async fn latency_is_empty_before_any_scan() {
        let base = serve(state().await).await;
        let body: serde_json::Value = reqwest::get(format!("{base}/stats/latency"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["samples"], 0);
        assert!(body["p50_ms"].is_null());
    }
}
