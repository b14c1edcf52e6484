mod alert;
mod api;
mod config;
mod db;
mod delivery;
mod detector;
mod error;
mod monitor;
mod scan;
mod source;
#[cfg(test)]
mod testing;
mod types;

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::alert::AlertFanout;
use crate::api::routes::{router, ApiState};
use crate::api::{HealthState, LatencyStats};
use crate::config::{Config, CHANNEL_CAPACITY};
use crate::db::{AlertLogWriter, SqlitePriceStore, SqliteSubscriptionStore};
use crate::delivery::{DeliveryQueue, DeliverySettings, TelegramSender};
use crate::detector::ChangeDetector;
use crate::error::Result;
use crate::monitor::{IntervalTicker, MonitoringOrchestrator};
use crate::scan::ScanOrchestrator;
use crate::source::{HttpListingAdapter, RegisteredSource, SourceSettings};
use crate::types::Marketplace;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let pool = db::connect(&cfg.db_path).await?;
    info!("Database ready at {}", cfg.db_path);

    let prices = SqlitePriceStore::new(pool.clone());
    let subscriptions = SqliteSubscriptionStore::new(pool.clone());

    // --- Alert audit log ---
    let (alert_tx, alert_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let alert_log = AlertLogWriter::new(pool.clone(), alert_rx);
    tokio::spawn(async move { alert_log.run().await });

    // --- Delivery ---
    let sender = TelegramSender::new(&cfg.telegram_api_url, &cfg.telegram_bot_token)?;
    let delivery = DeliveryQueue::new(
        Arc::new(sender),
        DeliverySettings {
            max_retries: cfg.delivery_max_retries,
            pacing: cfg.delivery_pacing,
            backoff_base: cfg.delivery_backoff,
        },
    );

    // --- Sources ---
    let mut sources = HashMap::new();
    for source_cfg in &cfg.sources {
        let adapter = HttpListingAdapter::from_config(source_cfg)?;
        sources.insert(
            source_cfg.marketplace.clone(),
            RegisteredSource {
                adapter: Arc::new(adapter),
                settings: SourceSettings::from(source_cfg),
            },
        );
    }
    if sources.is_empty() {
        warn!("SOURCES not set, monitoring passes will do nothing. Example: SOURCES=wb,ozon");
    } else {
        let names: Vec<String> = sources.keys().map(Marketplace::to_string).collect();
        info!("Sources configured ({}): {}", names.len(), names.join(", "));
    }

    // --- Pipeline ---
    let latency = Arc::new(LatencyStats::new());
    let health = Arc::new(HealthState::new());
    let scanner = Arc::new(ScanOrchestrator::new(
        sources,
        Arc::new(subscriptions),
        ChangeDetector::new(Arc::new(prices.clone()), cfg.min_significant_percent),
        AlertFanout::new(Arc::new(prices.clone()), Some(alert_tx)),
        delivery.clone(),
        Arc::clone(&latency),
    ));
    let monitor = Arc::new(MonitoringOrchestrator::new(Arc::clone(&scanner), Arc::clone(&health)));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ticker = IntervalTicker::new(cfg.monitor_interval);
    let monitor_task = tokio::spawn(monitor.run(ticker, shutdown_rx));
    info!(
        "Monitoring every {}s (min significant change {:.1}%)",
        cfg.monitor_interval.as_secs(),
        cfg.min_significant_percent,
    );

    // --- HTTP API server ---
    let api_state = ApiState {
        pool: pool.clone(),
        prices,
        health,
        latency,
        delivery: delivery.clone(),
        scanner,
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {e}");
            }
            info!("Shutdown requested");
        })
        .await?;

    // --- Shutdown ---
    let _ = shutdown_tx.send(true);
    if let Err(e) = monitor_task.await {
        error!("Monitor task failed: {e}");
    }
    delivery.shutdown().await;
    info!("Stopped");

    Ok(())
}
