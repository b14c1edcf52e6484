use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::api::HealthState;
use crate::scan::{PassOutcome, ScanOrchestrator};
use crate::types::Marketplace;

/// Drives monitoring passes. Injected so tests can tick manually.
#[async_trait]
pub trait Ticker: Send {
    async fn tick(&mut self);
}

/// Wall-clock ticker. The first tick fires immediately.
pub struct IntervalTicker {
    inner: tokio::time::Interval,
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        let mut inner = interval(period);
        inner.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { inner }
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) {
        self.inner.tick().await;
    }
}

#[derive(Debug)]
pub struct SourceReport {
    pub source: Marketplace,
    pub result: std::result::Result<PassOutcome, String>,
}

#[derive(Debug)]
pub enum PassReport {
    /// A previous pass was still running; nothing was dispatched.
    Skipped,
    Completed(Vec<SourceReport>),
}

/// Resets the pass flag on every exit path.
struct PassFlag<'a>(&'a AtomicBool);

impl Drop for PassFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs one pass over all sources per tick. A tick that finds the previous pass still
/// running is skipped; sources within a pass run concurrently and fail independently.
pub struct MonitoringOrchestrator {
    scanner: Arc<ScanOrchestrator>,
    health: Arc<HealthState>,
    pass_running: AtomicBool,
}

impl MonitoringOrchestrator {
    pub fn new(scanner: Arc<ScanOrchestrator>, health: Arc<HealthState>) -> Self {
        Self {
            scanner,
            health,
            pass_running: AtomicBool::new(false),
        }
    }

    /// Returns once every source has completed or failed.
    pub async fn run_one_pass(&self) -> PassReport {
        if self.pass_running.swap(true, Ordering::AcqRel) {
            self.skip_tick();
            return PassReport::Skipped;
        }
        let _flag = PassFlag(&self.pass_running);

        let started = Instant::now();
        self.health.set_pass_running(true);
        self.health.pass_started(now_ns());

        let sources = self.scanner.sources();
        let handles = sources.iter().cloned().map(|source| {
            let scanner = Arc::clone(&self.scanner);
            tokio::spawn(async move { scanner.run_pass(&source).await })
        });
        let results = join_all(handles).await;

        let mut reports = Vec::with_capacity(sources.len());
        for (source, joined) in sources.into_iter().zip(results) {
            let result = match joined {
                Ok(Ok(outcome)) => Ok(outcome),
                Ok(Err(e)) => {
                    self.health.inc_source_failures();
                    error!(source = %source, "Source pass failed: {e}");
                    Err(e.to_string())
                }
                Err(e) => {
                    self.health.inc_source_failures();
                    error!(source = %source, "Source pass panicked: {e}");
                    Err(e.to_string())
                }
            };
            reports.push(SourceReport { source, result });
        }

        self.health.set_pass_running(false);
        self.health.pass_finished(now_ns());

        let failed: Vec<String> = reports
            .iter()
            .filter(|r| r.result.is_err())
            .map(|r| r.source.to_string())
            .collect();
        let alerts: usize = reports
            .iter()
            .filter_map(|r| r.result.as_ref().ok())
            .map(|o| o.alerts)
            .sum();
        info!(
            sources = reports.len(),
            failed = failed.len(),
            alerts,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Monitoring pass complete: {} sources ({} failed: [{}]), {} alerts",
            reports.len(),
            failed.len(),
            failed.join(", "),
            alerts,
        );

        PassReport::Completed(reports)
    }

    fn skip_tick(&self) {
        self.health.inc_passes_skipped();
        warn!("Previous monitoring pass still running, skipping this tick");
    }

    /// Starts a pass on every tick until `shutdown` flips to true or its sender is
    /// dropped. Passes run in the background; a tick that lands while one is still
    /// running is skipped without spawning, so `running` always holds the pass that owns
    /// the flag and shutdown awaits that pass.
    pub async fn run<T: Ticker>(self: Arc<Self>, mut ticker: T, mut shutdown: watch::Receiver<bool>) {
        let mut running: Option<JoinHandle<PassReport>> = None;

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    if running.as_ref().is_some_and(|h| !h.is_finished()) {
                        self.skip_tick();
                    } else {
                        let this = Arc::clone(&self);
                        running = Some(tokio::spawn(async move { this.run_one_pass().await }));
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.scanner.stop();
        if let Some(handle) = running {
            if !self.scanner.in_flight().is_empty() {
                info!(
                    scans = self.scanner.in_flight().len(),
                    "Waiting for the running pass to finish",
                );
            }
            match handle.await {
                Ok(PassReport::Completed(reports)) => {
                    let ok = reports.iter().filter(|r| r.result.is_ok()).count();
                    info!(sources = reports.len(), ok, "Last pass finished before shutdown");
                }
                Ok(PassReport::Skipped) => {}
                Err(e) => error!("Monitoring pass task failed: {e}"),
            }
        }
        info!("Monitoring stopped");
    }
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}
