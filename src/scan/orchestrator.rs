use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::alert::{render_alert, AlertFanout};
use crate::api::latency::LatencyStats;
use crate::db::SubscriptionStore;
use crate::delivery::DeliveryQueue;
use crate::detector::{ChangeDetector, Observation};
use crate::error::{AppError, Result};
use crate::scan::in_flight::InFlightTargets;
use crate::source::RegisteredSource;
use crate::types::{Marketplace, ScrapedItem, Subscription, TargetKind, WatchTarget};

/// Per-source pass summary.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassOutcome {
    pub targets_total: usize,
    pub targets_scanned: usize,
    /// Already being scanned by another pass.
    pub targets_skipped: usize,
    pub pages_fetched: usize,
    pub page_failures: usize,
    pub items_seen: usize,
    pub items_invalid: usize,
    pub persistence_failures: usize,
    pub changes: usize,
    pub significant_changes: usize,
    pub alerts: usize,
}

impl PassOutcome {
    fn absorb(&mut self, t: &TargetOutcome) {
        self.targets_total += 1;
        if t.skipped {
            self.targets_skipped += 1;
            return;
        }
        self.targets_scanned += 1;
        self.pages_fetched += t.pages_fetched;
        self.page_failures += usize::from(t.page_failed);
        self.items_seen += t.items_seen;
        self.items_invalid += t.items_invalid;
        self.persistence_failures += t.persistence_failures;
        self.changes += t.changes;
        self.significant_changes += t.significant_changes;
        self.alerts += t.alerts;
    }
}

#[derive(Debug, Default)]
struct TargetOutcome {
    skipped: bool,
    pages_fetched: usize,
    page_failed: bool,
    items_seen: usize,
    items_invalid: usize,
    persistence_failures: usize,
    changes: usize,
    significant_changes: usize,
    alerts: usize,
}

/// Pages to scan for one target: one fetch for a product, otherwise the most demanding
/// subscriber's budget capped by the source ceiling. Never less than one page.
pub fn page_budget(target: &WatchTarget, subscriptions: &[Subscription], hard_cap: u32) -> u32 {
    match target.kind() {
        TargetKind::Product => 1,
        TargetKind::Category => subscriptions
            .iter()
            .map(|s| s.scan_page_budget)
            .max()
            .unwrap_or(1)
            .clamp(1, hard_cap.max(1)),
    }
}

/// Groups subscriptions by target, keeping first-seen target order.
pub fn group_by_target(subscriptions: Vec<Subscription>) -> Vec<(WatchTarget, Vec<Subscription>)> {
    let mut index: HashMap<WatchTarget, usize> = HashMap::new();
    let mut groups: Vec<(WatchTarget, Vec<Subscription>)> = Vec::new();
    for sub in subscriptions {
        match index.get(&sub.target) {
            Some(&i) => groups[i].1.push(sub),
            None => {
                index.insert(sub.target.clone(), groups.len());
                groups.push((sub.target.clone(), vec![sub]));
            }
        }
    }
    groups
}

/// Scans every watched target of a source once per pass.
///
/// Targets are scanned concurrently with each other; a target already in flight is
/// skipped until the next pass. Within a target, pages are fetched sequentially with
/// the source's inter-page delay and items are observed one at a time.
pub struct ScanOrchestrator {
    sources: HashMap<Marketplace, RegisteredSource>,
    subscriptions: Arc<dyn SubscriptionStore>,
    detector: ChangeDetector,
    fanout: AlertFanout,
    delivery: DeliveryQueue,
    in_flight: InFlightTargets,
    latency: Arc<LatencyStats>,
    stopping: AtomicBool,
}

impl ScanOrchestrator {
    pub fn new(
        sources: HashMap<Marketplace, RegisteredSource>,
        subscriptions: Arc<dyn SubscriptionStore>,
        detector: ChangeDetector,
        fanout: AlertFanout,
        delivery: DeliveryQueue,
        latency: Arc<LatencyStats>,
    ) -> Self {
        Self {
            sources,
            subscriptions,
            detector,
            fanout,
            delivery,
            in_flight: InFlightTargets::new(),
            latency,
            stopping: AtomicBool::new(false),
        }
    }

    /// Registered marketplaces, sorted.
    pub fn sources(&self) -> Vec<Marketplace> {
        let mut names: Vec<Marketplace> = self.sources.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn in_flight(&self) -> &InFlightTargets {
        &self.in_flight
    }

    /// Scans in progress stop before their next page; the page being fetched and the
    /// items already gathered are still processed.
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::Release);
    }

    pub async fn run_pass(&self, source: &Marketplace) -> Result<PassOutcome> {
        let registered = self
            .sources
            .get(source)
            .ok_or_else(|| AppError::UnknownSource(source.to_string()))?;

        let subscriptions = self.subscriptions.active_subscriptions_by_source(source).await?;
        let groups = group_by_target(subscriptions);

        let scans = groups
            .into_iter()
            .map(|(target, subs)| self.scan_target(registered, target, subs));
        let results = join_all(scans).await;

        let mut outcome = PassOutcome::default();
        for r in &results {
            outcome.absorb(r);
        }

        info!(
            source = %source,
            targets = outcome.targets_total,
            scanned = outcome.targets_scanned,
            skipped = outcome.targets_skipped,
            pages = outcome.pages_fetched,
            page_failures = outcome.page_failures,
            items = outcome.items_seen,
            changes = outcome.changes,
            alerts = outcome.alerts,
            "Source pass complete: {} targets ({} skipped), {} items, {} changes, {} alerts",
            outcome.targets_total,
            outcome.targets_skipped,
            outcome.items_seen,
            outcome.changes,
            outcome.alerts,
        );
        Ok(outcome)
    }

    async fn scan_target(
        &self,
        source: &RegisteredSource,
        target: WatchTarget,
        subscriptions: Vec<Subscription>,
    ) -> TargetOutcome {
        let Some(_guard) = self.in_flight.try_acquire(&target) else {
            info!(target = %target, "Scan already in flight, skipping this pass");
            return TargetOutcome { skipped: true, ..Default::default() };
        };

        let started = Instant::now();
        let mut outcome = TargetOutcome::default();
        let pages = page_budget(&target, &subscriptions, source.settings.page_hard_cap);

        let items = self.collect_pages(source, &target, pages, &mut outcome).await;

        let scanned_at = now_ns() as i64;
        for sub in &subscriptions {
            if let Err(e) = self.subscriptions.update_last_scan_at(sub.id, scanned_at).await {
                warn!(subscription_id = sub.id, target = %target, "Failed to update last_scan_at: {e}");
            }
        }

        self.process_items(&target, &subscriptions, items, scanned_at, &mut outcome)
            .await;

        self.latency.record(started.elapsed());
        debug!(
            target = %target,
            pages = outcome.pages_fetched,
            items = outcome.items_seen,
            changes = outcome.changes,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Target scan complete",
        );
        outcome
    }

    async fn collect_pages(
        &self,
        source: &RegisteredSource,
        target: &WatchTarget,
        pages: u32,
        outcome: &mut TargetOutcome,
    ) -> Vec<ScrapedItem> {
        let mut items = Vec::new();

        for page in 1..=pages {
            if page > 1 {
                if self.stopping.load(Ordering::Acquire) {
                    debug!(target = %target, page, "Stopping pagination for shutdown");
                    break;
                }
                tokio::time::sleep(source.settings.inter_page_delay).await;
            }

            match source.adapter.fetch_page(target, page).await {
                Ok(batch) => {
                    outcome.pages_fetched += 1;
                    if batch.is_empty() {
                        break;
                    }
                    items.extend(batch);
                }
                Err(e) => {
                    outcome.page_failed = true;
                    warn!(
                        target = %target,
                        page,
                        collected = items.len(),
                        "Page fetch failed, keeping partial result: {e}",
                    );
                    break;
                }
            }
        }
        items
    }

    async fn process_items(
        &self,
        target: &WatchTarget,
        subscriptions: &[Subscription],
        items: Vec<ScrapedItem>,
        scanned_at: i64,
        outcome: &mut TargetOutcome,
    ) {
        // Listings can shift between pages and repeat an item; the first sighting wins.
        let mut seen: HashSet<String> = HashSet::new();

        for item in items {
            if !item.is_valid() {
                outcome.items_invalid += 1;
                continue;
            }
            if !seen.insert(item.id.clone()) {
                continue;
            }
            outcome.items_seen += 1;

            let change = match self.detector.observe(&item, target, scanned_at).await {
                Ok(Observation::Changed(change)) => change,
                Ok(_) => continue,
                Err(e) => {
                    outcome.persistence_failures += 1;
                    warn!(item_id = %item.id, target = %target, "Price history write failed, skipping item: {e}");
                    continue;
                }
            };

            outcome.changes += 1;
            if !self.detector.is_significant(&change) {
                continue;
            }
            outcome.significant_changes += 1;

            info!(
                item_id = %change.item.id,
                target = %target,
                old_price = change.old_price,
                new_price = change.new_price,
                percent = change.percent_change,
                direction = %change.direction(),
                magnitude = %change.magnitude(),
                "Price {} {:+.1}% ({} → {})",
                change.direction(),
                change.percent_change,
                change.old_price,
                change.new_price,
            );

            let alerts = self.fanout.fanout(&change, subscriptions, scanned_at).await;
            outcome.alerts += alerts.len();
            for alert in &alerts {
                self.delivery
                    .enqueue(alert.subscriber_id, render_alert(alert), alert.image.clone());
            }
        }
    }
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}
