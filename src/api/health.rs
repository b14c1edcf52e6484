//! Shared health state for the /health endpoint.
//! Updated by the monitoring orchestrator.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Default)]
pub struct HealthState {
    /// True while a monitoring pass is running.
    pub pass_running: AtomicBool,
    /// Nanosecond timestamp of the last pass start (0 = none).
    pub last_pass_started_at_ns: AtomicU64,
    /// Nanosecond timestamp of the last pass completion (0 = none).
    pub last_pass_finished_at_ns: AtomicU64,
    pub passes_completed: AtomicU64,
    /// Ticks that found the previous pass still running.
    pub passes_skipped: AtomicU64,
    /// Source passes that returned an error or panicked.
    pub source_failures: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pass_running(&self, v: bool) {
        self.pass_running.store(v, Ordering::Relaxed);
    }

    pub fn pass_started(&self, ns: u64) {
        self.last_pass_started_at_ns.store(ns, Ordering::Relaxed);
    }

    pub fn pass_finished(&self, ns: u64) {
        self.last_pass_finished_at_ns.store(ns, Ordering::Relaxed);
        self.passes_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_passes_skipped(&self) {
        self.passes_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_source_failures(&self) {
        self.source_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pass_running(&self) -> bool {
        self.pass_running.load(Ordering::Relaxed)
    }

    pub fn last_pass_started_at_ns(&self) -> u64 {
        self.last_pass_started_at_ns.load(Ordering::Relaxed)
    }

    pub fn last_pass_finished_at_ns(&self) -> u64 {
        self.last_pass_finished_at_ns.load(Ordering::Relaxed)
    }

    pub fn passes_completed(&self) -> u64 {
        self.passes_completed.load(Ordering::Relaxed)
    }

    pub fn passes_skipped(&self) -> u64 {
        self.passes_skipped.load(Ordering::Relaxed)
    }

    pub fn source_failures(&self) -> u64 {
        self.source_failures.load(Ordering::Relaxed)
    }
}
