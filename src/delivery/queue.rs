use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use dashmap::DashSet;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::config::{
    DELIVERY_BACKOFF_MS, DELIVERY_MAX_RETRIES, DELIVERY_PACING_MS, TELEGRAM_CAPTION_LIMIT,
};
use crate::delivery::sender::{ChatSender, SendError};
use crate::types::DeliveryTask;

#[derive(Debug, Clone)]
pub struct DeliverySettings {
    pub max_retries: u32,
    /// Pause before every send, retries included. Global across recipients.
    pub pacing: Duration,
    /// Backoff unit; the Nth retry waits `N * backoff_base`.
    pub backoff_base: Duration,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            max_retries: DELIVERY_MAX_RETRIES,
            pacing: Duration::from_millis(DELIVERY_PACING_MS),
            backoff_base: Duration::from_millis(DELIVERY_BACKOFF_MS),
        }
    }
}

/// Delay before a task on its `retry_count`th retry is requeued.
pub fn backoff_delay(retry_count: u32, base: Duration) -> Duration {
    base.saturating_mul(retry_count)
}

/// What happened to a task on one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptOutcome {
    Delivered,
    Requeued,
    Dropped,
}

/// FIFO outbound message queue drained by a single worker.
///
/// `enqueue` is fire-and-forget and starts the worker when it is idle. At most one
/// drain loop runs at a time. A transiently failed task moves to the tail after its
/// backoff, so ordering is only preserved for first-attempt successes.
#[derive(Clone)]
pub struct DeliveryQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    tasks: Mutex<VecDeque<DeliveryTask>>,
    draining: AtomicBool,
    shutdown: AtomicBool,
    /// Signalled each time a drain loop exits.
    idle: Notify,
    sender: Arc<dyn ChatSender>,
    settings: DeliverySettings,
    /// Recipients classified as permanently unreachable during this process lifetime.
    blocked: DashSet<i64>,
    delivered: AtomicU64,
    dropped: AtomicU64,
    retried: AtomicU64,
}

impl DeliveryQueue {
    pub fn new(sender: Arc<dyn ChatSender>, settings: DeliverySettings) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                tasks: Mutex::new(VecDeque::new()),
                draining: AtomicBool::new(false),
                shutdown: AtomicBool::new(false),
                idle: Notify::new(),
                sender,
                settings,
                blocked: DashSet::new(),
                delivered: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                retried: AtomicU64::new(0),
            }),
        }
    }

    /// Must be called from within a tokio runtime.
    pub fn enqueue(&self, recipient_id: i64, text: String, image: Option<String>) {
        if self.inner.shutdown.load(Ordering::Acquire) {
            warn!(recipient_id, "Delivery queue is shut down; message discarded");
            return;
        }
        self.inner.tasks().push_back(DeliveryTask::new(recipient_id, text, image));
        self.ensure_worker();
    }

    fn ensure_worker(&self) {
        if !self.inner.draining.swap(true, Ordering::AcqRel) {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.drain().await });
        }
    }

    /// Resolves once no drain loop is running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if !self.inner.draining.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }

    /// Stops the worker after the attempt in progress. Tasks still queued are discarded.
    pub async fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        self.wait_idle().await;
        if !self.is_empty() {
            warn!(remaining = self.len(), "Delivery queue shut down with undelivered messages");
        }
    }

    pub fn len(&self) -> usize {
        self.inner.tasks().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_draining(&self) -> bool {
        self.inner.draining.load(Ordering::Acquire)
    }

    pub fn delivered_count(&self) -> u64 {
        self.inner.delivered.load(Ordering::Relaxed)
    }

    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    pub fn retried_count(&self) -> u64 {
        self.inner.retried.load(Ordering::Relaxed)
    }

    pub fn blocked_count(&self) -> usize {
        self.inner.blocked.len()
    }

    #[cfg(test)]
    pub fn is_blocked(&self, recipient_id: i64) -> bool {
        self.inner.blocked.contains(&recipient_id)
    }
}

impl QueueInner {
    fn tasks(&self) -> MutexGuard<'_, VecDeque<DeliveryTask>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn pop(&self) -> Option<DeliveryTask> {
        self.tasks().pop_front()
    }

    async fn drain(self: Arc<Self>) {
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                self.draining.store(false, Ordering::Release);
                break;
            }
            match self.pop() {
                Some(task) => {
                    self.attempt(task).await;
                }
                None => {
                    self.draining.store(false, Ordering::Release);
                    // Something enqueued between the pop and the store would otherwise
                    // wait for the next enqueue to be picked up.
                    if self.tasks().is_empty() || self.draining.swap(true, Ordering::AcqRel) {
                        break;
                    }
                }
            }
        }
        self.idle.notify_waiters();
    }

    async fn attempt(&self, mut task: DeliveryTask) -> AttemptOutcome {
        if self.blocked.contains(&task.recipient_id) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(recipient_id = task.recipient_id, "Recipient unreachable; message dropped");
            return AttemptOutcome::Dropped;
        }

        tokio::time::sleep(self.settings.pacing).await;

        match self.send(&task).await {
            Ok(()) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                debug!(
                    recipient_id = task.recipient_id,
                    retries = task.retry_count,
                    queued_ms = task.enqueued_at.elapsed().as_millis() as u64,
                    "Message delivered",
                );
                AttemptOutcome::Delivered
            }
            Err(SendError::Permanent(detail)) => {
                self.blocked.insert(task.recipient_id);
                self.dropped.fetch_add(1, Ordering::Relaxed);
                info!(recipient_id = task.recipient_id, "Recipient unreachable, dropping: {detail}");
                AttemptOutcome::Dropped
            }
            Err(SendError::Rejected(detail)) | Err(SendError::Asset(detail)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(recipient_id = task.recipient_id, "Message rejected, dropping: {detail}");
                AttemptOutcome::Dropped
            }
            Err(SendError::Transient { detail, retry_after }) => {
                task.retry_count += 1;
                if task.retry_count > self.settings.max_retries {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    error!(
                        recipient_id = task.recipient_id,
                        attempts = task.retry_count,
                        "Message dropped after exhausting retries: {detail}",
                    );
                    return AttemptOutcome::Dropped;
                }

                let delay = backoff_delay(task.retry_count, self.settings.backoff_base)
                    .max(retry_after.unwrap_or_default());
                self.retried.fetch_add(1, Ordering::Relaxed);
                warn!(
                    recipient_id = task.recipient_id,
                    retry = task.retry_count,
                    delay_ms = delay.as_millis() as u64,
                    "Delivery failed, requeueing: {detail}",
                );
                // Sleeps on the worker: a rate limit from the chat API applies to every
                // recipient, so the whole queue waits out `retry_after`.
                tokio::time::sleep(delay).await;
                self.tasks().push_back(task);
                AttemptOutcome::Requeued
            }
        }
    }

    /// One attempt. An image the channel cannot use degrades to a text-only send of the
    /// same content within this attempt.
    async fn send(&self, task: &DeliveryTask) -> Result<(), SendError> {
        let image = task
            .image
            .as_deref()
            .filter(|_| task.text.chars().count() <= TELEGRAM_CAPTION_LIMIT);

        let Some(image) = image else {
            return self.sender.send_text(task.recipient_id, &task.text).await;
        };

        match self.sender.send_photo(task.recipient_id, image, &task.text).await {
            Err(SendError::Asset(detail)) => {
                debug!(recipient_id = task.recipient_id, "Image unusable, sending text only: {detail}");
                self.sender.send_text(task.recipient_id, &task.text).await
            }
            other => other,
        }
    }
}
