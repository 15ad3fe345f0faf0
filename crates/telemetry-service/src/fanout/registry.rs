//! Subscriber registry and shutdown coordination.

use super::log_subscriber::{run_log_subscriber, LogSubscriber, Offer};
use super::stats::{run_flusher, StatAggregator, StatSnapshot, MAX_STAT_INTERVAL};
use super::CallEvent;
use crate::errors::TelemetryError;
use crate::observability;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Identifier assigned to each attached subscriber.
pub type SubscriberId = u64;

/// What happened to one published event.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    /// Log inboxes that accepted the event.
    pub delivered: usize,
    /// Log inboxes that were full.
    pub dropped: usize,
    /// Aggregators that counted the event.
    pub aggregated: usize,
}

struct StatEntry {
    aggregator: Arc<StatAggregator>,
    cancel: CancellationToken,
}

#[derive(Default)]
struct Subscribers {
    loggers: HashMap<SubscriberId, LogSubscriber>,
    aggregators: HashMap<SubscriberId, StatEntry>,
}

impl Subscribers {
    fn report_gauges(&self) {
        observability::set_log_subscribers_active(self.loggers.len());
        observability::set_stat_subscribers_active(self.aggregators.len());
    }
}

/// Unregisters a subscriber when its serving task ends.
///
/// A normal exit goes through [`UnregisterGuard::unregister`]. If the task
/// panics or is dropped first, `Drop` schedules the removal instead, so a
/// dead subscriber never stays in the registry.
struct UnregisterGuard {
    registry: Option<Arc<Registry>>,
    id: SubscriberId,
}

impl UnregisterGuard {
    fn new(registry: Arc<Registry>, id: SubscriberId) -> Self {
        Self {
            registry: Some(registry),
            id,
        }
    }

    async fn unregister(mut self) {
        if let Some(registry) = self.registry.take() {
            registry.unregister(self.id).await;
        }
    }
}

impl Drop for UnregisterGuard {
    fn drop(&mut self) {
        let Some(registry) = self.registry.take() else {
            return;
        };
        let id = self.id;
        warn!(
            target: "telemetry.fanout",
            subscriber_id = id,
            "Subscriber task ended abnormally, unregistering"
        );
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let tasks = registry.tasks.clone();
            tasks.spawn_on(
                async move {
                    registry.unregister(id).await;
                },
                &handle,
            );
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Live log subscribers and statistics aggregators.
///
/// Publish takes the read lock; attach, unregister and shutdown take the
/// write lock. Serving tasks are spawned while the write lock is held, so
/// once shutdown has cancelled the root token no new task can start.
pub struct Registry {
    subscribers: RwLock<Subscribers>,
    next_id: AtomicU64,
    inbox_capacity: usize,
    shutdown_token: CancellationToken,
    tasks: TaskTracker,
}

impl Registry {
    /// Create a registry whose log inboxes hold `inbox_capacity` events.
    #[must_use]
    pub fn new(inbox_capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(Subscribers::default()),
            next_id: AtomicU64::new(1),
            inbox_capacity: inbox_capacity.max(1),
            shutdown_token: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    /// Deliver `event` to every attached subscriber.
    ///
    /// Never waits on a client. A full log inbox drops this event for that
    /// subscriber only. An inbox whose task already exited is skipped; the
    /// task removes itself.
    pub async fn publish(&self, event: &CallEvent) -> PublishReport {
        let subscribers = self.subscribers.read().await;
        let mut report = PublishReport::default();

        for entry in subscribers.aggregators.values() {
            entry
                .aggregator
                .record(&event.consumer, &event.operation)
                .await;
            report.aggregated += 1;
        }

        for (id, logger) in &subscribers.loggers {
            match logger.offer(event.clone()) {
                Offer::Delivered => report.delivered += 1,
                Offer::Full => {
                    report.dropped += 1;
                    warn!(
                        target: "telemetry.fanout",
                        subscriber_id = id,
                        operation = %event.operation,
                        "Log subscriber inbox full, dropping event"
                    );
                }
                Offer::Closed => {}
            }
        }

        if report.dropped > 0 {
            observability::record_events_dropped(report.dropped as u64);
        }
        report
    }

    /// Attach a log subscriber that forwards events to `outbound`.
    ///
    /// # Errors
    ///
    /// Returns `TelemetryError::ShuttingDown` once shutdown has started.
    pub async fn attach_log_subscriber(
        self: &Arc<Self>,
        outbound: mpsc::Sender<CallEvent>,
    ) -> Result<SubscriberId, TelemetryError> {
        let mut subscribers = self.subscribers.write().await;
        if self.shutdown_token.is_cancelled() {
            return Err(TelemetryError::ShuttingDown);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = self.shutdown_token.child_token();
        let (inbox_tx, inbox_rx) = mpsc::channel(self.inbox_capacity);

        subscribers
            .loggers
            .insert(id, LogSubscriber::new(inbox_tx, cancel.clone()));
        subscribers.report_gauges();

        let guard = UnregisterGuard::new(Arc::clone(self), id);
        self.tasks.spawn(async move {
            let exit = run_log_subscriber(id, inbox_rx, outbound, cancel).await;
            guard.unregister().await;
            debug!(target: "telemetry.fanout", subscriber_id = id, ?exit, "Log subscriber ended");
        });

        info!(target: "telemetry.fanout", subscriber_id = id, "Log subscriber attached");
        Ok(id)
    }

    /// Attach a statistics subscriber that receives a snapshot every
    /// `interval`.
    ///
    /// # Errors
    ///
    /// Returns `TelemetryError::InvalidArgument` for a zero interval or one
    /// longer than [`MAX_STAT_INTERVAL`], and `TelemetryError::ShuttingDown`
    /// once shutdown has started.
    pub async fn attach_stat_subscriber(
        self: &Arc<Self>,
        interval: Duration,
        outbound: mpsc::Sender<StatSnapshot>,
    ) -> Result<SubscriberId, TelemetryError> {
        if interval.is_zero() {
            return Err(TelemetryError::InvalidArgument(
                "statistics interval must be positive".to_string(),
            ));
        }
        if interval > MAX_STAT_INTERVAL {
            return Err(TelemetryError::InvalidArgument(format!(
                "statistics interval must not exceed {}s",
                MAX_STAT_INTERVAL.as_secs()
            )));
        }
        let first_tick = tokio::time::Instant::now()
            .checked_add(interval)
            .ok_or_else(|| {
                TelemetryError::InvalidArgument("statistics interval is out of range".to_string())
            })?;

        let mut subscribers = self.subscribers.write().await;
        if self.shutdown_token.is_cancelled() {
            return Err(TelemetryError::ShuttingDown);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = self.shutdown_token.child_token();
        let aggregator = Arc::new(StatAggregator::new(interval));

        subscribers.aggregators.insert(
            id,
            StatEntry {
                aggregator: Arc::clone(&aggregator),
                cancel: cancel.clone(),
            },
        );
        subscribers.report_gauges();

        let guard = UnregisterGuard::new(Arc::clone(self), id);
        self.tasks.spawn(async move {
            let exit = run_flusher(id, aggregator, first_tick, outbound, cancel).await;
            guard.unregister().await;
            debug!(target: "telemetry.stats", subscriber_id = id, ?exit, "Statistics subscriber ended");
        });

        info!(
            target: "telemetry.stats",
            subscriber_id = id,
            interval_ms = millis(interval),
            "Statistics subscriber attached"
        );
        Ok(id)
    }

    /// Remove a subscriber. Returns false if it was not registered.
    pub async fn unregister(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.subscribers.write().await;
        let removed = match subscribers.loggers.remove(&id) {
            Some(logger) => {
                logger.cancel();
                true
            }
            None => match subscribers.aggregators.remove(&id) {
                Some(entry) => {
                    entry.cancel.cancel();
                    true
                }
                None => false,
            },
        };
        if removed {
            subscribers.report_gauges();
        }
        removed
    }

    /// Cancel one subscriber's serving task. The task unregisters itself.
    pub async fn cancel(&self, id: SubscriberId) -> bool {
        let subscribers = self.subscribers.read().await;
        if let Some(logger) = subscribers.loggers.get(&id) {
            logger.cancel();
            return true;
        }
        if let Some(entry) = subscribers.aggregators.get(&id) {
            entry.cancel.cancel();
            return true;
        }
        false
    }

    pub async fn log_subscriber_count(&self) -> usize {
        self.subscribers.read().await.loggers.len()
    }

    pub async fn stat_subscriber_count(&self) -> usize {
        self.subscribers.read().await.aggregators.len()
    }

    /// Serving tasks that have not exited yet.
    #[must_use]
    pub fn running_tasks(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Cancel every subscriber and wait for all serving tasks to exit.
    ///
    /// Further attach calls fail with `ShuttingDown`. Calling this twice is
    /// harmless.
    pub async fn shutdown(&self) {
        let started = Instant::now();
        {
            let subscribers = self.subscribers.write().await;
            info!(
                target: "telemetry.shutdown",
                log_subscribers = subscribers.loggers.len(),
                stat_subscribers = subscribers.aggregators.len(),
                "Cancelling subscribers"
            );
            self.shutdown_token.cancel();
        }

        self.tasks.close();
        self.tasks.wait().await;

        let elapsed = started.elapsed();
        observability::record_shutdown_duration(elapsed);
        info!(
            target: "telemetry.shutdown",
            elapsed_ms = millis(elapsed),
            "All subscribers stopped"
        );
    }
}
