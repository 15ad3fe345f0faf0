//! Per-subscriber call statistics.
//!
//! Each `Statistics` subscriber owns one [`StatAggregator`]. The registry
//! bumps its counters on every publish; the flusher task swaps them out
//! once per interval and sends the snapshot to the client.

use super::log_subscriber::SubscriberExit;
use super::registry::SubscriberId;
use crate::errors::TelemetryError;
use crate::observability;
use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Longest flush interval a statistics subscriber may ask for.
pub const MAX_STAT_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Call counts accumulated during one interval.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CallCounts {
    pub by_consumer: HashMap<String, u64>,
    pub by_operation: HashMap<String, u64>,
}

impl CallCounts {
    pub fn record(&mut self, consumer: &str, operation: &str) {
        *self.by_consumer.entry(consumer.to_string()).or_insert(0) += 1;
        *self.by_operation.entry(operation.to_string()).or_insert(0) += 1;
    }

    /// Number of calls counted. Equal for both maps.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.by_operation.values().sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_operation.is_empty()
    }
}

/// Counts sent to a statistics subscriber at the end of an interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatSnapshot {
    /// Unix time in milliseconds when the snapshot was taken.
    pub timestamp_ms: i64,
    pub counts: CallCounts,
}

/// Counters for one statistics subscriber.
#[derive(Debug)]
pub struct StatAggregator {
    counts: Mutex<CallCounts>,
    interval: Duration,
}

impl StatAggregator {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            counts: Mutex::new(CallCounts::default()),
            interval,
        }
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn record(&self, consumer: &str, operation: &str) {
        self.counts.lock().await.record(consumer, operation);
    }

    /// Take the current counts and reset them in one step.
    pub async fn take(&self) -> CallCounts {
        std::mem::take(&mut *self.counts.lock().await)
    }
}

/// Flush `aggregator` to `outbound` every interval.
///
/// The first snapshot is sent at `first_tick`, then once per interval.
/// Snapshots are sent even when nothing was counted. Counts recorded after
/// the last tick are discarded when the subscriber ends.
pub(crate) async fn run_flusher(
    id: SubscriberId,
    aggregator: std::sync::Arc<StatAggregator>,
    first_tick: Instant,
    outbound: mpsc::Sender<StatSnapshot>,
    cancel: CancellationToken,
) -> SubscriberExit {
    let mut ticker = interval_at(first_tick, aggregator.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = cancel.cancelled() => return SubscriberExit::Cancelled,
            () = outbound.closed() => return SubscriberExit::ClientDisconnected,
            _ = ticker.tick() => {
                let counts = aggregator.take().await;
                debug!(
                    target: "telemetry.stats",
                    subscriber_id = id,
                    calls = counts.total(),
                    "Flushing statistics"
                );
                let snapshot = StatSnapshot {
                    timestamp_ms: Utc::now().timestamp_millis(),
                    counts,
                };
                tokio::select! {
                    () = cancel.cancelled() => return SubscriberExit::Cancelled,
                    sent = outbound.send(snapshot) => {
                        if let Err(e) = sent {
                            let err = TelemetryError::Delivery {
                                subscriber_id: id,
                                reason: e.to_string(),
                            };
                            warn!(target: "telemetry.stats", error = %err, "Statistics stream write failed");
                            observability::record_delivery_failure("statistics");
                            return SubscriberExit::DeliveryFailed;
                        }
                    }
                }
            }
        }
    }
}
