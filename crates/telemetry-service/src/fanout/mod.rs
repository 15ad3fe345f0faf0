//! Call event fan-out.
//!
//! Every authorized call becomes one [`CallEvent`] that the [`Registry`]
//! hands to two kinds of subscriber:
//!
//! ```text
//! access layer ──publish──► Registry (RwLock)
//!                             ├── LogSubscriber inbox ──► serving task ──► Logging stream
//!                             └── StatAggregator counts ◄── flusher task ──► Statistics stream
//! ```
//!
//! Subscribers are registered and removed only through the registry. Each
//! one is served by a task spawned on the registry's `TaskTracker` with a
//! child of the registry's shutdown token, so [`Registry::shutdown`] can
//! cancel every subscriber and wait for all of them to exit.
//!
//! # Backpressure
//!
//! Log subscriber inboxes are bounded. When an inbox is full the newest
//! event is dropped for that subscriber only; publishing never waits on a
//! slow client. See [`Registry::publish`].

mod log_subscriber;
mod registry;
mod stats;

pub use log_subscriber::SubscriberExit;
pub use registry::{PublishReport, Registry, SubscriberId};
pub use stats::{CallCounts, StatAggregator, StatSnapshot, MAX_STAT_INTERVAL};

use chrono::Utc;

/// Record of one authorized call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallEvent {
    /// Consumer identity from call metadata.
    pub consumer: String,
    /// Fully-qualified operation name.
    pub operation: String,
    /// Caller peer address, or `"unknown"`.
    pub origin_host: String,
    /// Unix time in milliseconds at authorization.
    pub timestamp_ms: i64,
}

impl CallEvent {
    /// Create an event stamped with the current time.
    pub fn new(
        consumer: impl Into<String>,
        operation: impl Into<String>,
        origin_host: impl Into<String>,
    ) -> Self {
        Self {
            consumer: consumer.into(),
            operation: operation.into(),
            origin_host: origin_host.into(),
            timestamp_ms: Utc::now().timestamp_millis(),
        }
    }
}
