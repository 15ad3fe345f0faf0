//! Observability module for the telemetry service.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `telemetry_calls_total` | Counter | `operation`, `outcome` | Authorization outcomes per call |
//! | `telemetry_events_dropped_total` | Counter | none | Events dropped on full subscriber inboxes |
//! | `telemetry_delivery_failures_total` | Counter | `stream` | Failed writes to subscriber streams |
//! | `telemetry_log_subscribers_active` | Gauge | none | Attached log subscribers |
//! | `telemetry_stat_subscribers_active` | Gauge | none | Attached statistics subscribers |
//! | `telemetry_shutdown_duration_seconds` | Histogram | none | Time to drain subscribers on shutdown |

pub mod health;
pub mod metrics;

pub use health::{health_router, HealthState};
pub use metrics::{
    init_metrics_recorder, record_call, record_delivery_failure, record_events_dropped,
    record_shutdown_duration, set_log_subscribers_active, set_stat_subscribers_active,
};
