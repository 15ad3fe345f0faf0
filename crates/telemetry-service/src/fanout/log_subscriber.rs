//! Log subscriber: a bounded inbox plus the task that forwards it to the
//! client's `Logging` stream.

use super::registry::SubscriberId;
use super::CallEvent;
use crate::errors::TelemetryError;
use crate::observability;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Why a subscriber's serving task stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberExit {
    /// Its cancellation token fired (shutdown or explicit cancel).
    Cancelled,
    /// The client dropped the stream.
    ClientDisconnected,
    /// Writing to the client stream failed.
    DeliveryFailed,
    /// The registry dropped the inbox.
    Detached,
}

/// Result of offering an event to one inbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Offer {
    Delivered,
    Full,
    Closed,
}

/// Registry-side half of a log subscriber.
pub(crate) struct LogSubscriber {
    inbox: mpsc::Sender<CallEvent>,
    cancel: CancellationToken,
}

impl LogSubscriber {
    pub(crate) fn new(inbox: mpsc::Sender<CallEvent>, cancel: CancellationToken) -> Self {
        Self { inbox, cancel }
    }

    /// Non-blocking delivery into the inbox.
    pub(crate) fn offer(&self, event: CallEvent) -> Offer {
        match self.inbox.try_send(event) {
            Ok(()) => Offer::Delivered,
            Err(TrySendError::Full(_)) => Offer::Full,
            Err(TrySendError::Closed(_)) => Offer::Closed,
        }
    }

    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// Forward inbox events to `outbound` until cancelled or the client leaves.
pub(crate) async fn run_log_subscriber(
    id: SubscriberId,
    mut inbox: mpsc::Receiver<CallEvent>,
    outbound: mpsc::Sender<CallEvent>,
    cancel: CancellationToken,
) -> SubscriberExit {
    loop {
        tokio::select! {
            () = cancel.cancelled() => return SubscriberExit::Cancelled,
            () = outbound.closed() => return SubscriberExit::ClientDisconnected,
            next = inbox.recv() => {
                let Some(event) = next else {
                    return SubscriberExit::Detached;
                };
                debug!(
                    target: "telemetry.fanout",
                    subscriber_id = id,
                    operation = %event.operation,
                    "Forwarding event"
                );
                tokio::select! {
                    () = cancel.cancelled() => return SubscriberExit::Cancelled,
                    sent = outbound.send(event) => {
                        if let Err(e) = sent {
                            let err = TelemetryError::Delivery {
                                subscriber_id: id,
                                reason: e.to_string(),
                            };
                            warn!(target: "telemetry.fanout", error = %err, "Log stream write failed");
                            observability::record_delivery_failure("logging");
                            return SubscriberExit::DeliveryFailed;
                        }
                    }
                }
            }
        }
    }
}
