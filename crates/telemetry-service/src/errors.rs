//! Telemetry service error types.
//!
//! Errors map to gRPC status codes via [`TelemetryError::to_status`].
//! Messages returned to callers are intentionally generic; the detailed
//! error is logged server-side.

use crate::acl::AclError;
use crate::config::ConfigError;
use thiserror::Error;
use tonic::Status;

/// Telemetry service error type.
///
/// Maps to gRPC status codes:
/// - `Authentication`, `Authorization`: `UNAUTHENTICATED`
/// - `InvalidArgument`: `INVALID_ARGUMENT`
/// - `ShuttingDown`: `UNAVAILABLE`
/// - `Config`, `Acl`, `Delivery`, `Transport`, `Io`: `INTERNAL`
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Startup configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The ACL could not be loaded.
    #[error("ACL error: {0}")]
    Acl(#[from] AclError),

    /// The call carried no consumer identity.
    #[error("Missing consumer identity")]
    Authentication,

    /// The consumer may not invoke the operation.
    #[error("Consumer {consumer} is not permitted to call {operation}")]
    Authorization { consumer: String, operation: String },

    /// Writing to a subscriber stream failed (client went away).
    #[error("Delivery to subscriber {subscriber_id} failed: {reason}")]
    Delivery { subscriber_id: u64, reason: String },

    /// The registry no longer accepts subscribers.
    #[error("Service is shutting down")]
    ShuttingDown,

    /// A request field is out of range.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// gRPC transport failure (bind, serve).
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// Socket-level failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TelemetryError {
    /// Returns the gRPC code for this error (also used as a metrics label).
    pub fn code(&self) -> tonic::Code {
        match self {
            TelemetryError::Authentication | TelemetryError::Authorization { .. } => {
                tonic::Code::Unauthenticated
            }
            TelemetryError::InvalidArgument(_) => tonic::Code::InvalidArgument,
            TelemetryError::ShuttingDown => tonic::Code::Unavailable,
            TelemetryError::Config(_)
            | TelemetryError::Acl(_)
            | TelemetryError::Delivery { .. }
            | TelemetryError::Transport(_)
            | TelemetryError::Io(_) => tonic::Code::Internal,
        }
    }

    /// Converts into a client-safe gRPC status.
    ///
    /// Both authentication failures share one message so a caller cannot
    /// discover which consumers exist.
    pub fn to_status(&self) -> Status {
        match self {
            TelemetryError::Authentication | TelemetryError::Authorization { .. } => {
                Status::unauthenticated("Authorization failed")
            }
            TelemetryError::InvalidArgument(msg) => Status::invalid_argument(msg.clone()),
            TelemetryError::ShuttingDown => Status::unavailable("Service is shutting down"),
            other => {
                tracing::error!(target: "telemetry.errors", error = %other, "Internal error");
                Status::internal("An internal error occurred")
            }
        }
    }
}

impl From<TelemetryError> for Status {
    fn from(err: TelemetryError) -> Self {
        err.to_status()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_errors_map_to_unauthenticated() {
        assert_eq!(
            TelemetryError::Authentication.code(),
            tonic::Code::Unauthenticated
        );
        let err = TelemetryError::Authorization {
            consumer: "biz_user".to_string(),
            operation: "/telemetry.Admin/Logging".to_string(),
        };
        assert_eq!(err.code(), tonic::Code::Unauthenticated);
    }

    #[test]
    fn test_auth_status_hides_consumer_and_operation() {
        let err = TelemetryError::Authorization {
            consumer: "biz_user".to_string(),
            operation: "/telemetry.Admin/Logging".to_string(),
        };
        let status = err.to_status();
        assert_eq!(status.code(), tonic::Code::Unauthenticated);
        assert!(!status.message().contains("biz_user"));
        assert!(!status.message().contains("Logging"));
        assert_eq!(
            status.message(),
            TelemetryError::Authentication.to_status().message()
        );
    }

    #[test]
    fn test_shutting_down_is_unavailable() {
        let status: Status = TelemetryError::ShuttingDown.into();
        assert_eq!(status.code(), tonic::Code::Unavailable);
    }

    #[test]
    fn test_invalid_argument_keeps_message() {
        let status = TelemetryError::InvalidArgument("interval_seconds must be positive".into())
            .to_status();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
        assert!(status.message().contains("interval_seconds"));
    }

    #[test]
    fn test_delivery_error_is_internal_and_generic() {
        let err = TelemetryError::Delivery {
            subscriber_id: 7,
            reason: "channel closed".to_string(),
        };
        assert_eq!(err.code(), tonic::Code::Internal);
        assert!(!err.to_status().message().contains("channel closed"));
    }

    #[test]
    fn test_display_formatting() {
        assert_eq!(
            format!(
                "{}",
                TelemetryError::Authorization {
                    consumer: "c1".to_string(),
                    operation: "/telemetry.Biz/Add".to_string(),
                }
            ),
            "Consumer c1 is not permitted to call /telemetry.Biz/Add"
        );
        assert_eq!(
            format!("{}", TelemetryError::ShuttingDown),
            "Service is shutting down"
        );
    }
}
