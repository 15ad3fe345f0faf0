//! Per-call access control and event publishing.
//!
//! [`AccessLayer`] wraps the whole gRPC router. For every call it:
//!
//! 1. reads the consumer values from the `consumer` metadata key,
//! 2. checks the full method path against the [`AclTable`] for each value,
//!    and takes the first one that is permitted,
//! 3. publishes a [`CallEvent`] to the fan-out registry,
//! 4. hands the call to the service handler.
//!
//! Rejected calls get `UNAUTHENTICATED` with the same message whether the
//! consumer was missing or not permitted, and publish nothing.

use crate::acl::{AclTable, GroupTable};
use crate::errors::TelemetryError;
use crate::fanout::{CallEvent, Registry};
use crate::observability;
use axum::http;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tonic::body::BoxBody;
use tonic::transport::server::TcpConnectInfo;
use tower::{Layer, Service};

/// Metadata key that carries the caller's identity.
pub const CONSUMER_METADATA_KEY: &str = "consumer";

/// Reported origin when the peer address is not available.
pub const UNKNOWN_HOST: &str = "unknown";

/// Consumer identity of an authorized call, stored in request extensions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorizedConsumer(pub String);

/// Tower layer for consumer authorization.
#[derive(Clone)]
pub struct AccessLayer {
    acl: Arc<AclTable>,
    groups: Arc<GroupTable>,
    registry: Arc<Registry>,
}

impl AccessLayer {
    pub fn new(acl: Arc<AclTable>, groups: Arc<GroupTable>, registry: Arc<Registry>) -> Self {
        Self {
            acl,
            groups,
            registry,
        }
    }
}

impl<S> Layer<S> for AccessLayer {
    type Service = AccessService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AccessService {
            inner,
            acl: Arc::clone(&self.acl),
            groups: Arc::clone(&self.groups),
            registry: Arc::clone(&self.registry),
        }
    }
}

/// Tower service produced by [`AccessLayer`].
#[derive(Clone)]
pub struct AccessService<S> {
    inner: S,
    acl: Arc<AclTable>,
    groups: Arc<GroupTable>,
    registry: Arc<Registry>,
}

impl<S, ReqBody> Service<http::Request<ReqBody>> for AccessService<S>
where
    S: Service<http::Request<ReqBody>, Response = http::Response<BoxBody>>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: http::Request<ReqBody>) -> Self::Future {
        let mut inner = self.inner.clone();
        let acl = Arc::clone(&self.acl);
        let groups = Arc::clone(&self.groups);
        let registry = Arc::clone(&self.registry);

        Box::pin(async move {
            let operation = req.uri().path().to_string();
            let label = metric_operation(&groups, &operation);

            let candidates = consumers_from_headers(req.headers());
            if candidates.is_empty() {
                tracing::debug!(
                    target: "telemetry.grpc.access",
                    operation = %operation,
                    "Missing consumer metadata"
                );
                observability::record_call(label, "unauthenticated");
                return Ok(rejection(&TelemetryError::Authentication));
            }

            let Some(consumer) = candidates
                .iter()
                .find(|candidate| acl.is_allowed(candidate, &operation))
                .cloned()
            else {
                observability::record_call(label, "denied");
                let err = TelemetryError::Authorization {
                    consumer: candidates.join(","),
                    operation,
                };
                tracing::debug!(target: "telemetry.grpc.access", error = %err, "Call denied");
                return Ok(rejection(&err));
            };

            observability::record_call(label, "allowed");
            let origin_host = origin_host(&req);
            let event = CallEvent::new(consumer.clone(), operation, origin_host);
            let report = registry.publish(&event).await;
            tracing::debug!(
                target: "telemetry.grpc.access",
                consumer = %event.consumer,
                operation = %event.operation,
                origin_host = %event.origin_host,
                delivered = report.delivered,
                aggregated = report.aggregated,
                "Call authorized"
            );

            let (mut parts, body) = req.into_parts();
            parts.extensions.insert(AuthorizedConsumer(consumer));
            let req = http::Request::from_parts(parts, body);

            inner.call(req).await
        })
    }
}

/// Every `consumer` value that is ASCII and non-empty, in arrival order.
fn consumers_from_headers(headers: &http::HeaderMap) -> Vec<String> {
    headers
        .get_all(CONSUMER_METADATA_KEY)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

fn origin_host<B>(req: &http::Request<B>) -> String {
    req.extensions()
        .get::<TcpConnectInfo>()
        .and_then(TcpConnectInfo::remote_addr)
        .map_or_else(|| UNKNOWN_HOST.to_string(), |addr| addr.to_string())
}

/// Keeps the `operation` label bounded to configured operations.
fn metric_operation<'a>(groups: &GroupTable, operation: &'a str) -> &'a str {
    if groups.contains_operation(operation) {
        operation
    } else {
        "other"
    }
}

fn rejection(err: &TelemetryError) -> http::Response<BoxBody> {
    err.to_status().into_http()
}
