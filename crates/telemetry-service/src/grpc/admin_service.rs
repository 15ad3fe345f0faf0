//! Admin service: the `Logging` and `Statistics` server streams.
//!
//! Each call attaches one subscriber to the fan-out registry and returns a
//! stream fed by that subscriber's serving task. The stream ends when the
//! client goes away or the registry shuts down.

use crate::errors::TelemetryError;
use crate::fanout::{CallEvent, Registry, StatSnapshot};
use proto_gen::telemetry::admin_server::Admin;
use proto_gen::telemetry::{Event, Nothing, Stat, StatInterval};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tonic::{Request, Response, Status};
use tracing::instrument;

/// Items buffered between a serving task and the gRPC response stream.
const STREAM_BUFFER: usize = 16;

type GrpcStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send + 'static>>;

impl From<CallEvent> for Event {
    fn from(event: CallEvent) -> Self {
        Self {
            timestamp: event.timestamp_ms,
            consumer: event.consumer,
            method: event.operation,
            host: event.origin_host,
        }
    }
}

impl From<StatSnapshot> for Stat {
    fn from(snapshot: StatSnapshot) -> Self {
        Self {
            timestamp: snapshot.timestamp_ms,
            by_method: snapshot.counts.by_operation,
            by_consumer: snapshot.counts.by_consumer,
        }
    }
}

fn into_grpc_stream<D, T>(rx: mpsc::Receiver<D>) -> GrpcStream<T>
where
    D: Send + 'static,
    T: From<D> + Send + 'static,
{
    Box::pin(ReceiverStream::new(rx).map(|item| Ok::<T, Status>(T::from(item))))
}

/// Admin gRPC service.
pub struct AdminService {
    registry: Arc<Registry>,
    max_stat_interval_seconds: u64,
}

impl AdminService {
    #[must_use]
    pub fn new(registry: Arc<Registry>, max_stat_interval_seconds: u64) -> Self {
        Self {
            registry,
            max_stat_interval_seconds,
        }
    }

    fn stat_interval(&self, seconds: u64) -> Result<Duration, TelemetryError> {
        if seconds == 0 {
            return Err(TelemetryError::InvalidArgument(
                "interval_seconds must be positive".to_string(),
            ));
        }
        if seconds > self.max_stat_interval_seconds {
            return Err(TelemetryError::InvalidArgument(format!(
                "interval_seconds must not exceed {}",
                self.max_stat_interval_seconds
            )));
        }
        Ok(Duration::from_secs(seconds))
    }
}

#[tonic::async_trait]
impl Admin for AdminService {
    type LoggingStream = GrpcStream<Event>;
    type StatisticsStream = GrpcStream<Stat>;

    #[instrument(skip_all, name = "telemetry.grpc.admin.logging")]
    async fn logging(
        &self,
        _request: Request<Nothing>,
    ) -> Result<Response<Self::LoggingStream>, Status> {
        let (tx, rx) = mpsc::channel::<CallEvent>(STREAM_BUFFER);
        self.registry.attach_log_subscriber(tx).await?;
        Ok(Response::new(into_grpc_stream(rx)))
    }

    #[instrument(skip_all, name = "telemetry.grpc.admin.statistics")]
    async fn statistics(
        &self,
        request: Request<StatInterval>,
    ) -> Result<Response<Self::StatisticsStream>, Status> {
        let interval = self.stat_interval(request.into_inner().interval_seconds)?;
        let (tx, rx) = mpsc::channel::<StatSnapshot>(STREAM_BUFFER);
        self.registry.attach_stat_subscriber(interval, tx).await?;
        Ok(Response::new(into_grpc_stream(rx)))
    }
}
