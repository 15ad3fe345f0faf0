//! gRPC clients that identify themselves with `consumer` metadata.

use proto_gen::telemetry::admin_client::AdminClient;
use proto_gen::telemetry::biz_client::BizClient;
use std::time::Duration;
use tokio_stream::StreamExt;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::service::interceptor::InterceptedService;
use tonic::service::Interceptor;
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Status, Streaming};

/// Metadata key read by the server's access layer.
const CONSUMER_KEY: &str = "consumer";

/// Interceptor that attaches a fixed consumer to every call.
#[derive(Clone, Debug)]
pub struct ConsumerInterceptor {
    consumer: Option<MetadataValue<Ascii>>,
}

impl ConsumerInterceptor {
    /// Panics if `consumer` is not valid ASCII metadata.
    pub fn new(consumer: &str) -> Self {
        let value = consumer
            .parse()
            .unwrap_or_else(|e| panic!("invalid consumer {consumer:?}: {e}"));
        Self {
            consumer: Some(value),
        }
    }

    /// Sends no consumer metadata at all.
    pub fn anonymous() -> Self {
        Self { consumer: None }
    }
}

impl Interceptor for ConsumerInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        if let Some(consumer) = &self.consumer {
            request
                .metadata_mut()
                .insert(CONSUMER_KEY, consumer.clone());
        }
        Ok(request)
    }
}

pub type TestBizClient = BizClient<InterceptedService<Channel, ConsumerInterceptor>>;
pub type TestAdminClient = AdminClient<InterceptedService<Channel, ConsumerInterceptor>>;

/// Open a channel to `url` (e.g. `TestTelemetryServer::url()`).
pub async fn connect(url: &str) -> Result<Channel, anyhow::Error> {
    let channel = Endpoint::from_shared(url.to_string())?
        .connect_timeout(Duration::from_secs(5))
        .connect()
        .await?;
    Ok(channel)
}

/// `Biz` client calling as `consumer`.
pub async fn biz_client(url: &str, consumer: &str) -> Result<TestBizClient, anyhow::Error> {
    let channel = connect(url).await?;
    Ok(BizClient::with_interceptor(
        channel,
        ConsumerInterceptor::new(consumer),
    ))
}

/// `Admin` client calling as `consumer`.
pub async fn admin_client(url: &str, consumer: &str) -> Result<TestAdminClient, anyhow::Error> {
    let channel = connect(url).await?;
    Ok(AdminClient::with_interceptor(
        channel,
        ConsumerInterceptor::new(consumer),
    ))
}

/// `Biz` client that sends no consumer metadata.
pub async fn anonymous_biz_client(url: &str) -> Result<TestBizClient, anyhow::Error> {
    let channel = connect(url).await?;
    Ok(BizClient::with_interceptor(
        channel,
        ConsumerInterceptor::anonymous(),
    ))
}

/// Next stream item, or `None` if the stream ends or `timeout` passes first.
///
/// Panics if the stream yields an error status.
pub async fn next_within<T>(stream: &mut Streaming<T>, timeout: Duration) -> Option<T> {
    match tokio::time::timeout(timeout, stream.next()).await {
        Ok(Some(Ok(item))) => Some(item),
        Ok(Some(Err(status))) => panic!("stream returned error status: {status}"),
        Ok(None) | Err(_) => None,
    }
}

/// Assert that nothing arrives on `stream` for `window`.
pub async fn assert_quiet<T: std::fmt::Debug>(stream: &mut Streaming<T>, window: Duration) {
    if let Ok(Some(item)) = tokio::time::timeout(window, stream.next()).await {
        panic!("expected no stream item, got {item:?}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interceptor_sets_consumer() {
        let mut interceptor = ConsumerInterceptor::new("biz_user");
        let request = interceptor.call(Request::new(())).unwrap();
        assert_eq!(
            request.metadata().get(CONSUMER_KEY).unwrap().to_str().unwrap(),
            "biz_user"
        );
    }

    #[test]
    fn test_anonymous_interceptor_sets_nothing() {
        let mut interceptor = ConsumerInterceptor::anonymous();
        let request = interceptor.call(Request::new(())).unwrap();
        assert!(request.metadata().get(CONSUMER_KEY).is_none());
    }

    #[test]
    #[should_panic(expected = "invalid consumer")]
    fn test_non_ascii_consumer_panics() {
        let _ = ConsumerInterceptor::new("bad\nconsumer");
    }
}
