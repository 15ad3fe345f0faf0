//! Business service.
//!
//! `Check`, `Add` and `Test` carry no logic of their own. Every call that
//! reaches them has already been authorized and published by the access
//! layer.

use super::access_layer::AuthorizedConsumer;
use proto_gen::telemetry::biz_server::Biz;
use proto_gen::telemetry::Nothing;
use tonic::{Request, Response, Status};
use tracing::instrument;

/// Consumer the access layer authorized for this call.
fn caller<T>(request: &Request<T>) -> &str {
    request
        .extensions()
        .get::<AuthorizedConsumer>()
        .map_or("", |consumer| consumer.0.as_str())
}

/// Business gRPC service.
#[derive(Debug, Default, Clone)]
pub struct BizService;

impl BizService {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[tonic::async_trait]
impl Biz for BizService {
    #[instrument(skip_all, name = "telemetry.grpc.biz.check", fields(consumer = caller(&request)))]
    async fn check(&self, request: Request<Nothing>) -> Result<Response<Nothing>, Status> {
        Ok(Response::new(Nothing::default()))
    }

    #[instrument(skip_all, name = "telemetry.grpc.biz.add", fields(consumer = caller(&request)))]
    async fn add(&self, request: Request<Nothing>) -> Result<Response<Nothing>, Status> {
        Ok(Response::new(Nothing::default()))
    }

    #[instrument(skip_all, name = "telemetry.grpc.biz.test", fields(consumer = caller(&request)))]
    async fn test(&self, request: Request<Nothing>) -> Result<Response<Nothing>, Status> {
        Ok(Response::new(Nothing::default()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_reads_authorized_consumer() {
        let mut request = Request::new(Nothing::default());
        assert_eq!(caller(&request), "");

        request
            .extensions_mut()
            .insert(AuthorizedConsumer("biz_user".to_string()));
        assert_eq!(caller(&request), "biz_user");
    }

    #[tokio::test]
    async fn test_handlers_return_nothing() {
        let service = BizService::new();

        let check = service.check(Request::new(Nothing::default())).await.unwrap();
        assert_eq!(check.into_inner(), Nothing::default());

        let add = service.add(Request::new(Nothing { dummy: true })).await.unwrap();
        assert_eq!(add.into_inner(), Nothing::default());

        let test = service.test(Request::new(Nothing::default())).await.unwrap();
        assert_eq!(test.into_inner(), Nothing::default());
    }
}
