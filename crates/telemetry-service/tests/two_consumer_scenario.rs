//! One business consumer and one admin, end to end.
//!
//! ACL: `consumer1` may call every `Biz` method, `admin` every `Admin`
//! method. The admin watches both streams while `consumer1` calls `Add`.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use proto_gen::telemetry::{Nothing, StatInterval};
use std::time::Duration;
use telemetry_test_utils::*;
use tonic::Code;

const ACL: &str = r#"{
    "consumer1": ["/telemetry.Biz/*"],
    "admin": ["/telemetry.Admin/*"]
}"#;

const RECV_TIMEOUT: Duration = Duration::from_secs(3);

#[tokio::test]
async fn test_add_is_logged_and_counted_once() -> Result<(), anyhow::Error> {
    let server = TestTelemetryServer::spawn(ACL).await?;

    let mut admin = admin_client(&server.url(), "admin").await?;
    let mut stats = admin
        .statistics(StatInterval {
            interval_seconds: 1,
        })
        .await?
        .into_inner();
    let mut events = admin.logging(Nothing::default()).await?.into_inner();

    let mut consumer = biz_client(&server.url(), "consumer1").await?;
    consumer.add(Nothing::default()).await?;

    let forbidden = admin_client(&server.url(), "consumer1")
        .await?
        .statistics(StatInterval {
            interval_seconds: 1,
        })
        .await
        .unwrap_err();
    assert_eq!(forbidden.code(), Code::Unauthenticated);

    let event = next_within(&mut events, RECV_TIMEOUT)
        .await
        .expect("add event");
    assert_eq!(event.consumer, "consumer1");
    assert_eq!(event.method, "/telemetry.Biz/Add");
    assert_quiet(&mut events, Duration::from_millis(200)).await;

    // The first snapshot also counts the admin's own Logging open.
    let first = next_within(&mut stats, RECV_TIMEOUT)
        .await
        .expect("first snapshot");
    assert_eq!(first.by_consumer.get("consumer1"), Some(&1));
    assert_eq!(first.by_method.get("/telemetry.Biz/Add"), Some(&1));
    assert_eq!(first.by_method.get("/telemetry.Admin/Logging"), Some(&1));
    assert_eq!(first.by_consumer.get("admin"), Some(&1));

    let second = next_within(&mut stats, RECV_TIMEOUT)
        .await
        .expect("second snapshot");
    assert!(second.by_consumer.is_empty());
    assert!(second.by_method.is_empty());

    server.shutdown().await
}
