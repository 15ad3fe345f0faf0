//! End-to-end tests for the `Logging` stream.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use proto_gen::telemetry::Nothing;
use std::time::Duration;
use telemetry_test_utils::*;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn test_every_subscriber_sees_every_call_in_order() -> Result<(), anyhow::Error> {
    const SUBSCRIBERS: usize = 3;
    let server = TestTelemetryServer::spawn(DEFAULT_TEST_ACL).await?;

    let mut streams = Vec::new();
    for _ in 0..SUBSCRIBERS {
        let mut admin = admin_client(&server.url(), "logger").await?;
        streams.push(admin.logging(Nothing::default()).await?.into_inner());
    }

    // Earlier subscribers see the Logging calls that opened later ones.
    for (i, stream) in streams.iter_mut().enumerate() {
        for _ in i + 1..SUBSCRIBERS {
            let event = next_within(stream, RECV_TIMEOUT)
                .await
                .expect("logging open event");
            assert_eq!(event.method, "/telemetry.Admin/Logging");
            assert_eq!(event.consumer, "logger");
        }
    }

    let mut biz = biz_client(&server.url(), "biz_admin").await?;
    biz.check(Nothing::default()).await?;
    biz.add(Nothing::default()).await?;
    biz.test(Nothing::default()).await?;
    biz.add(Nothing::default()).await?;

    let expected = [
        "/telemetry.Biz/Check",
        "/telemetry.Biz/Add",
        "/telemetry.Biz/Test",
        "/telemetry.Biz/Add",
    ];
    for stream in &mut streams {
        for method in expected {
            let event = next_within(stream, RECV_TIMEOUT)
                .await
                .expect("biz call event");
            assert_eq!(event.method, method);
            assert_eq!(event.consumer, "biz_admin");
        }
    }

    server.shutdown().await
}

#[tokio::test]
async fn test_subscriber_does_not_see_its_own_open() -> Result<(), anyhow::Error> {
    let server = TestTelemetryServer::spawn(DEFAULT_TEST_ACL).await?;
    let mut admin = admin_client(&server.url(), "logger").await?;
    let mut events = admin.logging(Nothing::default()).await?.into_inner();

    let mut biz = biz_client(&server.url(), "biz_user").await?;
    biz.check(Nothing::default()).await?;

    let first = next_within(&mut events, RECV_TIMEOUT)
        .await
        .expect("check event");
    assert_eq!(first.method, "/telemetry.Biz/Check");

    server.shutdown().await
}

#[tokio::test]
async fn test_event_fields() -> Result<(), anyhow::Error> {
    let server = TestTelemetryServer::spawn(DEFAULT_TEST_ACL).await?;
    let mut admin = admin_client(&server.url(), "logger").await?;
    let mut events = admin.logging(Nothing::default()).await?.into_inner();

    let before = chrono::Utc::now().timestamp_millis();
    biz_client(&server.url(), "biz_user")
        .await?
        .add(Nothing::default())
        .await?;

    let event = next_within(&mut events, RECV_TIMEOUT)
        .await
        .expect("add event");
    assert_eq!(event.consumer, "biz_user");
    assert_eq!(event.method, "/telemetry.Biz/Add");
    assert!(
        event.host.starts_with("127.0.0.1:"),
        "host should be the caller's address, got {}",
        event.host
    );
    assert!(event.timestamp >= before);

    server.shutdown().await
}

#[tokio::test]
async fn test_disconnected_subscriber_is_removed() -> Result<(), anyhow::Error> {
    let server = TestTelemetryServer::spawn(DEFAULT_TEST_ACL).await?;
    let registry = server.registry();

    let mut admin = admin_client(&server.url(), "logger").await?;
    let events = admin.logging(Nothing::default()).await?.into_inner();
    assert_eq!(registry.log_subscriber_count().await, 1);

    drop(events);
    drop(admin);

    let mut removed = false;
    for _ in 0..50 {
        // A publish is not needed; the serving task notices the closed stream.
        if registry.log_subscriber_count().await == 0 {
            removed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(removed, "subscriber should unregister after client disconnect");

    server.shutdown().await
}
