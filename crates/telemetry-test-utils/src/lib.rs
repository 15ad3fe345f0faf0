//! # Telemetry Test Utilities
//!
//! Shared test utilities for the telemetry service.
//!
//! This crate provides:
//! - Server test harness (`TestTelemetryServer` for E2E tests)
//! - Consumer-aware gRPC clients (`ConsumerInterceptor`, `biz_client`, `admin_client`)
//! - Stream helpers with timeouts (`next_within`, `assert_quiet`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use telemetry_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<(), anyhow::Error> {
//!     let server = TestTelemetryServer::spawn(DEFAULT_TEST_ACL).await?;
//!     let mut admin = admin_client(&server.url(), "logger").await?;
//!     let mut events = admin.logging(Nothing::default()).await?.into_inner();
//!
//!     biz_client(&server.url(), "biz_user").await?.add(Nothing::default()).await?;
//!
//!     let event = next_within(&mut events, Duration::from_secs(1)).await;
//!     assert_eq!(event.map(|e| e.method), Some("/telemetry.Biz/Add".to_string()));
//!     server.shutdown().await
//! }
//! ```

pub mod consumer_client;
pub mod server_harness;

// Re-export commonly used items
pub use consumer_client::*;
pub use server_harness::*;
