//! Test server harness for E2E testing
//!
//! Provides `TestTelemetryServer` for spawning real telemetry server
//! instances on a loopback port.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use telemetry_service::config::Config;
use telemetry_service::fanout::Registry;
use telemetry_service::{ServerHandle, TelemetryServer};

/// ACL used by most integration tests.
///
/// - `logger` may open `Logging`
/// - `stat` may open `Statistics`
/// - `biz_user` may call `Check` and `Add`
/// - `biz_admin` may call every `Biz` method
/// - `ops` may call everything
pub const DEFAULT_TEST_ACL: &str = r#"{
    "logger": ["/telemetry.Admin/Logging"],
    "stat": ["/telemetry.Admin/Statistics"],
    "biz_user": ["/telemetry.Biz/Check", "/telemetry.Biz/Add"],
    "biz_admin": ["/telemetry.Biz/*"],
    "ops": ["/telemetry.Admin/*", "/telemetry.Biz/*"]
}"#;

/// Test harness for spawning the telemetry server in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_check_allowed() -> Result<(), anyhow::Error> {
///     let server = TestTelemetryServer::spawn(DEFAULT_TEST_ACL).await?;
///     let mut biz = biz_client(&server.url(), "biz_user").await?;
///
///     biz.check(Nothing::default()).await?;
///
///     server.shutdown().await
/// }
/// ```
pub struct TestTelemetryServer {
    addr: SocketAddr,
    config: Config,
    handle: Option<ServerHandle>,
}

impl TestTelemetryServer {
    /// Spawn a server on 127.0.0.1 with a random port and the given ACL.
    pub async fn spawn(acl_json: &str) -> Result<Self, anyhow::Error> {
        Self::spawn_with_vars(acl_json, &[]).await
    }

    /// Spawn with extra `TELEMETRY_*` environment values.
    pub async fn spawn_with_vars(
        acl_json: &str,
        extra: &[(&str, &str)],
    ) -> Result<Self, anyhow::Error> {
        let mut vars = HashMap::from([
            ("TELEMETRY_ACL".to_string(), acl_json.to_string()),
            (
                "TELEMETRY_GRPC_BIND_ADDRESS".to_string(),
                "127.0.0.1:0".to_string(),
            ),
        ]);
        for (key, value) in extra {
            vars.insert((*key).to_string(), (*value).to_string());
        }

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let handle = TelemetryServer::new(config.clone())
            .start()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to start test server: {}", e))?;

        Ok(Self {
            addr: handle.local_addr(),
            config,
            handle: Some(handle),
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the server's subscriber registry.
    pub fn registry(&self) -> Arc<Registry> {
        match &self.handle {
            Some(handle) => Arc::clone(handle.registry()),
            None => panic!("registry() called after shutdown"),
        }
    }

    /// Shut the server down and wait for it to stop.
    pub async fn shutdown(mut self) -> Result<(), anyhow::Error> {
        if let Some(handle) = self.handle.take() {
            handle
                .shutdown()
                .await
                .map_err(|e| anyhow::anyhow!("Shutdown failed: {}", e))?;
        }
        Ok(())
    }
}

impl Drop for TestTelemetryServer {
    fn drop(&mut self) {
        // Tests that never call shutdown() still stop their subscribers.
        if let Some(handle) = self.handle.take() {
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(async move {
                    let _ = handle.shutdown().await;
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_server_spawns_on_loopback() -> Result<(), anyhow::Error> {
        let server = TestTelemetryServer::spawn(DEFAULT_TEST_ACL).await?;

        let addr = server.addr();
        assert!(addr.ip().is_loopback());
        assert!(addr.port() > 0);
        assert_eq!(server.url(), format!("http://{}", addr));
        assert_eq!(server.config().acl.len(), 5);

        server.shutdown().await
    }

    #[tokio::test]
    async fn test_invalid_acl_fails_to_spawn() {
        let result = TestTelemetryServer::spawn("not json").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_extra_vars_are_applied() -> Result<(), anyhow::Error> {
        let server = TestTelemetryServer::spawn_with_vars(
            DEFAULT_TEST_ACL,
            &[("TELEMETRY_SUBSCRIBER_BUFFER", "4")],
        )
        .await?;

        assert_eq!(server.config().subscriber_buffer, 4);
        server.shutdown().await
    }
}
