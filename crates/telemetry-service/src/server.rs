//! gRPC server assembly and lifecycle.
//!
//! [`TelemetryServer`] wires the access layer, both services and the
//! fan-out registry onto one tonic server. [`ServerHandle::shutdown`]
//! drains subscribers first so open streams end, then stops the listener.

use crate::config::Config;
use crate::errors::TelemetryError;
use crate::fanout::Registry;
use crate::grpc::{AccessLayer, AdminService, BizService};
use proto_gen::telemetry::admin_server::AdminServer;
use proto_gen::telemetry::biz_server::BizServer;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Not-yet-started telemetry server.
pub struct TelemetryServer {
    config: Config,
}

impl TelemetryServer {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Bind `grpc_bind_address` and start serving.
    ///
    /// # Errors
    ///
    /// Returns `TelemetryError::Io` if the address cannot be bound.
    pub async fn start(self) -> Result<ServerHandle, TelemetryError> {
        let listener = TcpListener::bind(&self.config.grpc_bind_address)
            .await
            .map_err(|e| {
                error!(
                    target: "telemetry.server",
                    error = %e,
                    addr = %self.config.grpc_bind_address,
                    "Failed to bind gRPC listener"
                );
                e
            })?;
        self.serve(listener)
    }

    /// Start serving on an already bound listener.
    ///
    /// # Errors
    ///
    /// Returns `TelemetryError::Io` if the listener has no local address.
    pub fn serve(self, listener: TcpListener) -> Result<ServerHandle, TelemetryError> {
        let local_addr = listener.local_addr()?;
        let Config {
            acl,
            groups,
            subscriber_buffer,
            max_stat_interval_seconds,
            ..
        } = self.config;

        let registry = Arc::new(Registry::new(subscriber_buffer));
        let access_layer = AccessLayer::new(Arc::new(acl), Arc::new(groups), Arc::clone(&registry));
        let admin_service = AdminService::new(Arc::clone(&registry), max_stat_interval_seconds);

        let shutdown_token = CancellationToken::new();
        let server_token = shutdown_token.clone();
        let server = tonic::transport::Server::builder()
            .layer(access_layer)
            .add_service(BizServer::new(BizService::new()))
            .add_service(AdminServer::new(admin_service))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
                server_token.cancelled().await;
                info!(target: "telemetry.server", "gRPC server shutting down");
            });

        let serve_task = tokio::spawn(server);
        info!(target: "telemetry.server", addr = %local_addr, "gRPC server started");

        Ok(ServerHandle {
            local_addr,
            registry,
            shutdown_token,
            serve_task,
        })
    }
}

/// Running telemetry server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    registry: Arc<Registry>,
    shutdown_token: CancellationToken,
    serve_task: JoinHandle<Result<(), tonic::transport::Error>>,
}

impl ServerHandle {
    /// Address the gRPC listener is bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Stop every subscriber, then stop accepting calls.
    ///
    /// Returns once all serving tasks have exited and the listener is
    /// closed.
    ///
    /// # Errors
    ///
    /// Returns the transport error the server exited with, if any.
    pub async fn shutdown(self) -> Result<(), TelemetryError> {
        info!(target: "telemetry.shutdown", addr = %self.local_addr, "Shutting down");

        self.registry.shutdown().await;
        self.shutdown_token.cancel();

        match self.serve_task.await {
            Ok(result) => result?,
            Err(e) => return Err(TelemetryError::Io(std::io::Error::other(e))),
        }

        info!(target: "telemetry.shutdown", "Shutdown complete");
        Ok(())
    }
}
