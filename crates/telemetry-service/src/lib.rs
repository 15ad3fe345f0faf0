//! Telemetry Service Library
//!
//! An access-controlled gRPC service that reports on its own traffic:
//!
//! - Every call is authorized against a static consumer ACL
//! - Each authorized call is broadcast as an event to all `Logging` streams
//! - `Statistics` streams receive per-interval call counts by consumer and
//!   by operation
//! - Shutdown cancels every stream and waits for all serving tasks
//!
//! # Architecture
//!
//! ```text
//! TelemetryServer
//! ├── AccessLayer (authorize, publish)
//! ├── BizService (Check, Add, Test)
//! ├── AdminService (Logging, Statistics)
//! └── Registry
//!     ├── log subscribers (bounded inbox + serving task each)
//!     └── stat aggregators (counters + flusher task each)
//! ```
//!
//! # Modules
//!
//! - [`acl`] - ACL parsing and wildcard expansion
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types with gRPC status mapping
//! - [`fanout`] - Subscriber registry, log streams and statistics
//! - [`grpc`] - Access layer and service handlers
//! - [`observability`] - Metrics and health endpoints
//! - [`server`] - Server assembly and shutdown

pub mod acl;
pub mod config;
pub mod errors;
pub mod fanout;
pub mod grpc;
pub mod observability;
pub mod server;

pub use server::{ServerHandle, TelemetryServer};
