//! gRPC surface of the telemetry service.
//!
//! - `access_layer` - consumer authorization and event publishing for every call
//! - `biz_service` - `telemetry.Biz` (Check, Add, Test)
//! - `admin_service` - `telemetry.Admin` (Logging, Statistics streams)
//!
//! ```text
//! client ──► AccessLayer ──┬──► BizService
//!              │           └──► AdminService ──attach──► Registry
//!              └──publish──► Registry
//! ```

pub mod access_layer;
pub mod admin_service;
pub mod biz_service;

pub use access_layer::{AccessLayer, AuthorizedConsumer, CONSUMER_METADATA_KEY};
pub use admin_service::AdminService;
pub use biz_service::BizService;
