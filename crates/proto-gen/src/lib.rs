//! Generated Protocol Buffer code for the telemetry fan-out service.
//!
//! This crate contains the compiled `telemetry` package: the `Biz` and
//! `Admin` gRPC services plus their message types.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)] // Generated code has various doc formatting

// Re-export prost traits for convenience
pub use prost::Message;

// Generated protobuf module
pub mod telemetry {
    //! Business and admin service definitions
    tonic::include_proto!("telemetry");
}
