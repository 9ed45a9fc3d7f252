//! Telemetry reporting session.
//!
//! Keeps one persistent socket open to the endpoint selected by the
//! device's provisioned environment and pushes a [`TelemetrySample`] on a
//! fixed cadence. Connection loss is never fatal: the session is rebuilt
//! from scratch until the caller cancels it.

pub mod endpoint;
pub mod error;
pub mod link;
pub mod sample;
pub mod session;

pub use endpoint::{
    CadenceTable, Endpoint, EndpointTable, DEVELOPMENT_HOST, PRODUCTION_HOST, TELEMETRY_PATH,
};
pub use error::{Result, TelemetryError};
pub use link::{LinkConnector, LinkReceiver, LinkSender, WsConnector};
pub use sample::TelemetrySample;
pub use session::{SessionExit, SessionState, TelemetryConfig, TelemetrySession};
