use std::time::Duration;

/// Errors that end one telemetry session attempt.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// No endpoint is configured for the current environment.
    #[error("no telemetry endpoint for environment {0}")]
    NoEndpoint(String),

    /// An endpoint string could not be parsed.
    #[error("invalid endpoint '{0}' (expected ws://host[:port])")]
    InvalidEndpoint(String),

    /// A `wss://` endpoint was given; only plain `ws://` is dialed.
    #[error("TLS endpoint '{0}' is not supported (expected ws://host[:port])")]
    TlsUnsupported(String),

    /// Dialing the endpoint failed.
    #[error("connect to {url} failed: {reason}")]
    Connect { url: String, reason: String },

    /// Dialing the endpoint did not finish in time.
    #[error("connect to {url} timed out after {timeout:?}")]
    ConnectTimeout { url: String, timeout: Duration },

    /// Writing to the socket failed.
    #[error("send failed: {0}")]
    Send(String),

    /// Reading from the socket failed.
    #[error("receive failed: {0}")]
    Receive(String),

    /// The remote end closed the socket.
    #[error("connection closed by peer")]
    Closed,

    /// JSON serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Store error.
    #[error("device error: {0}")]
    Device(#[from] shc_device::DeviceError),
}

pub type Result<T> = std::result::Result<T, TelemetryError>;
