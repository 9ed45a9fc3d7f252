//! Home automation bridge.
//!
//! shc-bridge exposes local device state and provisioning over a short-range
//! radio link, and streams telemetry to a remote endpoint over a persistent
//! socket.
//!
//! # Crate Structure
//!
//! - [`frame`]: Fixed-size frame chunking and the relay envelope codec
//! - [`transport`]: Local relay socket to the radio daemon
//! - [`device`]: Provisioning store, environment, and hardware commands
//! - [`peripheral`]: Request gates, streaming channels, and the peripheral service
//! - [`telemetry`]: Reconnecting telemetry session

/// Re-export frame types.
pub mod frame {
    pub use shc_frame::*;
}

/// Re-export transport types.
pub mod transport {
    pub use shc_transport::*;
}

/// Re-export device types.
pub mod device {
    pub use shc_device::*;
}

/// Re-export peripheral types.
pub mod peripheral {
    pub use shc_peripheral::*;
}

/// Re-export telemetry types.
pub mod telemetry {
    pub use shc_telemetry::*;
}
