use std::time::Duration;

/// ATT status codes reported back to the radio daemon.
pub mod att {
    pub const SUCCESS: u8 = 0x00;
    pub const INVALID_HANDLE: u8 = 0x01;
    pub const READ_NOT_PERMITTED: u8 = 0x02;
    pub const WRITE_NOT_PERMITTED: u8 = 0x03;
    pub const REQUEST_NOT_SUPPORTED: u8 = 0x06;
    pub const UNLIKELY_ERROR: u8 = 0x0E;
    pub const VALUE_NOT_ALLOWED: u8 = 0x13;
}

/// Errors that can occur in peripheral operations.
#[derive(Debug, thiserror::Error)]
pub enum PeripheralError {
    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] shc_frame::FrameError),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] shc_transport::TransportError),

    /// Store or collector error.
    #[error("device error: {0}")]
    Device(#[from] shc_device::DeviceError),

    /// JSON serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// No attribute is registered at this handle.
    #[error("unknown handle 0x{0:04x}")]
    UnknownHandle(u16),

    /// The attribute does not support reads.
    #[error("handle 0x{0:04x} is not readable")]
    NotReadable(u16),

    /// The attribute does not support writes.
    #[error("handle 0x{0:04x} is not writable")]
    NotWritable(u16),

    /// The attribute does not support notifications.
    #[error("handle 0x{0:04x} does not support notifications")]
    NotSubscribable(u16),

    /// A written value failed validation. Stored state is unchanged.
    #[error("invalid {slot}: {reason}")]
    InvalidValue { slot: &'static str, reason: String },

    /// The relay peer sent an op that only the bridge may send.
    #[error("unexpected relay op {0}")]
    UnexpectedOp(&'static str),

    /// The collector did not finish in time.
    #[error("collection timed out after {0:?}")]
    CollectTimeout(Duration),

    /// The notification subscriber went away.
    #[error("notification sink closed")]
    SinkClosed,
}

impl PeripheralError {
    /// Status byte reported for this error on the relay link.
    pub fn att_status(&self) -> u8 {
        match self {
            PeripheralError::UnknownHandle(_) => att::INVALID_HANDLE,
            PeripheralError::NotReadable(_) => att::READ_NOT_PERMITTED,
            PeripheralError::NotWritable(_) => att::WRITE_NOT_PERMITTED,
            PeripheralError::NotSubscribable(_) | PeripheralError::UnexpectedOp(_) => {
                att::REQUEST_NOT_SUPPORTED
            }
            PeripheralError::InvalidValue { .. } => att::VALUE_NOT_ALLOWED,
            PeripheralError::Device(shc_device::DeviceError::InvalidEnvironment(_)) => {
                att::VALUE_NOT_ALLOWED
            }
            _ => att::UNLIKELY_ERROR,
        }
    }
}

pub type Result<T> = std::result::Result<T, PeripheralError>;
