/// Errors that can occur while chunking payloads or coding relay frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A splitter or assembler was configured with a zero frame size.
    #[error("frame size must be greater than zero (got {0})")]
    InvalidFrameSize(usize),

    /// A frame handed to the assembler exceeds the channel frame size.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The relay header contains an invalid magic number.
    #[error("invalid relay magic (expected 0x5348 \"SH\")")]
    InvalidMagic,

    /// The relay header carries an operation code this side does not know.
    #[error("unknown relay op 0x{0:02x}")]
    UnknownOp(u8),

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing relay frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
