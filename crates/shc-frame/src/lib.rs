//! Frame chunking for size-limited radio characteristics.
//!
//! Two wire concerns live here:
//! - [`chunk`] splits an arbitrary payload into frames no larger than a
//!   characteristic's notification limit and reassembles them. Frames carry
//!   no header; the end of a transfer is signalled out of band.
//! - [`codec`] is the length-prefixed envelope spoken on the local relay
//!   socket between the bridge and the radio daemon:
//!   - A 2-byte magic number ("SH") for stream synchronization
//!   - A 4-byte little-endian payload length
//!   - A 1-byte operation code
//!   - A 2-byte little-endian characteristic handle

pub mod channel;
pub mod chunk;
pub mod codec;
pub mod error;

pub use channel::{
    frame_size_name, COMPACT_FRAME_SIZE, DEFAULT_FRAME_SIZE, STANDARD_FRAME_SIZE,
};
pub use chunk::{reassemble, split, Chunk, FrameAssembler, FrameSplitter};
pub use codec::{
    decode_frame, encode_frame, Op, RelayCodec, RelayFrame, DEFAULT_MAX_PAYLOAD, HEADER_SIZE,
};
pub use error::{FrameError, Result};
