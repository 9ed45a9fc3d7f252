use bytes::{Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Result of advancing a [`FrameSplitter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    /// The next frame. Never longer than the splitter's frame size.
    Frame(Bytes),
    /// The source payload has been fully consumed.
    Exhausted,
}

/// Lazily splits one payload into consecutive frames.
///
/// Each call to [`FrameSplitter::next_chunk`] advances a cursor over the
/// payload. Once the payload is consumed every further call yields
/// [`Chunk::Exhausted`]; a splitter cannot be rewound.
#[derive(Debug)]
pub struct FrameSplitter {
    payload: Bytes,
    frame_size: usize,
    cursor: usize,
}

impl FrameSplitter {
    /// Create a splitter over `payload` emitting frames of at most `frame_size` bytes.
    pub fn new(payload: impl Into<Bytes>, frame_size: usize) -> Result<Self> {
        if frame_size == 0 {
            return Err(FrameError::InvalidFrameSize(frame_size));
        }
        Ok(Self {
            payload: payload.into(),
            frame_size,
            cursor: 0,
        })
    }

    /// Advance to the next frame.
    pub fn next_chunk(&mut self) -> Chunk {
        if self.cursor >= self.payload.len() {
            return Chunk::Exhausted;
        }

        let end = self
            .cursor
            .saturating_add(self.frame_size)
            .min(self.payload.len());
        let frame = self.payload.slice(self.cursor..end);
        self.cursor = end;
        Chunk::Frame(frame)
    }

    /// True once every byte of the payload has been handed out.
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.payload.len()
    }

    /// Bytes not yet emitted.
    pub fn remaining(&self) -> usize {
        self.payload.len() - self.cursor
    }

    /// Maximum frame size in bytes.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Total number of frames this payload splits into.
    pub fn frame_count(&self) -> usize {
        self.payload.len().div_ceil(self.frame_size)
    }

    /// Total payload length in bytes.
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}

impl Iterator for FrameSplitter {
    type Item = Bytes;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_chunk() {
            Chunk::Frame(frame) => Some(frame),
            Chunk::Exhausted => None,
        }
    }
}

/// Split `payload` into frames of at most `frame_size` bytes.
///
/// Fails fast with [`FrameError::InvalidFrameSize`] when `frame_size` is zero.
pub fn split(payload: impl Into<Bytes>, frame_size: usize) -> Result<FrameSplitter> {
    FrameSplitter::new(payload, frame_size)
}

/// Collects frames back into the original payload.
#[derive(Debug)]
pub struct FrameAssembler {
    buf: BytesMut,
    max_frame_size: usize,
    frames: usize,
}

impl FrameAssembler {
    /// Create an assembler that rejects frames longer than `max_frame_size`.
    pub fn new(max_frame_size: usize) -> Result<Self> {
        if max_frame_size == 0 {
            return Err(FrameError::InvalidFrameSize(max_frame_size));
        }
        Ok(Self {
            buf: BytesMut::new(),
            max_frame_size,
            frames: 0,
        })
    }

    /// Append the next frame in order.
    pub fn push(&mut self, frame: &[u8]) -> Result<()> {
        if frame.len() > self.max_frame_size {
            return Err(FrameError::FrameTooLarge {
                size: frame.len(),
                max: self.max_frame_size,
            });
        }
        self.buf.extend_from_slice(frame);
        self.frames += 1;
        Ok(())
    }

    /// Number of frames appended so far.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Number of payload bytes collected so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True if nothing has been collected.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Finish the transfer and return the payload.
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Concatenate frames without a size check.
pub fn reassemble<I, B>(frames: I) -> Bytes
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let mut buf = BytesMut::new();
    for frame in frames {
        buf.extend_from_slice(frame.as_ref());
    }
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn splits_into_bounded_frames_in_order() {
        let mut splitter = split(Bytes::from_static(b"{\"ssids\":[\"a\"]}"), 8).unwrap();
        assert_eq!(splitter.frame_count(), 2);

        assert_eq!(
            splitter.next_chunk(),
            Chunk::Frame(Bytes::from_static(b"{\"ssids\""))
        );
        assert_eq!(
            splitter.next_chunk(),
            Chunk::Frame(Bytes::from_static(b":[\"a\"]}"))
        );
        assert_eq!(splitter.next_chunk(), Chunk::Exhausted);
        assert!(splitter.is_exhausted());
    }

    #[test]
    fn exhausted_is_sticky() {
        let mut splitter = split(Bytes::from_static(b"abc"), 20).unwrap();
        assert!(matches!(splitter.next_chunk(), Chunk::Frame(_)));
        assert_eq!(splitter.next_chunk(), Chunk::Exhausted);
        assert_eq!(splitter.next_chunk(), Chunk::Exhausted);
        assert_eq!(splitter.remaining(), 0);
    }

    #[test]
    fn empty_payload_is_immediately_exhausted() {
        let mut splitter = split(Bytes::new(), 8).unwrap();
        assert_eq!(splitter.frame_count(), 0);
        assert_eq!(splitter.next_chunk(), Chunk::Exhausted);
    }

    #[test]
    fn exact_multiple_has_no_trailing_empty_frame() {
        let frames: Vec<Bytes> = split(vec![7u8; 16], 8).unwrap().collect();
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.len() == 8));
    }

    #[test]
    fn zero_frame_size_fails_fast() {
        assert!(matches!(
            split(Bytes::from_static(b"x"), 0),
            Err(FrameError::InvalidFrameSize(0))
        ));
        assert!(matches!(
            FrameAssembler::new(0),
            Err(FrameError::InvalidFrameSize(0))
        ));
    }

    #[test]
    fn assembler_rejects_oversized_frame() {
        let mut assembler = FrameAssembler::new(8).unwrap();
        assembler.push(b"12345678").unwrap();
        let err = assembler.push(b"123456789").unwrap_err();
        assert!(matches!(err, FrameError::FrameTooLarge { size: 9, max: 8 }));
        assert_eq!(assembler.frames(), 1);
        assert_eq!(assembler.finish().as_ref(), b"12345678");
    }

    #[test]
    fn reassemble_concatenates() {
        let out = reassemble([&b"ab"[..], &b"cd"[..], &b"e"[..]]);
        assert_eq!(out.as_ref(), b"abcde");
    }

    proptest! {
        #[test]
        fn split_then_reassemble_reproduces_payload(
            payload in proptest::collection::vec(any::<u8>(), 0..512),
            frame_size in 1usize..64,
        ) {
            let splitter = split(payload.clone(), frame_size).unwrap();
            let expected_frames = splitter.frame_count();

            let mut assembler = FrameAssembler::new(frame_size).unwrap();
            for frame in splitter {
                prop_assert!(frame.len() <= frame_size);
                prop_assert!(!frame.is_empty());
                assembler.push(&frame).unwrap();
            }

            prop_assert_eq!(assembler.frames(), expected_frames);
            let finished = assembler.finish();
            prop_assert_eq!(finished.as_ref(), payload.as_slice());
        }
    }
}
