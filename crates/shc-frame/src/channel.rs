//! Per-characteristic frame sizes.
//!
//! The radio transport truncates any notification longer than the
//! characteristic's attribute limit without reporting an error, so every
//! streaming channel is bound to one of these sizes at construction.

/// Frame size for characteristics limited to 8-byte notifications.
pub const COMPACT_FRAME_SIZE: usize = 8;

/// Default ATT MTU (23) minus the 3-byte notification header.
pub const STANDARD_FRAME_SIZE: usize = 20;

/// Frame size used when a channel does not specify one.
pub const DEFAULT_FRAME_SIZE: usize = COMPACT_FRAME_SIZE;

/// Returns a human-readable label for a frame size.
pub fn frame_size_name(size: usize) -> &'static str {
    match size {
        COMPACT_FRAME_SIZE => "compact",
        STANDARD_FRAME_SIZE => "standard",
        _ => "custom",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size_name() {
        assert_eq!(frame_size_name(COMPACT_FRAME_SIZE), "compact");
        assert_eq!(frame_size_name(STANDARD_FRAME_SIZE), "standard");
        assert_eq!(frame_size_name(64), "custom");
    }
}
