use crate::codec::SizeClass;

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload does not fit the length field of its size class.
    #[error("payload too large for {class:?} frame ({size} bytes, max {max})")]
    PayloadTooLarge {
        class: SizeClass,
        size: usize,
        max: usize,
    },

    /// Specialized frames carry exactly one payload byte.
    #[error("specialized frame type 0x{frame_type:02x} needs a 1-byte payload, got {len}")]
    SpecializedPayload { frame_type: u8, len: usize },

    /// The size-class thresholds are inverted.
    #[error("invalid frame layout: specialized_max 0x{specialized_max:02x} exceeds one_byte_sized_max 0x{one_byte_sized_max:02x}")]
    InvalidLayout {
        specialized_max: u8,
        one_byte_sized_max: u8,
    },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
