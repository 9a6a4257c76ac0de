//! Frame codec for the m2mlink session protocol.
//!
//! Every frame starts with a one-byte type. The type alone decides how the
//! rest of the header looks:
//! - below `specialized_max`: one payload byte, two bytes in total
//! - below `one_byte_sized_max`: a one-byte payload length
//! - otherwise: a big-endian two-byte payload length
//!
//! [`FrameReader`] assembles frames from a blocking stream and survives read
//! timeouts mid-frame. [`FrameWriter`] writes whole frames.

pub mod codec;
pub mod error;
pub mod reader;
pub mod types;
pub mod writer;

pub use codec::{
    decode_frame, encode_frame, encode_with_class, header_width, ident_frame, total_length, Frame,
    FrameConfig, FrameLayout, SizeClass, DEFAULT_ONE_BYTE_SIZED_MAX, DEFAULT_SPECIALIZED_MAX,
    MAX_HEADER_SIZE,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use types::{
    type_name, ACK_REQUEST, ACK_RESPONSE, DATA, DATA_ARRAY, DATA_ARRAY_LARGE, DATA_LARGE, IDENT,
    IDENT_RESULT, NAMED_CHANNEL,
};
pub use writer::FrameWriter;
