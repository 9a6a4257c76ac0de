use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::types::IDENT;

/// Default upper bound (exclusive) of the specialized type range.
pub const DEFAULT_SPECIALIZED_MAX: u8 = 0x20;

/// Default upper bound (exclusive) of the 1-byte-sized type range.
pub const DEFAULT_ONE_BYTE_SIZED_MAX: u8 = 0x41;

/// Largest header any size class uses: type + 2-byte length.
pub const MAX_HEADER_SIZE: usize = 3;

/// How a frame's length is encoded, selected by its type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizeClass {
    /// Fixed two bytes on the wire: type + one payload byte.
    Specialized,
    /// Type + 1-byte length + payload (0 to 255 bytes).
    OneByteSized,
    /// Type + 2-byte big-endian length + payload (0 to 65535 bytes).
    TwoBytesSized,
}

impl SizeClass {
    /// Bytes that must be read before the total frame length is known.
    pub const fn header_width(self) -> usize {
        match self {
            SizeClass::Specialized => 1,
            SizeClass::OneByteSized => 2,
            SizeClass::TwoBytesSized => 3,
        }
    }

    /// Largest payload the class can describe.
    pub const fn max_payload(self) -> usize {
        match self {
            SizeClass::Specialized => 1,
            SizeClass::OneByteSized => u8::MAX as usize,
            SizeClass::TwoBytesSized => u16::MAX as usize,
        }
    }
}

/// Type-byte thresholds that partition 0..=255 into the three size classes.
///
/// ```text
/// 0x00 ──── specialized_max ──── one_byte_sized_max ──── 0xFF
///   Specialized  │   OneByteSized      │   TwoBytesSized
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    specialized_max: u8,
    one_byte_sized_max: u8,
}

impl FrameLayout {
    /// Build a layout, rejecting inverted thresholds.
    pub fn new(specialized_max: u8, one_byte_sized_max: u8) -> Result<Self> {
        if specialized_max > one_byte_sized_max {
            return Err(FrameError::InvalidLayout {
                specialized_max,
                one_byte_sized_max,
            });
        }
        Ok(Self {
            specialized_max,
            one_byte_sized_max,
        })
    }

    /// Classify a type byte. Total over every `u8`.
    pub fn classify(&self, frame_type: u8) -> SizeClass {
        if frame_type < self.specialized_max {
            SizeClass::Specialized
        } else if frame_type < self.one_byte_sized_max {
            SizeClass::OneByteSized
        } else {
            SizeClass::TwoBytesSized
        }
    }

    pub fn specialized_max(&self) -> u8 {
        self.specialized_max
    }

    pub fn one_byte_sized_max(&self) -> u8 {
        self.one_byte_sized_max
    }
}

impl Default for FrameLayout {
    fn default() -> Self {
        Self {
            specialized_max: DEFAULT_SPECIALIZED_MAX,
            one_byte_sized_max: DEFAULT_ONE_BYTE_SIZED_MAX,
        }
    }
}

/// Header bytes to read before the frame size is known.
pub fn header_width(class: SizeClass) -> usize {
    class.header_width()
}

/// Total wire length of a frame, given its class and header bytes.
///
/// Returns `None` while `header` is shorter than [`header_width`].
pub fn total_length(class: SizeClass, header: &[u8]) -> Option<usize> {
    if header.len() < class.header_width() {
        return None;
    }
    let total = match class {
        SizeClass::Specialized => 2,
        SizeClass::OneByteSized => header[1] as usize + 2,
        SizeClass::TwoBytesSized => u16::from_be_bytes([header[1], header[2]]) as usize + 3,
    };
    Some(total)
}

/// A complete frame as it appeared on the wire.
///
/// The whole wire image is kept so the protocol layer sees exactly the
/// bytes that arrived, header included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    class: SizeClass,
    wire: Bytes,
}

impl Frame {
    /// Build a frame from its type and payload, validating the payload size.
    pub fn new(layout: &FrameLayout, frame_type: u8, payload: &[u8]) -> Result<Self> {
        let class = layout.classify(frame_type);
        let mut buf = BytesMut::with_capacity(class.header_width() + payload.len());
        encode_with_class(frame_type, class, payload, &mut buf)?;
        Ok(Self {
            class,
            wire: buf.freeze(),
        })
    }

    /// The identification frame for `client_id`.
    ///
    /// Always 1-byte sized, whatever the layout says about [`IDENT`].
    pub fn ident(client_id: &str) -> Result<Self> {
        let mut buf = BytesMut::with_capacity(client_id.len() + 2);
        encode_with_class(
            IDENT,
            SizeClass::OneByteSized,
            client_id.as_bytes(),
            &mut buf,
        )?;
        Ok(Self {
            class: SizeClass::OneByteSized,
            wire: buf.freeze(),
        })
    }

    /// Wrap an already-assembled wire image.
    pub(crate) fn from_wire(class: SizeClass, wire: Bytes) -> Self {
        Self { class, wire }
    }

    /// The type byte.
    pub fn frame_type(&self) -> u8 {
        self.wire[0]
    }

    /// Size class the type byte selected.
    pub fn class(&self) -> SizeClass {
        self.class
    }

    /// Payload bytes (after the length header).
    pub fn payload(&self) -> &[u8] {
        &self.wire[self.class.header_width()..]
    }

    /// The complete frame as sent on the wire.
    pub fn wire(&self) -> &Bytes {
        &self.wire
    }

    /// Total wire size of this frame.
    pub fn wire_size(&self) -> usize {
        self.wire.len()
    }
}

/// Encode a frame into the wire format, selecting the size class from `layout`.
///
/// Wire format:
/// ```text
/// ┌──────────┬──────────────────────┬──────────────────┐
/// │ Type (1) │ Length (0 / 1 / 2 BE)│ Payload          │
/// └──────────┴──────────────────────┴──────────────────┘
/// ```
pub fn encode_frame(
    layout: &FrameLayout,
    frame_type: u8,
    payload: &[u8],
    dst: &mut BytesMut,
) -> Result<()> {
    encode_with_class(frame_type, layout.classify(frame_type), payload, dst)
}

/// Encode with an explicit size class, bypassing classification.
pub fn encode_with_class(
    frame_type: u8,
    class: SizeClass,
    payload: &[u8],
    dst: &mut BytesMut,
) -> Result<()> {
    match class {
        SizeClass::Specialized if payload.len() != 1 => {
            return Err(FrameError::SpecializedPayload {
                frame_type,
                len: payload.len(),
            });
        }
        _ if payload.len() > class.max_payload() => {
            return Err(FrameError::PayloadTooLarge {
                class,
                size: payload.len(),
                max: class.max_payload(),
            });
        }
        _ => {}
    }

    dst.reserve(class.header_width() + payload.len());
    dst.put_u8(frame_type);
    match class {
        SizeClass::Specialized => {}
        SizeClass::OneByteSized => dst.put_u8(payload.len() as u8),
        SizeClass::TwoBytesSized => dst.put_u16(payload.len() as u16),
    }
    dst.put_slice(payload);
    Ok(())
}

/// Build the identification frame sent right after the socket opens.
///
/// Always 1-byte sized: `[IDENT, len, client_id...]`.
pub fn ident_frame(client_id: &str) -> Result<Bytes> {
    Frame::ident(client_id).map(|frame| frame.wire)
}

/// Decode a frame from a buffer.
///
/// Returns `None` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, layout: &FrameLayout) -> Option<Frame> {
    let frame_type = *src.first()?;
    let class = layout.classify(frame_type);
    let total = total_length(class, &src[..])?;
    if src.len() < total {
        return None;
    }
    Some(Frame::from_wire(class, src.split_to(total).freeze()))
}

/// Configuration for the frame reader/writer.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Type-byte thresholds.
    pub layout: FrameLayout,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            layout: FrameLayout::default(),
            read_timeout: None,
            write_timeout: None,
        }
    }
}
