//! Built-in frame types.
//!
//! The type byte doubles as the size selector: values below
//! `specialized_max` are fixed two-byte frames, values below
//! `one_byte_sized_max` carry a one-byte length, and the rest carry a
//! big-endian two-byte length (see [`crate::FrameLayout`]).
//!
//! Inbound and outbound directions share numbers for the session handshake
//! types, so `IDENT` (sent) and `IDENT_RESULT` (received) are both `0x01`.

/// Client → server: identification request carrying the client id.
///
/// Inbound numbering classifies `0x01` as specialized, but the outbound
/// IDENT frame carries a 1-byte length. Build it with
/// [`crate::Frame::ident`] or [`crate::ident_frame`]; encoding it through a
/// layout fails with `SpecializedPayload`.
pub const IDENT: u8 = 0x01;

/// Server → client: identification result (one status byte).
pub const IDENT_RESULT: u8 = 0x01;

/// Acknowledgment request (one sequence byte).
pub const ACK_REQUEST: u8 = 0x02;

/// Acknowledgment response (one sequence byte).
pub const ACK_RESPONSE: u8 = 0x03;

/// Named channel declaration (1-byte sized).
pub const NAMED_CHANNEL: u8 = 0x20;

/// Data on a named channel (1-byte sized).
pub const DATA: u8 = 0x21;

/// Data array on a named channel (1-byte sized).
pub const DATA_ARRAY: u8 = 0x22;

/// Data on a named channel (2-byte sized).
pub const DATA_LARGE: u8 = 0x41;

/// Data array on a named channel (2-byte sized).
pub const DATA_ARRAY_LARGE: u8 = 0x42;

/// Returns a human-readable name for an inbound frame type.
pub fn type_name(frame_type: u8) -> &'static str {
    match frame_type {
        IDENT_RESULT => "IDENT_RESULT",
        ACK_REQUEST => "ACK_REQUEST",
        ACK_RESPONSE => "ACK_RESPONSE",
        NAMED_CHANNEL => "NAMED_CHANNEL",
        DATA => "DATA",
        DATA_ARRAY => "DATA_ARRAY",
        DATA_LARGE => "DATA_LARGE",
        DATA_ARRAY_LARGE => "DATA_ARRAY_LARGE",
        _ => "UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{FrameLayout, SizeClass};

    #[test]
    fn builtin_types_fall_in_expected_classes() {
        let layout = FrameLayout::default();
        assert_eq!(layout.classify(IDENT_RESULT), SizeClass::Specialized);
        assert_eq!(layout.classify(ACK_REQUEST), SizeClass::Specialized);
        assert_eq!(layout.classify(ACK_RESPONSE), SizeClass::Specialized);
        assert_eq!(layout.classify(DATA), SizeClass::OneByteSized);
        assert_eq!(layout.classify(DATA_ARRAY), SizeClass::OneByteSized);
        assert_eq!(layout.classify(DATA_LARGE), SizeClass::TwoBytesSized);
        assert_eq!(layout.classify(DATA_ARRAY_LARGE), SizeClass::TwoBytesSized);
    }

    #[test]
    fn names() {
        assert_eq!(type_name(ACK_REQUEST), "ACK_REQUEST");
        assert_eq!(type_name(0xFE), "UNKNOWN");
    }
}
