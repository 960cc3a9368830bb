//! Decoder for inbound desk notification frames.
//!
//! Wire format:
//! ```text
//! [0x9D][event type:1][...][payload at fixed offsets...]
//! ```
//! Frames are at least 11 bytes. Heights are 12-bit values packed big-endian
//! across two bytes: the low nibble of the first byte is the high part, the
//! second byte is the low part.
//!
//! Decoding is a pure translation from bytes to a [`DeskEvent`]; it never
//! touches desk state. A malformed frame is rejected with [`FrameError`] and
//! simply dropped by the caller – the link itself is unaffected.

use thiserror::Error;

/// First byte of every valid notification frame.
pub const NOTIFICATION_HEADER: u8 = 0x9D;

/// Minimum length of a decodable notification frame.
pub const MIN_NOTIFICATION_LEN: usize = 11;

/// Event type byte for a limits (init response) frame.
pub const EVENT_TYPE_LIMITS: u8 = 0x00;

/// Event type byte for a height update frame.
pub const EVENT_TYPE_HEIGHT: u8 = 0x01;

/// Errors produced when an inbound buffer cannot be decoded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The buffer is shorter than the minimum frame length.
    #[error("notification too short: need at least {MIN_NOTIFICATION_LEN} bytes, got {actual}")]
    TooShort { actual: usize },

    /// The first byte is not the notification header.
    #[error("bad notification header: expected 0x9D, got 0x{actual:02X}")]
    BadHeader { actual: u8 },
}

/// A decoded desk notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeskEvent {
    /// Height limits, sent by the desk in response to the init frame.
    LimitsUpdated { min_mm: u16, max_mm: u16 },
    /// Current height, pushed continuously while the desk moves.
    HeightUpdated { height_mm: u16 },
    /// A structurally valid frame whose event type is not understood.
    ///
    /// Not an error: it carries no state change but is surfaced so the link
    /// layer can log it for protocol observability.
    Unrecognized { event_type: u8 },
}

/// Unpacks a 12-bit big-endian value: low nibble of `hi` is the high part.
fn unpack12(hi: u8, lo: u8) -> u16 {
    (lo as u16) | (((hi & 0x0F) as u16) << 8)
}

/// Decodes one notification buffer into a [`DeskEvent`].
///
/// # Errors
///
/// Returns [`FrameError`] if the buffer is shorter than
/// [`MIN_NOTIFICATION_LEN`] bytes or does not start with
/// [`NOTIFICATION_HEADER`].
pub fn decode_notification(buf: &[u8]) -> Result<DeskEvent, FrameError> {
    if buf.len() < MIN_NOTIFICATION_LEN {
        return Err(FrameError::TooShort { actual: buf.len() });
    }
    if buf[0] != NOTIFICATION_HEADER {
        return Err(FrameError::BadHeader { actual: buf[0] });
    }

    match buf[1] {
        EVENT_TYPE_LIMITS => Ok(DeskEvent::LimitsUpdated {
            min_mm: unpack12(buf[6], buf[7]),
            max_mm: unpack12(buf[8], buf[9]),
        }),
        EVENT_TYPE_HEIGHT => Ok(DeskEvent::HeightUpdated {
            height_mm: unpack12(buf[6], buf[7]),
        }),
        other => Ok(DeskEvent::Unrecognized { event_type: other }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_height_update() {
        // 0x01 0x2C = 300 mm at offsets 6–7.
        let buf = [0x9D, 0x01, 0, 0, 0, 0, 0x01, 0x2C, 0, 0, 0];
        assert_eq!(
            decode_notification(&buf),
            Ok(DeskEvent::HeightUpdated { height_mm: 300 })
        );
    }

    #[test]
    fn test_decode_height_masks_high_nibble() {
        // Only the low nibble of byte 6 contributes to the height.
        let buf = [0x9D, 0x01, 0, 0, 0, 0, 0xF4, 0xC4, 0, 0, 0];
        assert_eq!(
            decode_notification(&buf),
            Ok(DeskEvent::HeightUpdated { height_mm: 0x4C4 })
        );
    }

    #[test]
    fn test_decode_limits_update() {
        // min = 0x02D0 = 720 mm, max = 0x04C4 = 1220 mm.
        let buf = [0x9D, 0x00, 0, 0, 0, 0, 0x02, 0xD0, 0x04, 0xC4, 0];
        assert_eq!(
            decode_notification(&buf),
            Ok(DeskEvent::LimitsUpdated {
                min_mm: 720,
                max_mm: 1220
            })
        );
    }

    #[test]
    fn test_decode_unknown_event_type_is_surfaced_not_rejected() {
        let buf = [0x9D, 0x7E, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(
            decode_notification(&buf),
            Ok(DeskEvent::Unrecognized { event_type: 0x7E })
        );
    }

    #[test]
    fn test_decode_rejects_short_buffer() {
        let buf = [0x9D, 0x01, 0, 0, 0];
        assert_eq!(
            decode_notification(&buf),
            Err(FrameError::TooShort { actual: 5 })
        );
    }

    #[test]
    fn test_decode_rejects_empty_buffer() {
        assert_eq!(
            decode_notification(&[]),
            Err(FrameError::TooShort { actual: 0 })
        );
    }

    #[test]
    fn test_decode_rejects_wrong_header() {
        let buf = [0x00, 0x01, 0, 0, 0, 0, 0x01, 0x2C, 0, 0, 0];
        assert_eq!(
            decode_notification(&buf),
            Err(FrameError::BadHeader { actual: 0x00 })
        );
    }

    #[test]
    fn test_decode_accepts_exactly_minimum_length() {
        let buf = [0x9D, 0x01, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert!(decode_notification(&buf).is_ok());
        assert_eq!(buf.len(), MIN_NOTIFICATION_LEN);
    }

    #[test]
    fn test_decode_accepts_longer_frames() {
        // Real desks pad frames past the minimum; trailing bytes are ignored.
        let mut buf = vec![0x9D, 0x01, 0, 0, 0, 0, 0x03, 0x20, 0, 0, 0];
        buf.extend_from_slice(&[0xAA; 6]);
        assert_eq!(
            decode_notification(&buf),
            Ok(DeskEvent::HeightUpdated { height_mm: 0x320 })
        );
    }
}
