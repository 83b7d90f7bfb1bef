//! Raw wire frame
//!
//! # Frame Structure
//!
//! ```text
//! ┌────────┬────────┬───────────┬────────────┬─────────────┬────────────┐
//! │ Marker │ Length │ Packet ID │ Param Type │   Payload   │   CRC16    │
//! │  0x5A  │ 1 byte │  1 byte   │    0xF2    │ Length-6 B  │ 2 bytes BE │
//! └────────┴────────┴───────────┴────────────┴─────────────┴────────────┘
//! ```
//!
//! `Length` counts the whole frame, marker and CRC included.

use std::fmt;

use bytes::Bytes;

use crate::{
    constants::MIN_FRAME_LEN,
    crc::CRC_LEN,
    error::{Error, Result},
};

const HEADER_LEN: usize = 4;

/// A raw frame as read off the line
///
/// Holding a `Frame` only guarantees the minimum size; marker, declared
/// length, parameter type and CRC are checked when it is decoded.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Bytes,
}

impl Frame {
    /// Wrap raw bytes
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameTooShort`] below the 6-byte minimum.
    pub fn new(bytes: impl Into<Bytes>) -> Result<Self> {
        let bytes = bytes.into();

        if bytes.len() < MIN_FRAME_LEN {
            return Err(Error::FrameTooShort {
                expected: MIN_FRAME_LEN,
                actual: bytes.len(),
            });
        }

        Ok(Self { bytes })
    }

    pub fn start_marker(&self) -> u8 {
        self.bytes[0]
    }

    /// Length byte as sent by the device
    pub fn declared_len(&self) -> u8 {
        self.bytes[1]
    }

    pub fn packet_id(&self) -> u8 {
        self.bytes[2]
    }

    pub fn param_type(&self) -> u8 {
        self.bytes[3]
    }

    /// Bytes between the header and the CRC
    pub fn payload(&self) -> &[u8] {
        &self.bytes[HEADER_LEN..self.bytes.len() - CRC_LEN]
    }

    /// Bytes covered by the CRC
    pub fn checked_region(&self) -> &[u8] {
        &self.bytes[..self.bytes.len() - CRC_LEN]
    }

    /// Trailing CRC field read big-endian
    pub fn crc_field(&self) -> u16 {
        let n = self.bytes.len();
        u16::from_be_bytes([self.bytes[n - 2], self.bytes[n - 1]])
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("packet_id", &format!("0x{:02X}", self.packet_id()))
            .field("declared_len", &self.declared_len())
            .field("bytes", &hex::encode_upper(&self.bytes))
            .finish()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Frame[0x{:02X}](len={})",
            self.packet_id(),
            self.bytes.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_accessors() {
        let frame = Frame::new(vec![0x5A, 0x08, 0x28, 0xF2, 0x00, 0x69, 0x5D, 0x85]).unwrap();

        assert_eq!(frame.start_marker(), 0x5A);
        assert_eq!(frame.declared_len(), 8);
        assert_eq!(frame.packet_id(), 0x28);
        assert_eq!(frame.param_type(), 0xF2);
        assert_eq!(frame.payload(), &[0x00, 0x69]);
        assert_eq!(frame.checked_region().len(), 6);
        assert_eq!(frame.crc_field(), 0x5D85);
    }

    #[test]
    fn test_frame_empty_payload() {
        let frame = Frame::new(vec![0x5A, 0x06, 0x21, 0xF2, 0x28, 0x6B]).unwrap();
        assert!(frame.payload().is_empty());
    }

    #[test]
    fn test_frame_too_short() {
        let result = Frame::new(vec![0x5A, 0x06, 0x21]);
        assert!(matches!(
            result,
            Err(Error::FrameTooShort { expected: 6, actual: 3 })
        ));
    }

    #[test]
    fn test_frame_debug_is_hex() {
        let frame = Frame::new(vec![0x5A, 0x06, 0x21, 0xF2, 0x28, 0x6B]).unwrap();
        assert!(format!("{:?}", frame).contains("5A0621F2286B"));
    }
}
