//! Error types for bpmlink-core

/// Result type alias for bpmlink-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core protocol errors
///
/// Every variant describes a frame the session should ignore; none of them
/// is fatal to a connection.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Buffer is shorter than the minimum frame
    #[error("Frame too short: expected at least {expected} bytes, got {actual} bytes")]
    FrameTooShort {
        expected: usize,
        actual: usize,
    },

    /// Frame is not for the blood-pressure subsystem, or declares an impossible length
    #[error("Unsupported frame: param type 0x{param_type:02X}, declared length {declared_len}")]
    UnsupportedParam {
        param_type: u8,
        declared_len: u8,
    },

    /// CRC verification failed
    #[error("CRC mismatch: expected 0x{expected:04X}, received 0x{received:04X}")]
    CrcMismatch {
        expected: u16,
        received: u16,
    },

    /// Frame layout does not match its packet kind
    #[error("Malformed frame (packet 0x{packet_id:02X}): {reason}")]
    Malformed {
        packet_id: u8,
        reason: String,
    },

    /// Diagnostic input is not valid hex
    #[error("Invalid hex input: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Diagnostic input has no room for data plus a CRC
    #[error("Hex input too short: {actual} bytes (need at least {expected})")]
    HexTooShort {
        expected: usize,
        actual: usize,
    },
}

impl Error {
    /// Check if the error only means "drop this frame and keep reading"
    pub fn is_discardable(&self) -> bool {
        matches!(
            self,
            Self::FrameTooShort { .. }
                | Self::UnsupportedParam { .. }
                | Self::CrcMismatch { .. }
                | Self::Malformed { .. }
        )
    }

    pub(crate) fn malformed(packet_id: u8, reason: impl Into<String>) -> Self {
        Self::Malformed {
            packet_id,
            reason: reason.into(),
        }
    }
}
