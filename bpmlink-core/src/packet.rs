//! Inbound packet decoding
//!
//! A [`Frame`] is validated (marker, parameter type, declared length, CRC)
//! and then decoded by packet id into a [`DecodedPacket`]. Decoding never
//! panics: every layout problem comes back as an [`Error`].

use std::fmt;

use byteorder::{BigEndian, ByteOrder};
use tracing::trace;

use bpmlink_types::{DeviceErrorCode, DeviceId, DeviceTimestamp, ExecutionStatus, Measurement};

use crate::{
    capability::Capabilities,
    constants::{min_len, packet_id, MIN_FRAME_LEN, PARAM_TYPE_BP, START_MARKER},
    crc,
    error::{Error, Result},
    frame::Frame,
};

/// A decoded device packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedPacket {
    /// Cuff pressure sample while a measurement is running
    RealtimePressure { mmhg: u16 },

    /// Final measurement
    MeasurementResult(Measurement),

    /// Answer to a get-ID request
    DeviceId(DeviceId),

    /// Acknowledgement of set-ID or a calibration command
    ExecutionResult {
        source_packet_id: u8,
        status: ExecutionStatus,
    },

    /// Measurement failure reported by the device
    ErrorReport(DeviceErrorCode),

    /// Valid frame with a packet id this session does not handle
    Unrecognized { packet_id: u8 },
}

impl DecodedPacket {
    /// Decode a frame with every packet kind enabled
    ///
    /// # Examples
    ///
    /// ```
    /// use bpmlink_core::{DecodedPacket, Frame};
    ///
    /// let frame = Frame::new(vec![0x5A, 0x08, 0x28, 0xF2, 0x00, 0x69, 0x5D, 0x85]).unwrap();
    /// let packet = DecodedPacket::decode(&frame).unwrap();
    ///
    /// assert_eq!(packet, DecodedPacket::RealtimePressure { mmhg: 105 });
    /// ```
    pub fn decode(frame: &Frame) -> Result<Self> {
        Self::decode_with(frame, Capabilities::all())
    }

    /// Decode a frame, treating packet kinds outside `caps` as unrecognized
    ///
    /// # Errors
    ///
    /// - [`Error::UnsupportedParam`] for a declared length under 6 or a
    ///   parameter type other than 0xF2
    /// - [`Error::Malformed`] for a bad start marker, a declared length that
    ///   disagrees with the frame size, or a payload too short for its layout
    /// - [`Error::CrcMismatch`] when the big-endian CRC does not match
    pub fn decode_with(frame: &Frame, caps: Capabilities) -> Result<Self> {
        let id = frame.packet_id();

        if frame.start_marker() != START_MARKER {
            return Err(Error::malformed(id, "missing start marker"));
        }

        let declared_len = frame.declared_len();
        let param_type = frame.param_type();

        if usize::from(declared_len) < MIN_FRAME_LEN || param_type != PARAM_TYPE_BP {
            return Err(Error::UnsupportedParam {
                param_type,
                declared_len,
            });
        }

        if usize::from(declared_len) != frame.len() {
            return Err(Error::malformed(
                id,
                format!("declared length {}, frame has {} bytes", declared_len, frame.len()),
            ));
        }

        let expected = crc::compute(frame.checked_region());
        let received = frame.crc_field();
        if expected != received {
            return Err(Error::CrcMismatch { expected, received });
        }

        trace!(
            packet_id = format!("0x{:02X}", id),
            frame = hex::encode_upper(frame.as_bytes()),
            "Decoding frame"
        );

        if !caps.allows_packet(id) {
            return Ok(Self::Unrecognized { packet_id: id });
        }

        let payload = frame.payload();
        let len = usize::from(declared_len);

        let packet = match id {
            packet_id::REALTIME if len >= min_len::REALTIME => Self::RealtimePressure {
                mmhg: read_u16(id, payload, 0)?,
            },
            packet_id::RESULT if len >= min_len::RESULT => {
                Self::MeasurementResult(decode_measurement(id, payload)?)
            }
            packet_id::GET_DEVICE_ID => Self::DeviceId(DeviceId::from_raw(payload.to_vec())),
            packet_id::SET_DEVICE_ID
            | packet_id::START_CALIBRATION
            | packet_id::SET_CALIBRATION_PRESSURE
            | packet_id::CANCEL_CALIBRATION => Self::ExecutionResult {
                source_packet_id: id,
                status: ExecutionStatus::from(status_byte(payload)),
            },
            packet_id::ERROR => Self::ErrorReport(DeviceErrorCode(status_byte(payload))),
            other => Self::Unrecognized { packet_id: other },
        };

        Ok(packet)
    }

    /// Packet id this value was decoded from
    pub fn packet_id(&self) -> u8 {
        match self {
            Self::RealtimePressure { .. } => packet_id::REALTIME,
            Self::MeasurementResult(_) => packet_id::RESULT,
            Self::DeviceId(_) => packet_id::GET_DEVICE_ID,
            Self::ExecutionResult {
                source_packet_id, ..
            } => *source_packet_id,
            Self::ErrorReport(_) => packet_id::ERROR,
            Self::Unrecognized { packet_id } => *packet_id,
        }
    }

    /// Check if this packet closes a realtime run
    pub fn ends_realtime(&self) -> bool {
        matches!(
            self,
            Self::MeasurementResult(_)
                | Self::DeviceId(_)
                | Self::ExecutionResult { .. }
                | Self::ErrorReport(_)
        )
    }
}

impl fmt::Display for DecodedPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RealtimePressure { mmhg } => write!(f, "realtime pressure {} mmHg", mmhg),
            Self::MeasurementResult(m) => write!(f, "result {}", m),
            Self::DeviceId(id) => write!(f, "device id '{}'", id),
            Self::ExecutionResult {
                source_packet_id,
                status,
            } => write!(f, "execution result for 0x{:02X}: {}", source_packet_id, status),
            Self::ErrorReport(code) => write!(f, "device error {}", code),
            Self::Unrecognized { packet_id } => write!(f, "unrecognized packet 0x{:02X}", packet_id),
        }
    }
}

fn read_u16(id: u8, payload: &[u8], offset: usize) -> Result<u16> {
    payload
        .get(offset..offset + 2)
        .map(BigEndian::read_u16)
        .ok_or_else(|| Error::malformed(id, format!("payload too short for u16 at offset {}", offset)))
}

fn read_u8(id: u8, payload: &[u8], offset: usize) -> Result<u8> {
    payload
        .get(offset)
        .copied()
        .ok_or_else(|| Error::malformed(id, format!("payload too short for u8 at offset {}", offset)))
}

fn status_byte(payload: &[u8]) -> u8 {
    payload
        .first()
        .copied()
        .unwrap_or(ExecutionStatus::MISSING)
}

fn decode_measurement(id: u8, payload: &[u8]) -> Result<Measurement> {
    let stamp = DeviceTimestamp::new(
        read_u16(id, payload, 8)?,
        read_u8(id, payload, 10)?,
        read_u8(id, payload, 11)?,
        read_u8(id, payload, 12)?,
        read_u8(id, payload, 13)?,
    );

    Ok(Measurement::new(
        read_u16(id, payload, 0)?,
        read_u16(id, payload, 2)?,
        read_u16(id, payload, 4)?,
        read_u16(id, payload, 6)?,
        stamp,
    ))
}
