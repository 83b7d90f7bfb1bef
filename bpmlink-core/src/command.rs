//! Outbound device commands

use std::fmt;

use bytes::{BufMut, BytesMut};
use tracing::trace;

use bpmlink_types::{DeviceId, DEVICE_ID_LEN};

use crate::{
    capability::Capabilities,
    constants::{packet_id, FRAME_OVERHEAD, PARAM_TYPE_BP, START_MARKER},
    crc,
};

/// Host-to-device commands
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    StartMeasurement,
    StopMeasurement,
    GetDeviceId,

    /// Store a new device ID (sent as exactly 12 ASCII bytes)
    SetDeviceId { id: String },

    /// Enter calibration, inflating to a pre-fill pressure
    StartCalibration { prefill_mmhg: u16 },

    /// Report the reference gauge reading during calibration
    SetCalibrationPressure { actual_mmhg: u16 },

    CancelCalibration,
}

impl Command {
    pub fn packet_id(&self) -> u8 {
        match self {
            Self::StartMeasurement => packet_id::START_MEASUREMENT,
            Self::StopMeasurement => packet_id::STOP_MEASUREMENT,
            Self::GetDeviceId => packet_id::GET_DEVICE_ID,
            Self::SetDeviceId { .. } => packet_id::SET_DEVICE_ID,
            Self::StartCalibration { .. } => packet_id::START_CALIBRATION,
            Self::SetCalibrationPressure { .. } => packet_id::SET_CALIBRATION_PRESSURE,
            Self::CancelCalibration => packet_id::CANCEL_CALIBRATION,
        }
    }

    /// Get command name
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartMeasurement => "START_MEASUREMENT",
            Self::StopMeasurement => "STOP_MEASUREMENT",
            Self::GetDeviceId => "GET_DEVICE_ID",
            Self::SetDeviceId { .. } => "SET_DEVICE_ID",
            Self::StartCalibration { .. } => "START_CALIBRATION",
            Self::SetCalibrationPressure { .. } => "SET_CALIBRATION_PRESSURE",
            Self::CancelCalibration => "CANCEL_CALIBRATION",
        }
    }

    /// Whether the answer has to arrive within the response timeout
    ///
    /// A started measurement streams realtime samples for as long as the
    /// cuff inflates, so its wait is open-ended.
    pub fn awaits_bounded_response(&self) -> bool {
        !matches!(self, Self::StartMeasurement)
    }

    /// Capability a session needs to send this command
    pub fn required_capability(&self) -> Capabilities {
        match self {
            Self::StartMeasurement | Self::StopMeasurement => Capabilities::MEASUREMENT,
            Self::GetDeviceId | Self::SetDeviceId { .. } => Capabilities::DEVICE_ID,
            Self::StartCalibration { .. }
            | Self::SetCalibrationPressure { .. }
            | Self::CancelCalibration => Capabilities::CALIBRATION,
        }
    }

    fn write_payload(&self, buf: &mut BytesMut) {
        match self {
            Self::SetDeviceId { id } => buf.put_slice(&DeviceId::wire_bytes(id)),
            Self::StartCalibration { prefill_mmhg } => buf.put_u16(*prefill_mmhg),
            Self::SetCalibrationPressure { actual_mmhg } => buf.put_u16(*actual_mmhg),
            Self::StartMeasurement
            | Self::StopMeasurement
            | Self::GetDeviceId
            | Self::CancelCalibration => {}
        }
    }

    fn payload_len(&self) -> usize {
        match self {
            Self::SetDeviceId { .. } => DEVICE_ID_LEN,
            Self::StartCalibration { .. } | Self::SetCalibrationPressure { .. } => 2,
            Self::StartMeasurement
            | Self::StopMeasurement
            | Self::GetDeviceId
            | Self::CancelCalibration => 0,
        }
    }

    /// Encode the command as a complete frame
    ///
    /// # Examples
    ///
    /// ```
    /// use bpmlink_core::Command;
    ///
    /// let bytes = Command::StartMeasurement.encode();
    /// assert_eq!(&bytes[..], &[0x5A, 0x06, 0x21, 0xF2, 0x28, 0x6B]);
    /// ```
    pub fn encode(&self) -> BytesMut {
        let total_len = FRAME_OVERHEAD + self.payload_len();
        let mut buf = BytesMut::with_capacity(total_len);

        buf.put_u8(START_MARKER);
        buf.put_u8(total_len as u8);
        buf.put_u8(self.packet_id());
        buf.put_u8(PARAM_TYPE_BP);
        self.write_payload(&mut buf);

        let crc = crc::compute(&buf);
        buf.put_slice(&crc::encode_be(crc));

        trace!(
            command = self.name(),
            frame = hex::encode_upper(&buf),
            "Encoded command"
        );

        buf
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetDeviceId { id } => write!(f, "{}('{}')", self.name(), id),
            Self::StartCalibration { prefill_mmhg } => {
                write!(f, "{}({} mmHg)", self.name(), prefill_mmhg)
            }
            Self::SetCalibrationPressure { actual_mmhg } => {
                write!(f, "{}({} mmHg)", self.name(), actual_mmhg)
            }
            _ => write!(f, "{}(0x{:02X})", self.name(), self.packet_id()),
        }
    }
}
