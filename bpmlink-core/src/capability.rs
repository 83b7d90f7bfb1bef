//! Command/packet capability sets
//!
//! A monitor-only tool and a full service console talk to the same device;
//! they differ only in which packet kinds they accept and which commands
//! they may send.

use bitflags::bitflags;

use crate::constants::packet_id;

bitflags! {
    /// Enabled protocol features
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        /// Start/stop, realtime samples and results
        const MEASUREMENT = 1;

        /// Get/set device ID
        const DEVICE_ID = 1 << 1;

        /// Calibration start/set-pressure/cancel
        const CALIBRATION = 1 << 2;

        /// Device error reports
        const ERROR_REPORT = 1 << 3;
    }
}

impl Capabilities {
    /// Passive measurement monitor
    pub fn monitor_only() -> Self {
        Self::MEASUREMENT
    }

    /// Capability governing a packet id, `None` for ids outside the protocol
    pub fn for_packet(id: u8) -> Option<Self> {
        match id {
            packet_id::STOP_MEASUREMENT
            | packet_id::START_MEASUREMENT
            | packet_id::RESULT
            | packet_id::REALTIME => Some(Self::MEASUREMENT),
            packet_id::SET_DEVICE_ID | packet_id::GET_DEVICE_ID => Some(Self::DEVICE_ID),
            packet_id::START_CALIBRATION
            | packet_id::SET_CALIBRATION_PRESSURE
            | packet_id::CANCEL_CALIBRATION => Some(Self::CALIBRATION),
            packet_id::ERROR => Some(Self::ERROR_REPORT),
            _ => None,
        }
    }

    /// Check whether packets with this id should be decoded
    ///
    /// Ids outside the protocol are always allowed; they decode as
    /// unrecognized either way.
    pub fn allows_packet(self, id: u8) -> bool {
        Self::for_packet(id).is_none_or(|needed| self.contains(needed))
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::all()
    }
}
