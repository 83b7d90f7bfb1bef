//! Protocol constants

use std::time::Duration;

/// First byte of every frame
pub const START_MARKER: u8 = 0x5A;

/// Parameter type of the blood-pressure subsystem
pub const PARAM_TYPE_BP: u8 = 0xF2;

/// Smallest valid frame: marker, length, id, param type and CRC
pub const MIN_FRAME_LEN: usize = 6;

/// Bytes of framing around the payload
pub const FRAME_OVERHEAD: usize = MIN_FRAME_LEN;

/// Default serial line speed
pub const DEFAULT_BAUD_RATE: u32 = 19200;

/// Maximum reconnect attempts
pub const MAX_RETRIES: usize = 3;

/// Packet identifiers
pub mod packet_id {
    /// Stop measurement (host to device)
    pub const STOP_MEASUREMENT: u8 = 0x20;

    /// Start measurement (host to device)
    pub const START_MEASUREMENT: u8 = 0x21;

    /// Final measurement result
    pub const RESULT: u8 = 0x22;

    /// Error report
    pub const ERROR: u8 = 0x25;

    /// Realtime cuff pressure sample
    pub const REALTIME: u8 = 0x28;

    /// Set device ID
    pub const SET_DEVICE_ID: u8 = 0x0E;

    /// Get device ID
    pub const GET_DEVICE_ID: u8 = 0x0F;

    /// Start pressure calibration
    pub const START_CALIBRATION: u8 = 0x35;

    /// Set the actual pressure during calibration
    pub const SET_CALIBRATION_PRESSURE: u8 = 0x36;

    /// Cancel calibration
    pub const CANCEL_CALIBRATION: u8 = 0x37;
}

/// Minimum declared lengths for fixed-layout packets
pub mod min_len {
    /// Realtime frame: 2-byte pressure
    pub const REALTIME: usize = 8;

    /// Result frame: 14-byte payload
    pub const RESULT: usize = 20;
}

/// Timing defaults
pub mod timing {
    use super::Duration;

    /// Silence in realtime mode before an emergency stop
    pub const REALTIME_TIMEOUT: Duration = Duration::from_secs(5);

    /// Minimum spacing between surfaced pressure samples
    pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

    /// Wait for the answer to a non-start command
    pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(3);

    /// Pause after a measurement result before the next cycle
    pub const RESULT_COOLDOWN: Duration = Duration::from_secs(5);

    /// Single read window on the byte source
    pub const READ_TIMEOUT: Duration = Duration::from_secs(1);

    /// Window a probed port has to show a start marker
    pub const PROBE_WINDOW: Duration = Duration::from_secs(2);

    /// Delay between reconnect attempts
    pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(3);

    /// Wait for each step of the post-connect ID handshake
    pub const HANDSHAKE_WAIT: Duration = Duration::from_secs(2);
}
