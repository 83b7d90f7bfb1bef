//! Device status and error codes

use std::fmt;

/// Status carried by an execution acknowledgement
///
/// Returned for set-ID and calibration commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionStatus {
    Success,
    Processing,
    Busy,
    Failed,
    ProtectionActive,
    Unknown(u8),
}

impl ExecutionStatus {
    /// Code used when the acknowledgement carried no status byte
    pub const MISSING: u8 = 0xFF;

    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0x00,
            Self::Processing => 0x01,
            Self::Busy => 0x02,
            Self::Failed => 0x03,
            Self::ProtectionActive => 0x04,
            Self::Unknown(code) => code,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl From<u8> for ExecutionStatus {
    fn from(code: u8) -> Self {
        match code {
            0x00 => Self::Success,
            0x01 => Self::Processing,
            0x02 => Self::Busy,
            0x03 => Self::Failed,
            0x04 => Self::ProtectionActive,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("operation completed"),
            Self::Processing => f.write_str("processing command"),
            Self::Busy => f.write_str("device busy"),
            Self::Failed => f.write_str("operation failed"),
            Self::ProtectionActive => f.write_str("system protection active"),
            Self::Unknown(code) => write!(f, "unknown status code 0x{:02X}", code),
        }
    }
}

/// Broad class of a device error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Normal,
    Cuff,
    AirCircuit,
    Signal,
    Motion,
    Pressure,
    Timeout,
    System,
    Communication,
    Printer,
    History,
    EmergencyStop,
    Unknown,
}

/// Error code from an error-report packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceErrorCode(pub u8);

// 0x25 doubles as the error-report packet id; the table entry is what the
// device documents for the code and is kept as-is.
const ERROR_TABLE: &[(u8, ErrorCategory, &str)] = &[
    (0x00, ErrorCategory::Normal, "normal result"),
    (0x01, ErrorCategory::Cuff, "cuff too loose or not connected"),
    (0x02, ErrorCategory::AirCircuit, "leak in the air circuit or valve"),
    (0x03, ErrorCategory::AirCircuit, "air pressure error, valve may not open normally"),
    (0x04, ErrorCategory::Signal, "weak signal (pulse too weak or cuff too loose)"),
    (0x05, ErrorCategory::Pressure, "blood pressure outside the measurement range"),
    (0x06, ErrorCategory::Motion, "excessive movement during measurement"),
    (0x07, ErrorCategory::Pressure, "over-pressure during measurement (>290 mmHg adult)"),
    (0x08, ErrorCategory::Motion, "signal saturated, amplitude too large due to movement"),
    (0x09, ErrorCategory::Timeout, "measurement timed out (over 120 s / 90 s)"),
    (0x0A, ErrorCategory::System, "stopped manually"),
    (0x0B, ErrorCategory::System, "system error"),
    (0x0C, ErrorCategory::System, "failed to read calibration information"),
    (0x0D, ErrorCategory::Signal, "no signal detected"),
    (0x0E, ErrorCategory::Signal, "irregular pulse waveform"),
    (0x10, ErrorCategory::Pressure, "over-pressure protection active (>290 mmHg)"),
    (0x11, ErrorCategory::Cuff, "sleeve failure, motor operation failed"),
    (0x12, ErrorCategory::System, "measurement failed"),
    (0x13, ErrorCategory::Cuff, "wrong arm posture or elbow switch not pressed"),
    (0x20, ErrorCategory::Communication, "handshake communication failed"),
    (0x23, ErrorCategory::Communication, "measurement could not start, no response to instruction"),
    (0x24, ErrorCategory::Communication, "could not obtain the measurement result"),
    (0x25, ErrorCategory::Timeout, "overall time limit of 180 s exceeded"),
    (0x26, ErrorCategory::Communication, "initial handshake failed"),
    (0x40, ErrorCategory::Printer, "printer out of paper"),
    (0x41, ErrorCategory::Printer, "printer cover not closed properly"),
    (0x42, ErrorCategory::Printer, "printer outer cover open"),
    (0x60, ErrorCategory::History, "no measurement records available"),
    (0x64, ErrorCategory::EmergencyStop, "emergency stop button pressed"),
];

impl DeviceErrorCode {
    fn entry(self) -> Option<&'static (u8, ErrorCategory, &'static str)> {
        ERROR_TABLE.iter().find(|(code, _, _)| *code == self.0)
    }

    pub fn code(self) -> u8 {
        self.0
    }

    /// Human-readable cause, if the code is documented
    pub fn description(self) -> Option<&'static str> {
        self.entry().map(|(_, _, text)| *text)
    }

    pub fn category(self) -> ErrorCategory {
        self.entry()
            .map(|(_, category, _)| *category)
            .unwrap_or(ErrorCategory::Unknown)
    }

    pub fn is_emergency_stop(self) -> bool {
        self.category() == ErrorCategory::EmergencyStop
    }
}

impl fmt::Display for DeviceErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.description() {
            Some(text) => write!(f, "0x{:02X}: {}", self.0, text),
            None => write!(f, "0x{:02X}: unknown error code", self.0),
        }
    }
}
