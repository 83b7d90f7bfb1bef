//! CRC16/MODBUS frame checksum
//!
//! Frames carry a CRC-16/MODBUS over every byte before the checksum field:
//! 1. Start from 0xFFFF
//! 2. XOR each byte into the low byte of the running value
//! 3. Shift right eight times, XOR-ing 0xA001 whenever the shifted-out bit was set
//! 4. Append the result high byte first
//!
//! The device always sends the checksum big-endian. [`inspect_hex`] exists
//! for offline inspection of captured packets and reports both byte orders,
//! but frame validation only accepts big-endian.

use std::fmt;

use ::crc::{Crc, CRC_16_MODBUS};
use tracing::trace;

use crate::error::{Error, Result};

const CRC_MODBUS: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Size of the checksum field
pub const CRC_LEN: usize = 2;

/// Calculate the CRC16/MODBUS of `data`
///
/// # Examples
///
/// ```
/// use bpmlink_core::crc;
///
/// assert_eq!(crc::compute(b"123456789"), 0x4B37);
/// ```
pub fn compute(data: &[u8]) -> u16 {
    let crc = CRC_MODBUS.checksum(data);

    trace!(
        len = data.len(),
        crc = format!("0x{:04X}", crc),
        "Calculated CRC"
    );

    crc
}

/// Encode a CRC the way it appears on the wire (big-endian)
pub fn encode_be(crc: u16) -> [u8; CRC_LEN] {
    crc.to_be_bytes()
}

/// Verify a complete frame whose last two bytes are its big-endian CRC
pub fn verify(frame: &[u8]) -> bool {
    if frame.len() < CRC_LEN {
        return false;
    }

    let (data, received) = frame.split_at(frame.len() - CRC_LEN);
    encode_be(compute(data)) == received
}

/// Byte order in which a trailing CRC field matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrcByteOrder {
    Little,
    Big,
}

/// Result of inspecting a captured packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrcReport {
    /// Bytes covered by the checksum
    pub data: Vec<u8>,

    /// CRC computed over `data`
    pub computed: u16,

    /// Trailing field read little-endian
    pub received_le: u16,

    /// Trailing field read big-endian
    pub received_be: u16,
}

impl CrcReport {
    /// Byte order that matched, little-endian checked first
    pub fn matched(&self) -> Option<CrcByteOrder> {
        if self.computed == self.received_le {
            Some(CrcByteOrder::Little)
        } else if self.computed == self.received_be {
            Some(CrcByteOrder::Big)
        } else {
            None
        }
    }

    /// Whether the packet would pass frame validation
    pub fn is_valid_frame_crc(&self) -> bool {
        self.computed == self.received_be
    }
}

impl fmt::Display for CrcReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "data        : {}", hex::encode_upper(&self.data))?;
        writeln!(f, "computed    : {:04X}", self.computed)?;
        writeln!(f, "received LE : {:04X}", self.received_le)?;
        writeln!(f, "received BE : {:04X}", self.received_be)?;
        match self.matched() {
            Some(CrcByteOrder::Little) => write!(f, "CRC valid (little-endian)"),
            Some(CrcByteOrder::Big) => write!(f, "CRC valid (big-endian)"),
            None => write!(f, "CRC invalid"),
        }
    }
}

/// Inspect a hex dump of a packet including its trailing 2-byte CRC
///
/// Whitespace anywhere in the input is ignored.
///
/// # Examples
///
/// ```
/// use bpmlink_core::crc::{self, CrcByteOrder};
///
/// let report = crc::inspect_hex("5A 08 28 F2 00 69 5D 85").unwrap();
/// assert_eq!(report.computed, 0x5D85);
/// assert_eq!(report.matched(), Some(CrcByteOrder::Big));
/// ```
pub fn inspect_hex(input: &str) -> Result<CrcReport> {
    let cleaned: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let packet = hex::decode(&cleaned)?;

    if packet.len() <= CRC_LEN {
        return Err(Error::HexTooShort {
            expected: CRC_LEN + 1,
            actual: packet.len(),
        });
    }

    let (data, crc_field) = packet.split_at(packet.len() - CRC_LEN);

    Ok(CrcReport {
        computed: compute(data),
        received_le: u16::from_le_bytes([crc_field[0], crc_field[1]]),
        received_be: u16::from_be_bytes([crc_field[0], crc_field[1]]),
        data: data.to_vec(),
    })
}
