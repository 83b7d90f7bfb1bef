//! # bpmlink-core
//!
//! Core protocol implementation for serial blood-pressure monitors.
//!
//! This crate provides the low-level protocol primitives:
//! - CRC16/MODBUS checksum and a hex diagnostic validator
//! - Frame structure and packet decoding
//! - Command encoding
//! - The per-connection session state machine
//! - Protocol constants

pub mod capability;
pub mod command;
pub mod constants;
pub mod crc;
pub mod error;
pub mod frame;
pub mod packet;
pub mod session;

pub use capability::Capabilities;
pub use command::Command;
pub use error::{Error, Result};
pub use frame::Frame;
pub use packet::DecodedPacket;
pub use session::{Mode, SessionEvent, SessionState, SessionTiming};

/// Protocol version information
pub const PROTOCOL_VERSION: &str = "1.0";
