//! Transport layer for serial blood-pressure monitors
//!
//! Provides the byte-source abstraction the protocol engine reads from,
//! a serial port implementation, an in-memory implementation for scripted
//! streams, frame assembly and port discovery.

pub mod discovery;
pub mod error;
pub mod framing;
pub mod memory;
pub mod serial;

pub use discovery::{list_ports, probe_first, probe_serial_ports, PortInfo};
pub use error::{Error, Result};
pub use framing::FrameReader;
pub use memory::MemoryTransport;
pub use serial::SerialTransport;

use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;

/// Byte source/sink a monitor talks through
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send {
    /// Open the underlying port
    async fn connect(&mut self) -> Result<()>;

    /// Close the underlying port
    async fn disconnect(&mut self) -> Result<()>;

    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Write raw bytes
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Read up to `max_bytes`, waiting at most `timeout`
    ///
    /// Returns an empty buffer when nothing arrived in time.
    async fn receive(&mut self, max_bytes: usize, timeout: Duration) -> Result<BytesMut>;

    /// Drop bytes that already arrived but were not read yet
    async fn clear_input(&mut self) -> Result<()>;

    /// Port name, used in logs and discovery results
    fn port_name(&self) -> String;
}
