//! Serial port transport

use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use serialport::{ClearBuffer, SerialPort};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tokio_serial::{DataBits, FlowControl, Parity, SerialStream, StopBits};
use tracing::{debug, trace, warn};

use bpmlink_core::constants::{timing, DEFAULT_BAUD_RATE};

use crate::{error::*, Transport};

/// Serial transport for blood-pressure monitors (8N1, no flow control)
pub struct SerialTransport {
    port_name: String,
    baud_rate: u32,
    stream: Option<SerialStream>,
    read_timeout: Duration,
}

impl SerialTransport {
    /// Create new serial transport
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            stream: None,
            read_timeout: timing::READ_TIMEOUT,
        }
    }

    /// Create a transport at the monitor's default baud rate
    pub fn with_default_baud(port_name: impl Into<String>) -> Self {
        Self::new(port_name, DEFAULT_BAUD_RATE)
    }

    /// Set the blocking timeout of the underlying port
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Err(Error::AlreadyConnected);
        }

        debug!("Opening {} at {} baud...", self.port_name, self.baud_rate);

        let builder = tokio_serial::new(self.port_name.as_str(), self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(self.read_timeout);

        let stream = SerialStream::open(&builder)?;

        debug!("Opened {}", self.port_name);

        self.stream = Some(stream);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if self.stream.take().is_some() {
            debug!("Closed {}", self.port_name);
        }

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        trace!("Sending {} bytes: {:02X?}", data.len(), &data[..data.len().min(18)]);

        stream.write_all(data).await?;
        stream.flush().await?;

        Ok(())
    }

    async fn receive(&mut self, max_bytes: usize, wait: Duration) -> Result<BytesMut> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        let mut buf = BytesMut::zeroed(max_bytes);

        let n = match timeout(wait, stream.read(&mut buf)).await {
            Err(_) => return Ok(BytesMut::new()),
            Ok(result) => result?,
        };

        if n == 0 && max_bytes > 0 {
            return Err(Error::ConnectionClosed);
        }

        buf.truncate(n);
        trace!("Received {} bytes: {:02X?}", n, &buf[..n.min(16)]);

        Ok(buf)
    }

    async fn clear_input(&mut self) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
        stream.clear(ClearBuffer::Input)?;
        Ok(())
    }

    fn port_name(&self) -> String {
        self.port_name.clone()
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        if self.is_connected() {
            warn!("Serial transport for {} dropped while still open", self.port_name);
        }
    }
}
