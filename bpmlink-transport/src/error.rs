//! Transport errors

use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Not connected")]
    NotConnected,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Connection closed by device")]
    ConnectionClosed,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("Frame error: {0}")]
    Frame(#[from] bpmlink_core::Error),

    #[error("No device detected on {ports} candidate port(s)")]
    NoDeviceDetected { ports: usize },
}

impl Error {
    /// Whether the port has to be reopened before it can be used again
    pub fn requires_reconnect(&self) -> bool {
        matches!(
            self,
            Error::NotConnected | Error::ConnectionClosed | Error::Io(_) | Error::Serial(_)
        )
    }
}
