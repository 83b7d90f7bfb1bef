//! High-level error types

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Core protocol error: {0}")]
    Core(#[from] bpmlink_core::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] bpmlink_transport::Error),

    #[error("Monitor not connected")]
    NotConnected,

    #[error("Command disabled for this session: {0}")]
    CommandDisabled(&'static str),

    #[error("Invalid response from monitor: {0}")]
    InvalidResponse(String),
}

impl Error {
    /// Whether the caller should reopen the port and retry
    pub fn requires_reconnect(&self) -> bool {
        match self {
            Error::Transport(e) => e.requires_reconnect(),
            Error::NotConnected => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_reconnect() {
        assert!(Error::from(bpmlink_transport::Error::ConnectionClosed).requires_reconnect());
        assert!(!Error::CommandDisabled("START_CALIBRATION").requires_reconnect());
        assert!(!Error::Core(bpmlink_core::Error::FrameTooShort {
            expected: 6,
            actual: 2
        })
        .requires_reconnect());
    }
}
