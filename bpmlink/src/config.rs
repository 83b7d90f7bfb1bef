//! Monitor configuration

use std::time::Duration;

use bpmlink_core::{
    constants::{timing, DEFAULT_BAUD_RATE, MAX_RETRIES},
    Capabilities, SessionTiming,
};

/// Settings for a [`Monitor`](crate::Monitor)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    pub baud_rate: u32,

    /// Single read window on the port
    pub read_timeout: Duration,

    /// Minimum pause between a measurement result and the next start
    pub result_cooldown: Duration,

    /// Delay between reconnect attempts
    pub reconnect_backoff: Duration,

    /// Connect attempts before giving up
    pub max_retries: usize,

    /// Wait for each step of the post-connect ID handshake
    pub handshake_wait: Duration,

    /// Commands and packet kinds this session handles
    pub capabilities: Capabilities,

    pub timing: SessionTiming,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: timing::READ_TIMEOUT,
            result_cooldown: timing::RESULT_COOLDOWN,
            reconnect_backoff: timing::RECONNECT_BACKOFF,
            max_retries: MAX_RETRIES,
            handshake_wait: timing::HANDSHAKE_WAIT,
            capabilities: Capabilities::all(),
            timing: SessionTiming::default(),
        }
    }
}

impl MonitorConfig {
    /// Read-only monitoring: measurement start/stop and their packets
    pub fn monitor_only() -> Self {
        Self::default().with_capabilities(Capabilities::monitor_only())
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_result_cooldown(mut self, cooldown: Duration) -> Self {
        self.result_cooldown = cooldown;
        self
    }

    pub fn with_reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.reconnect_backoff = backoff;
        self
    }

    pub fn with_max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_handshake_wait(mut self, wait: Duration) -> Self {
        self.handshake_wait = wait;
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_timing(mut self, timing: SessionTiming) -> Self {
        self.timing = timing;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = MonitorConfig::default();

        assert_eq!(config.baud_rate, 19200);
        assert_eq!(config.read_timeout, Duration::from_secs(1));
        assert_eq!(config.result_cooldown, Duration::from_secs(5));
        assert_eq!(config.reconnect_backoff, Duration::from_secs(3));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.capabilities, Capabilities::all());
        assert_eq!(config.timing, SessionTiming::default());
    }

    #[test]
    fn test_builders() {
        let config = MonitorConfig::monitor_only()
            .with_baud_rate(9600)
            .with_max_retries(1);

        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.max_retries, 1);
        assert!(!config.capabilities.contains(Capabilities::CALIBRATION));
        assert!(config.capabilities.contains(Capabilities::MEASUREMENT));
    }
}
