//! Session state machine
//!
//! A session tracks, for one open connection:
//! - Mode (idle or streaming realtime samples)
//! - Realtime timestamps for the dead-man timeout and the sample throttle
//! - The outstanding command and when its response window opened
//!
//! The machine is a plain value driven by the caller's read loop. It never
//! fails: frames that did not decode are simply not fed to it.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use bpmlink_types::{DeviceErrorCode, DeviceId, ExecutionStatus, Measurement};

use crate::{
    command::Command,
    constants::{packet_id, timing},
    packet::DecodedPacket,
};

/// Session mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// No measurement streaming
    Idle,

    /// Realtime pressure samples are streaming
    Realtime,
}

/// Timing policy of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTiming {
    /// Silence in realtime mode that triggers an emergency stop
    pub realtime_timeout: Duration,

    /// Minimum spacing between surfaced pressure samples
    pub sample_interval: Duration,

    /// Wait for the answer to a non-start command
    pub response_timeout: Duration,
}

impl SessionTiming {
    pub fn with_realtime_timeout(mut self, timeout: Duration) -> Self {
        self.realtime_timeout = timeout;
        self
    }

    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            realtime_timeout: timing::REALTIME_TIMEOUT,
            sample_interval: timing::SAMPLE_INTERVAL,
            response_timeout: timing::RESPONSE_TIMEOUT,
        }
    }
}

/// Something the caller should act on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Throttled realtime cuff pressure
    Pressure { mmhg: u16 },

    /// Measurement finished
    MeasurementComplete(Measurement),

    /// Device ID read back
    DeviceId(DeviceId),

    /// Set-ID or calibration command acknowledged
    ExecutionResult {
        source_packet_id: u8,
        status: ExecutionStatus,
    },

    /// Device reported a measurement failure
    DeviceError(DeviceErrorCode),

    /// Realtime samples stopped arriving mid-measurement
    EmergencyStop,

    /// Outstanding command got no answer in time
    ResponseTimeout { packet_id: u8 },
}

impl SessionEvent {
    /// Check if the event ends the current exchange
    pub fn is_final(&self) -> bool {
        !matches!(self, Self::Pressure { .. })
    }
}

/// Per-connection protocol state
#[derive(Debug, Clone)]
pub struct SessionState {
    mode: Mode,
    last_realtime_sample_at: Option<Instant>,
    last_surfaced_sample_at: Option<Instant>,
    last_command_sent: Option<u8>,
    command_wait_started_at: Option<Instant>,
    timing: SessionTiming,
}

impl SessionState {
    /// Create an idle session
    pub fn new(timing: SessionTiming) -> Self {
        Self {
            mode: Mode::Idle,
            last_realtime_sample_at: None,
            last_surfaced_sample_at: None,
            last_command_sent: None,
            command_wait_started_at: None,
            timing,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_realtime(&self) -> bool {
        self.mode == Mode::Realtime
    }

    pub fn timing(&self) -> SessionTiming {
        self.timing
    }

    /// Packet id of the command still waiting for an answer
    pub fn last_command_sent(&self) -> Option<u8> {
        self.last_command_sent
    }

    pub fn last_realtime_sample_at(&self) -> Option<Instant> {
        self.last_realtime_sample_at
    }

    /// Whether a bounded response window is open
    pub fn is_awaiting_response(&self) -> bool {
        self.command_wait_started_at.is_some()
    }

    /// Record that `command` was written to the device
    ///
    /// Opens a response window unless the command is a measurement start.
    /// Stopping a measurement disarms the dead-man timeout since the
    /// silence that follows is expected.
    pub fn command_sent(&mut self, command: &Command, now: Instant) {
        let id = command.packet_id();

        self.last_command_sent = Some(id);
        self.command_wait_started_at = command.awaits_bounded_response().then_some(now);

        match id {
            packet_id::START_MEASUREMENT => self.last_surfaced_sample_at = None,
            packet_id::STOP_MEASUREMENT => self.enter_idle(),
            _ => {}
        }

        debug!(command = %command, mode = ?self.mode, "Command recorded");
    }

    /// Apply a decoded packet
    ///
    /// Returns the event to surface, if any. Throttled pressure samples and
    /// unrecognized packets still count as traffic but surface nothing.
    pub fn feed(&mut self, packet: DecodedPacket, now: Instant) -> Option<SessionEvent> {
        let event = match packet {
            DecodedPacket::RealtimePressure { mmhg } => return self.on_sample(mmhg, now),
            DecodedPacket::Unrecognized { packet_id } => {
                debug!(packet_id = format!("0x{:02X}", packet_id), "Ignoring unrecognized packet");
                return None;
            }
            DecodedPacket::MeasurementResult(m) => SessionEvent::MeasurementComplete(m),
            DecodedPacket::DeviceId(id) => SessionEvent::DeviceId(id),
            DecodedPacket::ExecutionResult {
                source_packet_id,
                status,
            } => {
                if self
                    .last_command_sent
                    .is_some_and(|sent| sent != source_packet_id)
                {
                    debug!(
                        sent = ?self.last_command_sent,
                        acked = format!("0x{:02X}", source_packet_id),
                        "Acknowledgement for a different command"
                    );
                }
                SessionEvent::ExecutionResult {
                    source_packet_id,
                    status,
                }
            }
            DecodedPacket::ErrorReport(code) => SessionEvent::DeviceError(code),
        };

        self.enter_idle();
        self.resolve_command();

        Some(event)
    }

    /// Apply the passage of time
    ///
    /// Call at least once per read-loop iteration. The dead-man check runs
    /// first: more than `realtime_timeout` without a sample in realtime mode
    /// yields one [`SessionEvent::EmergencyStop`] and returns to idle.
    pub fn check_timeout(&mut self, now: Instant) -> Option<SessionEvent> {
        let silence = self
            .last_realtime_sample_at
            .map(|last| now.saturating_duration_since(last))
            .unwrap_or_default();

        if self.mode == Mode::Realtime && silence > self.timing.realtime_timeout {
            warn!(
                silence_ms = silence.as_millis() as u64,
                "No realtime data, emergency stop"
            );
            self.enter_idle();
            self.resolve_command();
            return Some(SessionEvent::EmergencyStop);
        }

        match (self.last_command_sent, self.command_wait_started_at) {
            (Some(id), Some(started))
                if now.saturating_duration_since(started) > self.timing.response_timeout =>
            {
                warn!(packet_id = format!("0x{:02X}", id), "Response timeout");
                self.resolve_command();
                Some(SessionEvent::ResponseTimeout { packet_id: id })
            }
            _ => None,
        }
    }

    /// Forget everything, as on a fresh connection
    pub fn reset(&mut self) {
        *self = Self::new(self.timing);
    }

    fn on_sample(&mut self, mmhg: u16, now: Instant) -> Option<SessionEvent> {
        if self.mode != Mode::Realtime {
            debug!("Entering realtime mode");
            self.mode = Mode::Realtime;
        }
        self.last_realtime_sample_at = Some(now);

        let due = self
            .last_surfaced_sample_at
            .is_none_or(|last| now.saturating_duration_since(last) >= self.timing.sample_interval);

        if due {
            self.last_surfaced_sample_at = Some(now);
            Some(SessionEvent::Pressure { mmhg })
        } else {
            None
        }
    }

    fn enter_idle(&mut self) {
        if self.mode == Mode::Realtime {
            debug!("Leaving realtime mode");
        }
        self.mode = Mode::Idle;
        self.last_surfaced_sample_at = None;
    }

    fn resolve_command(&mut self) {
        self.last_command_sent = None;
        self.command_wait_started_at = None;
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(SessionTiming::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bpmlink_types::DeviceTimestamp;
    use pretty_assertions::assert_eq;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn sample(mmhg: u16) -> DecodedPacket {
        DecodedPacket::RealtimePressure { mmhg }
    }

    fn result() -> DecodedPacket {
        DecodedPacket::MeasurementResult(Measurement::new(
            120,
            80,
            90,
            75,
            DeviceTimestamp::new(2025, 11, 26, 13, 30),
        ))
    }

    #[test]
    fn test_session_new() {
        let session = SessionState::default();
        assert_eq!(session.mode(), Mode::Idle);
        assert_eq!(session.last_command_sent(), None);
        assert!(!session.is_awaiting_response());
        assert_eq!(session.last_realtime_sample_at(), None);
    }

    #[test]
    fn test_throttle_drops_close_samples() {
        let t0 = Instant::now();
        let mut session = SessionState::default();

        assert_eq!(session.feed(sample(40), t0), Some(SessionEvent::Pressure { mmhg: 40 }));
        assert_eq!(session.feed(sample(45), t0 + ms(300)), None);

        // State still tracks the swallowed sample
        assert!(session.is_realtime());
        assert_eq!(session.last_realtime_sample_at(), Some(t0 + ms(300)));
    }

    #[test]
    fn test_throttle_passes_spaced_samples() {
        let t0 = Instant::now();
        let mut session = SessionState::default();

        assert!(session.feed(sample(40), t0).is_some());
        assert_eq!(
            session.feed(sample(60), t0 + ms(600)),
            Some(SessionEvent::Pressure { mmhg: 60 })
        );
    }

    #[test]
    fn test_throttle_measures_from_last_surfaced_sample() {
        let t0 = Instant::now();
        let mut session = SessionState::default();

        assert!(session.feed(sample(1), t0).is_some());
        assert!(session.feed(sample(2), t0 + ms(300)).is_none());
        assert!(session.feed(sample(3), t0 + ms(500)).is_some());
        assert!(session.feed(sample(4), t0 + ms(800)).is_none());
    }

    #[test]
    fn test_emergency_stop_fires_once() {
        let t0 = Instant::now();
        let mut session = SessionState::default();
        session.feed(sample(100), t0);

        assert_eq!(session.check_timeout(t0 + ms(4_900)), None);
        assert_eq!(session.check_timeout(t0 + ms(5_000)), None);
        assert_eq!(
            session.check_timeout(t0 + ms(5_001)),
            Some(SessionEvent::EmergencyStop)
        );
        assert_eq!(session.mode(), Mode::Idle);
        assert_eq!(session.check_timeout(t0 + ms(20_000)), None);
    }

    #[test]
    fn test_samples_keep_dead_man_alive() {
        let t0 = Instant::now();
        let mut session = SessionState::default();

        for i in 0..20 {
            let now = t0 + ms(i * 400);
            session.feed(sample(100), now);
            assert_eq!(session.check_timeout(now + ms(100)), None);
        }
        assert!(session.is_realtime());
    }

    #[test]
    fn test_idle_never_emergency_stops() {
        let t0 = Instant::now();
        let mut session = SessionState::default();
        assert_eq!(session.check_timeout(t0 + Duration::from_secs(60)), None);
    }

    #[test]
    fn test_result_returns_to_idle() {
        let t0 = Instant::now();
        let mut session = SessionState::default();
        session.command_sent(&Command::StartMeasurement, t0);
        session.feed(sample(150), t0 + ms(100));

        let event = session.feed(result(), t0 + ms(200)).unwrap();
        assert!(matches!(event, SessionEvent::MeasurementComplete(ref m) if m.systolic == 120));
        assert!(event.is_final());
        assert_eq!(session.mode(), Mode::Idle);
        assert_eq!(session.last_command_sent(), None);
        assert_eq!(session.check_timeout(t0 + Duration::from_secs(30)), None);
    }

    #[test]
    fn test_error_report_returns_to_idle() {
        let t0 = Instant::now();
        let mut session = SessionState::default();
        session.feed(sample(150), t0);

        let event = session.feed(DecodedPacket::ErrorReport(DeviceErrorCode(0x06)), t0 + ms(50));
        assert_eq!(event, Some(SessionEvent::DeviceError(DeviceErrorCode(0x06))));
        assert!(!session.is_realtime());
    }

    #[test]
    fn test_unrecognized_changes_nothing() {
        let t0 = Instant::now();
        let mut session = SessionState::default();
        session.feed(sample(150), t0);

        assert_eq!(session.feed(DecodedPacket::Unrecognized { packet_id: 0x99 }, t0), None);
        assert!(session.is_realtime());
    }

    #[test]
    fn test_response_timeout_for_bounded_command() {
        let t0 = Instant::now();
        let mut session = SessionState::default();
        session.command_sent(&Command::GetDeviceId, t0);

        assert!(session.is_awaiting_response());
        assert_eq!(session.check_timeout(t0 + ms(3_000)), None);
        assert_eq!(
            session.check_timeout(t0 + ms(3_001)),
            Some(SessionEvent::ResponseTimeout {
                packet_id: packet_id::GET_DEVICE_ID
            })
        );
        assert!(!session.is_awaiting_response());
        assert_eq!(session.check_timeout(t0 + ms(10_000)), None);
    }

    #[test]
    fn test_start_measurement_wait_is_unbounded() {
        let t0 = Instant::now();
        let mut session = SessionState::default();
        session.command_sent(&Command::StartMeasurement, t0);

        assert_eq!(session.last_command_sent(), Some(packet_id::START_MEASUREMENT));
        assert_eq!(session.check_timeout(t0 + Duration::from_secs(600)), None);
    }

    #[test]
    fn test_response_resolves_wait() {
        let t0 = Instant::now();
        let mut session = SessionState::default();
        session.command_sent(&Command::GetDeviceId, t0);

        let event = session.feed(
            DecodedPacket::DeviceId(DeviceId::from_raw(b"bpm_1".to_vec())),
            t0 + ms(200),
        );
        assert!(matches!(event, Some(SessionEvent::DeviceId(_))));
        assert_eq!(session.check_timeout(t0 + ms(5_000)), None);
    }

    #[test]
    fn test_any_ack_resolves_calibration_wait() {
        let t0 = Instant::now();
        let mut session = SessionState::default();
        session.command_sent(&Command::SetCalibrationPressure { actual_mmhg: 180 }, t0);

        let event = session.feed(
            DecodedPacket::ExecutionResult {
                source_packet_id: packet_id::START_CALIBRATION,
                status: ExecutionStatus::Success,
            },
            t0 + ms(100),
        );
        assert!(matches!(event, Some(SessionEvent::ExecutionResult { .. })));
        assert!(!session.is_awaiting_response());
    }

    #[test]
    fn test_stop_disarms_dead_man() {
        let t0 = Instant::now();
        let mut session = SessionState::default();
        session.feed(sample(150), t0);
        session.command_sent(&Command::StopMeasurement, t0 + ms(100));

        assert_eq!(session.mode(), Mode::Idle);
        assert_eq!(
            session.check_timeout(t0 + ms(6_000)),
            Some(SessionEvent::ResponseTimeout {
                packet_id: packet_id::STOP_MEASUREMENT
            })
        );
    }

    #[test]
    fn test_custom_timing() {
        let timing = SessionTiming::default()
            .with_realtime_timeout(ms(1_000))
            .with_sample_interval(ms(100))
            .with_response_timeout(ms(200));
        let t0 = Instant::now();
        let mut session = SessionState::new(timing);

        session.feed(sample(10), t0);
        assert!(session.feed(sample(11), t0 + ms(150)).is_some());
        assert_eq!(
            session.check_timeout(t0 + ms(1_200)),
            Some(SessionEvent::EmergencyStop)
        );
    }

    #[test]
    fn test_reset() {
        let t0 = Instant::now();
        let mut session = SessionState::default();
        session.feed(sample(10), t0);
        session.command_sent(&Command::GetDeviceId, t0);

        session.reset();
        assert_eq!(session.mode(), Mode::Idle);
        assert_eq!(session.last_command_sent(), None);
        assert_eq!(session.last_realtime_sample_at(), None);
    }
}
