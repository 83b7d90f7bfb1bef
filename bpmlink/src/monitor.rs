//! High-level monitor interface

use std::time::Duration;

use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, trace, warn};

use bpmlink_core::{Command, DecodedPacket, SessionEvent, SessionState};
use bpmlink_transport::{FrameReader, SerialTransport, Transport};
use bpmlink_types::DeviceId;

use crate::{
    config::MonitorConfig,
    error::{Error, Result},
};

/// Blood-pressure monitor on a serial link
///
/// Owns the transport and the protocol session. Events are pulled with
/// [`poll_event`](Monitor::poll_event) or [`next_event`](Monitor::next_event).
///
/// # Examples
///
/// ```no_run
/// use bpmlink::{Monitor, SessionEvent};
///
/// #[tokio::main]
/// async fn main() -> bpmlink::Result<()> {
///     let mut monitor = Monitor::new("/dev/ttyUSB0");
///     monitor.connect().await?;
///
///     monitor.start_measurement().await?;
///     loop {
///         match monitor.next_event().await? {
///             SessionEvent::Pressure { mmhg } => println!("{} mmHg", mmhg),
///             SessionEvent::MeasurementComplete(m) => {
///                 println!("{}", m);
///                 break;
///             }
///             other => println!("{:?}", other),
///         }
///     }
///
///     monitor.disconnect().await?;
///     Ok(())
/// }
/// ```
pub struct Monitor {
    transport: Box<dyn Transport>,
    reader: FrameReader,
    session: SessionState,
    config: MonitorConfig,
    last_result_at: Option<Instant>,
}

impl Monitor {
    /// Create a monitor on a serial port with default settings
    pub fn new(port_name: impl Into<String>) -> Self {
        Self::serial(port_name, MonitorConfig::default())
    }

    /// Create a monitor on a serial port
    pub fn serial(port_name: impl Into<String>, config: MonitorConfig) -> Self {
        let transport = SerialTransport::new(port_name, config.baud_rate)
            .with_read_timeout(config.read_timeout);
        Self::with_transport(transport, config)
    }

    /// Create a monitor over any transport
    pub fn with_transport(transport: impl Transport + 'static, config: MonitorConfig) -> Self {
        Self {
            transport: Box::new(transport),
            reader: FrameReader::new(config.read_timeout),
            session: SessionState::new(config.timing),
            config,
            last_result_at: None,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn port_name(&self) -> String {
        self.transport.port_name()
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Open the port and start a fresh session
    pub async fn connect(&mut self) -> Result<()> {
        info!("Connecting to {}...", self.port_name());

        self.transport.connect().await?;
        self.session.reset();

        info!("Connected to {}", self.port_name());
        Ok(())
    }

    /// Close the port
    pub async fn disconnect(&mut self) -> Result<()> {
        if !self.is_connected() {
            return Ok(());
        }

        info!("Disconnecting from {}...", self.port_name());

        self.transport.disconnect().await?;
        self.session.reset();

        info!("Disconnected");
        Ok(())
    }

    /// Reopen the port, retrying with a fixed backoff
    ///
    /// Makes up to `max_retries` attempts and returns the last error if all
    /// of them fail.
    pub async fn connect_with_retry(&mut self) -> Result<()> {
        if self.is_connected() {
            if let Err(e) = self.transport.disconnect().await {
                debug!("Closing stale connection failed: {}", e);
            }
        }

        let attempts = self.config.max_retries.max(1);
        let mut attempt = 1;

        loop {
            match self.connect().await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < attempts => {
                    warn!(
                        "Connect attempt {}/{} to {} failed: {}, retrying in {:?}",
                        attempt,
                        attempts,
                        self.port_name(),
                        e,
                        self.config.reconnect_backoff
                    );
                    sleep(self.config.reconnect_backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!("Giving up on {} after {} attempts", self.port_name(), attempts);
                    return Err(e);
                }
            }
        }
    }

    /// Write a command and record it as outstanding
    ///
    /// A measurement start waits out the cool-down that follows a result.
    /// Input that arrived before the command is discarded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandDisabled`] when the session's capabilities do
    /// not cover the command; nothing is written in that case.
    pub async fn send_command(&mut self, command: Command) -> Result<()> {
        self.ensure_connected()?;

        if !self
            .config
            .capabilities
            .contains(command.required_capability())
        {
            return Err(Error::CommandDisabled(command.name()));
        }

        if command == Command::StartMeasurement {
            self.wait_for_cooldown().await;
        }

        self.transport.clear_input().await?;

        let frame = command.encode();
        trace!("Sending {}: {:02X?}", command, &frame[..]);
        self.transport.send(&frame).await?;

        self.session.command_sent(&command, Instant::now().into_std());

        info!("Sent {}", command);
        Ok(())
    }

    pub async fn start_measurement(&mut self) -> Result<()> {
        self.send_command(Command::StartMeasurement).await
    }

    pub async fn stop_measurement(&mut self) -> Result<()> {
        self.send_command(Command::StopMeasurement).await
    }

    pub async fn get_device_id(&mut self) -> Result<()> {
        self.send_command(Command::GetDeviceId).await
    }

    /// Store a new device ID, truncated or zero-padded to 12 bytes
    pub async fn set_device_id(&mut self, id: impl Into<String>) -> Result<()> {
        self.send_command(Command::SetDeviceId { id: id.into() })
            .await
    }

    pub async fn start_calibration(&mut self, prefill_mmhg: u16) -> Result<()> {
        self.send_command(Command::StartCalibration { prefill_mmhg })
            .await
    }

    pub async fn set_calibration_pressure(&mut self, actual_mmhg: u16) -> Result<()> {
        self.send_command(Command::SetCalibrationPressure { actual_mmhg })
            .await
    }

    pub async fn cancel_calibration(&mut self) -> Result<()> {
        self.send_command(Command::CancelCalibration).await
    }

    /// Run one read-loop iteration
    ///
    /// Checks the session timers, then makes one frame-assembly attempt.
    /// Frames that fail validation are logged and dropped. Returns
    /// `Ok(None)` when the iteration produced nothing to surface.
    pub async fn poll_event(&mut self) -> Result<Option<SessionEvent>> {
        self.ensure_connected()?;

        if let Some(event) = self.session.check_timeout(Instant::now().into_std()) {
            return Ok(Some(self.surface(event)));
        }

        let Some(frame) = self.reader.next_frame(self.transport.as_mut()).await? else {
            return Ok(None);
        };

        let packet = match DecodedPacket::decode_with(&frame, self.config.capabilities) {
            Ok(packet) => packet,
            Err(e) => {
                debug!("Dropping frame {:?}: {}", frame, e);
                return Ok(None);
            }
        };

        trace!("Received {}", packet);

        let event = self.session.feed(packet, Instant::now().into_std());
        Ok(event.map(|event| self.surface(event)))
    }

    /// Poll until an event is available
    pub async fn next_event(&mut self) -> Result<SessionEvent> {
        loop {
            if let Some(event) = self.poll_event().await? {
                return Ok(event);
            }
        }
    }

    /// Wait for the answer to the outstanding command
    ///
    /// Pressure samples are skipped. Returns the first final event, which is
    /// [`SessionEvent::ResponseTimeout`] when the device stays silent past
    /// the response timeout, or `None` once `within` has elapsed.
    pub async fn await_response(&mut self, within: Duration) -> Result<Option<SessionEvent>> {
        let deadline = Instant::now() + within;

        while Instant::now() < deadline {
            match self.poll_event().await? {
                Some(event) if event.is_final() => return Ok(Some(event)),
                Some(event) => trace!("Skipping {:?} while awaiting response", event),
                None => {}
            }
        }

        Ok(None)
    }

    /// Assign the USB-derived ID to the device and read it back
    ///
    /// A missing or failed acknowledgement of the set is logged; the
    /// read-back decides the outcome.
    pub async fn auto_assign_id(&mut self, vid: u16, pid: u16) -> Result<DeviceId> {
        let id = DeviceId::for_usb(vid, pid);
        info!("Assigning device ID {}", id);

        self.set_device_id(id.clone()).await?;
        match self.await_response(self.config.handshake_wait).await? {
            Some(SessionEvent::ExecutionResult { status, .. }) if status.is_success() => {
                debug!("Device ID {} stored", id);
            }
            Some(event) => warn!("Unexpected answer to SET_DEVICE_ID: {:?}", event),
            None => warn!("No acknowledgement for SET_DEVICE_ID"),
        }

        self.get_device_id().await?;
        match self.await_response(self.config.handshake_wait).await? {
            Some(SessionEvent::DeviceId(read_back)) => {
                if read_back.as_str() != id {
                    warn!("Device reports ID '{}', expected '{}'", read_back, id);
                }
                Ok(read_back)
            }
            Some(event) => Err(Error::InvalidResponse(format!(
                "expected device ID, got {:?}",
                event
            ))),
            None => Err(Error::InvalidResponse("device ID not read back".into())),
        }
    }

    // Helper methods

    fn ensure_connected(&self) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        Ok(())
    }

    async fn wait_for_cooldown(&self) {
        let Some(last) = self.last_result_at else {
            return;
        };

        let ready_at = last + self.config.result_cooldown;
        if ready_at > Instant::now() {
            info!(
                "Waiting {:?} before next measurement",
                ready_at - Instant::now()
            );
            sleep_until(ready_at).await;
        }
    }

    fn surface(&mut self, event: SessionEvent) -> SessionEvent {
        match &event {
            SessionEvent::Pressure { mmhg } => debug!("Cuff pressure {} mmHg", mmhg),
            SessionEvent::MeasurementComplete(m) => {
                info!("Measurement complete: {}", m);
                if m.clock_fallback() {
                    debug!("Device clock unset, using host time");
                }
                self.last_result_at = Some(Instant::now());
            }
            SessionEvent::DeviceId(id) => info!("Device ID: {}", id),
            SessionEvent::ExecutionResult {
                source_packet_id,
                status,
            } => info!("Execution result for 0x{:02X}: {}", source_packet_id, status),
            SessionEvent::DeviceError(code) if code.is_emergency_stop() => {
                warn!("Device emergency stop: {}", code)
            }
            SessionEvent::DeviceError(code) => warn!("Device error {}", code),
            SessionEvent::EmergencyStop => warn!("Realtime data lost, measurement aborted"),
            SessionEvent::ResponseTimeout { packet_id } => {
                warn!("No response to command 0x{:02X}", packet_id)
            }
        }

        event
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        if self.is_connected() {
            warn!("Monitor dropped while still connected to {}", self.port_name());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bpmlink_core::{
        constants::{packet_id, timing},
        Capabilities, Mode,
    };
    use bpmlink_transport::MemoryTransport;
    use bpmlink_types::{DeviceErrorCode, ExecutionStatus};
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    const REALTIME_105: &str = "5A0828F200695D85";
    const REALTIME_120: &str = "5A0828F200785145";
    const REALTIME_80: &str = "5A0828F200504F45";
    const RESULT_120_80: &str = "5A1422F200780050005A004B07E90B1A0D1E12C5";
    const SET_ID_OK: &str = "5A070EF200DA59";
    const GET_ID_BPM: &str = "5A120FF262706D5F3130633465613630C130";
    const ERROR_CUFF: &str = "5A0725F20112E8";
    const CAL_START_OK: &str = "5A0735F2001728";

    fn bytes(frame: &str) -> Vec<u8> {
        hex::decode(frame).unwrap()
    }

    async fn connected(config: MonitorConfig) -> (Monitor, MemoryTransport) {
        let script = MemoryTransport::new("mem0");
        let mut monitor = Monitor::with_transport(script.clone(), config);
        monitor.connect().await.unwrap();
        (monitor, script)
    }

    #[tokio::test]
    async fn test_monitor_create() {
        let monitor = Monitor::new("/dev/ttyUSB0");
        assert!(!monitor.is_connected());
        assert_eq!(monitor.port_name(), "/dev/ttyUSB0");
        assert_eq!(monitor.session().mode(), Mode::Idle);
    }

    #[tokio::test]
    async fn test_requires_connection() {
        let mut monitor =
            Monitor::with_transport(MemoryTransport::new("mem0"), MonitorConfig::default());

        assert!(matches!(
            monitor.start_measurement().await,
            Err(Error::NotConnected)
        ));
        assert!(matches!(monitor.poll_event().await, Err(Error::NotConnected)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_command_writes_frame() {
        let (mut monitor, script) = connected(MonitorConfig::default()).await;

        monitor.start_measurement().await.unwrap();
        monitor.set_device_id("ab").await.unwrap();

        assert_eq!(
            script.sent(),
            vec![
                Bytes::from(bytes("5A0621F2286B")),
                Bytes::from(bytes("5A120EF2616200000000000000000000E156")),
            ]
        );
        assert_eq!(
            monitor.session().last_command_sent(),
            Some(packet_id::SET_DEVICE_ID)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_command_clears_stale_input() {
        let (mut monitor, script) = connected(MonitorConfig::default()).await;
        script
            .push_bytes(bytes(REALTIME_105))
            .push_silence(Duration::from_millis(50))
            .push_bytes(bytes(SET_ID_OK));

        monitor.set_device_id("bpm_10c4ea60").await.unwrap();
        let event = monitor.next_event().await.unwrap();

        assert_eq!(
            event,
            SessionEvent::ExecutionResult {
                source_packet_id: packet_id::SET_DEVICE_ID,
                status: ExecutionStatus::Success,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_command_refused() {
        let (mut monitor, script) = connected(MonitorConfig::monitor_only()).await;

        let result = monitor.start_calibration(200).await;

        assert!(matches!(result, Err(Error::CommandDisabled("START_CALIBRATION"))));
        assert!(script.sent().is_empty());
        assert!(monitor.start_measurement().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_packets_not_surfaced() {
        let config = MonitorConfig::default().with_capabilities(Capabilities::MEASUREMENT);
        let (mut monitor, script) = connected(config).await;
        script
            .push_bytes(bytes(ERROR_CUFF))
            .push_bytes(bytes(REALTIME_105));

        assert_eq!(
            monitor.next_event().await.unwrap(),
            SessionEvent::Pressure { mmhg: 105 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_measurement_cycle() {
        let (mut monitor, script) = connected(MonitorConfig::default()).await;

        monitor.start_measurement().await.unwrap();

        script
            .push_silence(Duration::from_millis(100))
            .push_bytes(bytes(REALTIME_105))
            .push_silence(Duration::from_millis(300))
            .push_bytes(bytes(REALTIME_120))
            .push_silence(Duration::from_millis(300))
            .push_bytes(bytes(REALTIME_80))
            .push_silence(Duration::from_millis(100))
            .push_bytes(bytes(RESULT_120_80));

        let mut events = Vec::new();
        loop {
            let event = monitor.next_event().await.unwrap();
            let done = event.is_final();
            events.push(event);
            if done {
                break;
            }
        }

        assert_eq!(events.len(), 3);
        assert_eq!(events[0], SessionEvent::Pressure { mmhg: 105 });
        assert_eq!(events[1], SessionEvent::Pressure { mmhg: 80 });
        match &events[2] {
            SessionEvent::MeasurementComplete(m) => {
                assert_eq!((m.systolic, m.diastolic, m.mean, m.heart_rate), (120, 80, 90, 75));
                assert_eq!(m.taken_at.to_string(), "2025-11-26 13:30:00");
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(monitor.session().mode(), Mode::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_result_cooldown_delays_next_start() {
        let (mut monitor, script) = connected(MonitorConfig::default()).await;
        script.push_bytes(bytes(RESULT_120_80));

        let event = monitor.next_event().await.unwrap();
        assert!(matches!(event, SessionEvent::MeasurementComplete(_)));

        let result_at = Instant::now();
        monitor.start_measurement().await.unwrap();

        assert!(Instant::now() - result_at >= timing::RESULT_COOLDOWN);
        assert_eq!(script.sent().len(), 1);

        // The cool-down only applies to measurement starts
        let before = Instant::now();
        monitor.get_device_id().await.unwrap();
        assert_eq!(Instant::now(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_emergency_stop_after_silence() {
        let (mut monitor, script) = connected(MonitorConfig::default()).await;

        monitor.start_measurement().await.unwrap();
        script.push_bytes(bytes(REALTIME_105));

        assert_eq!(
            monitor.next_event().await.unwrap(),
            SessionEvent::Pressure { mmhg: 105 }
        );
        assert!(monitor.session().is_realtime());

        let sample_at = Instant::now();
        assert_eq!(monitor.next_event().await.unwrap(), SessionEvent::EmergencyStop);
        assert!(Instant::now() - sample_at > timing::REALTIME_TIMEOUT);
        assert_eq!(monitor.session().mode(), Mode::Idle);

        // Only one emergency stop per silence
        assert_eq!(monitor.poll_event().await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_emergency_stop_on_time_despite_line_noise() {
        let (mut monitor, script) = connected(MonitorConfig::default()).await;

        monitor.start_measurement().await.unwrap();
        script.push_bytes(bytes(REALTIME_105));
        for _ in 0..300 {
            script
                .push_silence(Duration::from_millis(100))
                .push_bytes([0x00]);
        }

        assert_eq!(
            monitor.next_event().await.unwrap(),
            SessionEvent::Pressure { mmhg: 105 }
        );

        let sample_at = Instant::now();
        assert_eq!(monitor.next_event().await.unwrap(), SessionEvent::EmergencyStop);

        let silence = Instant::now() - sample_at;
        assert!(silence > timing::REALTIME_TIMEOUT);
        assert!(silence <= timing::REALTIME_TIMEOUT + timing::READ_TIMEOUT);
        assert!(script.pending_bytes() > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_measurement_disarms_dead_man() {
        let (mut monitor, script) = connected(MonitorConfig::default()).await;
        script.push_bytes(bytes(REALTIME_105));

        assert_eq!(
            monitor.next_event().await.unwrap(),
            SessionEvent::Pressure { mmhg: 105 }
        );

        monitor.stop_measurement().await.unwrap();
        assert_eq!(monitor.session().mode(), Mode::Idle);

        assert_eq!(
            monitor.next_event().await.unwrap(),
            SessionEvent::ResponseTimeout {
                packet_id: packet_id::STOP_MEASUREMENT
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_timeout() {
        let (mut monitor, _script) = connected(MonitorConfig::default()).await;

        let sent_at = Instant::now();
        monitor.get_device_id().await.unwrap();

        let event = monitor.next_event().await.unwrap();
        assert_eq!(
            event,
            SessionEvent::ResponseTimeout {
                packet_id: packet_id::GET_DEVICE_ID
            }
        );
        assert!(Instant::now() - sent_at > timing::RESPONSE_TIMEOUT);
        assert!(!monitor.session().is_awaiting_response());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_measurement_never_times_out() {
        let (mut monitor, _script) = connected(MonitorConfig::default()).await;

        monitor.start_measurement().await.unwrap();

        let event = monitor.await_response(Duration::from_secs(10)).await.unwrap();
        assert_eq!(event, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_corrupt_frames_dropped() {
        let (mut monitor, script) = connected(MonitorConfig::default()).await;
        let mut corrupt = bytes(REALTIME_105);
        corrupt[7] ^= 0x01;

        script
            .push_bytes(corrupt)
            .push_bytes([0x5A, 0x07, 0x28, 0xF1, 0x00, 0x00, 0x00])
            .push_bytes(bytes(ERROR_CUFF));

        assert_eq!(
            monitor.next_event().await.unwrap(),
            SessionEvent::DeviceError(DeviceErrorCode(0x01))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_calibration_acknowledged() {
        let (mut monitor, script) = connected(MonitorConfig::default()).await;

        monitor.start_calibration(200).await.unwrap();
        script.push_bytes(bytes(CAL_START_OK));

        let event = monitor.await_response(Duration::from_secs(5)).await.unwrap();
        assert_eq!(
            event,
            Some(SessionEvent::ExecutionResult {
                source_packet_id: packet_id::START_CALIBRATION,
                status: ExecutionStatus::Success,
            })
        );
        assert_eq!(
            script.sent(),
            vec![Bytes::from(bytes("5A0835F200C88942"))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_assign_id() {
        let (mut monitor, script) = connected(MonitorConfig::default()).await;
        script
            .push_silence(Duration::from_millis(100))
            .push_bytes(bytes(SET_ID_OK))
            .push_silence(Duration::from_millis(100))
            .push_bytes(bytes(GET_ID_BPM));

        let id = monitor.auto_assign_id(0x10C4, 0xEA60).await.unwrap();

        assert_eq!(id.as_str(), "bpm_10c4ea60");
        assert_eq!(
            script.sent(),
            vec![
                Bytes::from(bytes("5A120EF262706D5F31306334656136300030")),
                Bytes::from(bytes("5A060FF28876")),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_assign_id_without_read_back() {
        let (mut monitor, _script) = connected(MonitorConfig::default()).await;

        let result = monitor.auto_assign_id(0x10C4, 0xEA60).await;
        assert!(matches!(result, Err(Error::InvalidResponse(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_with_retry_gives_up() {
        let transport = MemoryTransport::new("mem0").failing_connect();
        let mut monitor = Monitor::with_transport(transport, MonitorConfig::default());

        let start = Instant::now();
        let result = monitor.connect_with_retry().await;

        assert!(matches!(result, Err(Error::Transport(_))));
        // Three attempts, two backoffs
        assert_eq!(Instant::now() - start, timing::RECONNECT_BACKOFF * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_after_port_closed() {
        let script = MemoryTransport::new("mem0").close_when_drained();
        let mut monitor = Monitor::with_transport(script.clone(), MonitorConfig::default());
        monitor.connect().await.unwrap();

        let err = monitor.poll_event().await.unwrap_err();
        assert!(err.requires_reconnect());

        script.push_bytes(bytes(REALTIME_105));
        monitor.connect_with_retry().await.unwrap();

        assert_eq!(
            monitor.next_event().await.unwrap(),
            SessionEvent::Pressure { mmhg: 105 }
        );
    }
}
