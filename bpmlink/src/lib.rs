//! # bpmlink
//!
//! Host-side driver for serial blood-pressure monitors.
//!
//! ## Features
//!
//! - Frame assembly with resynchronisation on a noisy serial link
//! - CRC16/MODBUS validated packet decoding
//! - Throttled realtime pressure, measurement results and device errors
//! - Dead-man and response timeouts as explicit events
//! - Device ID and calibration commands, gated by a capability set
//! - Async/await API using Tokio
//!
//! ## Quick Start
//!
//! ```no_run
//! use bpmlink::{Monitor, SessionEvent};
//!
//! #[tokio::main]
//! async fn main() -> bpmlink::Result<()> {
//!     let mut monitor = Monitor::new("/dev/ttyUSB0");
//!     monitor.connect().await?;
//!
//!     monitor.start_measurement().await?;
//!     if let SessionEvent::MeasurementComplete(m) = monitor.next_event().await? {
//!         println!("{}", m);
//!     }
//!
//!     monitor.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod monitor;

// Re-exports
pub use config::MonitorConfig;
pub use error::{Error, Result};
pub use monitor::Monitor;

// Re-export protocol types
pub use bpmlink_core::{Capabilities, Command, DecodedPacket, Mode, SessionEvent, SessionTiming};
pub use bpmlink_transport::{list_ports, probe_serial_ports, PortInfo, Transport};
pub use bpmlink_types::{DeviceErrorCode, DeviceId, ExecutionStatus, Measurement};
