//! Type definitions for bpmlink

pub mod device_id;
pub mod measurement;
pub mod status;

pub use device_id::{DeviceId, DEVICE_ID_LEN};
pub use measurement::{DeviceTimestamp, Measurement};
pub use status::{DeviceErrorCode, ErrorCategory, ExecutionStatus};
