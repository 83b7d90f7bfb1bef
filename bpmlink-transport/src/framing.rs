//! Frame assembly from a raw byte stream
//!
//! The reader scans for the start marker, reads the length byte and then
//! the rest of the frame within one read window. Anything that does not
//! fit is dropped and scanning resumes at the next byte, so a stream that
//! starts mid-frame or carries line noise resynchronises on its own.
//! Validation beyond the length (parameter type, CRC) is left to the
//! packet decoder.

use std::time::Duration;

use bytes::BytesMut;
use tokio::time::Instant;
use tracing::trace;

use bpmlink_core::{
    constants::{timing, MIN_FRAME_LEN, START_MARKER},
    Frame,
};

use crate::{error::Result, Transport};

/// Assembles candidate frames from a [`Transport`]
#[derive(Debug, Clone, Copy)]
pub struct FrameReader {
    read_timeout: Duration,
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new(timing::READ_TIMEOUT)
    }
}

impl FrameReader {
    pub fn new(read_timeout: Duration) -> Self {
        Self { read_timeout }
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Read the next candidate frame
    ///
    /// Returns `Ok(None)` when no start marker arrived within the read
    /// timeout, even if bytes kept coming. Transport errors are returned
    /// as-is.
    pub async fn next_frame<T>(&self, source: &mut T) -> Result<Option<Frame>>
    where
        T: Transport + ?Sized,
    {
        let scan_deadline = Instant::now() + self.read_timeout;

        loop {
            if !self.find_start_marker(source, scan_deadline).await? {
                return Ok(None);
            }

            let length = source.receive(1, self.read_timeout).await?;
            let Some(&length) = length.first() else {
                trace!("No length byte after start marker");
                continue;
            };

            let declared = usize::from(length);
            if declared < MIN_FRAME_LEN {
                trace!(declared, "Discarding candidate with impossible length");
                continue;
            }

            let rest = self.read_exact_within(source, declared - 2).await?;
            if rest.len() < declared - 2 {
                trace!(
                    declared,
                    received = rest.len() + 2,
                    "Discarding short candidate: {:02X?}",
                    &rest[..]
                );
                continue;
            }

            let mut bytes = BytesMut::with_capacity(declared);
            bytes.extend_from_slice(&[START_MARKER, length]);
            bytes.extend_from_slice(&rest);

            trace!("Assembled frame: {:02X?}", &bytes[..]);

            return Ok(Some(Frame::new(bytes.freeze())?));
        }
    }

    /// Skip bytes until the start marker; `false` once `deadline` passes
    async fn find_start_marker<T>(&self, source: &mut T, deadline: Instant) -> Result<bool>
    where
        T: Transport + ?Sized,
    {
        let mut skipped = 0usize;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                if skipped > 0 {
                    trace!(skipped, "No start marker within the read window");
                }
                return Ok(false);
            }

            let byte = source.receive(1, remaining).await?;
            match byte.first() {
                None => {
                    if skipped > 0 {
                        trace!(skipped, "Stream went quiet while scanning");
                    }
                    return Ok(false);
                }
                Some(&START_MARKER) => {
                    if skipped > 0 {
                        trace!(skipped, "Skipped bytes before start marker");
                    }
                    return Ok(true);
                }
                Some(_) => skipped += 1,
            }
        }
    }

    /// Read up to `count` bytes, giving up when the read window closes
    async fn read_exact_within<T>(&self, source: &mut T, count: usize) -> Result<BytesMut>
    where
        T: Transport + ?Sized,
    {
        let deadline = Instant::now() + self.read_timeout;
        let mut buf = BytesMut::with_capacity(count);

        while buf.len() < count {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            let chunk = source.receive(count - buf.len(), remaining).await?;
            if chunk.is_empty() {
                break;
            }
            buf.extend_from_slice(&chunk);
        }

        Ok(buf)
    }
}
