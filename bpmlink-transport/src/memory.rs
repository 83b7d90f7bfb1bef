//! In-memory transport for scripted byte streams
//!
//! A [`MemoryTransport`] replays a queue of data chunks and silences.
//! Cloning yields another handle to the same queue, so a test can keep
//! one handle to script input and inspect what was sent after giving
//! the other to a monitor.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tracing::trace;

use crate::{error::*, Transport};

#[derive(Debug, Clone)]
enum Segment {
    Data(Bytes),
    Silence(Duration),
}

#[derive(Debug, Default)]
struct Inner {
    connected: bool,
    script: VecDeque<Segment>,
    sent: Vec<Bytes>,
    close_when_drained: bool,
    fail_connect: bool,
}

/// Scripted in-memory byte source
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    name: String,
    inner: Arc<Mutex<Inner>>,
}

impl MemoryTransport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Queue bytes the device "sends"
    pub fn push_bytes(&self, data: impl AsRef<[u8]>) -> &Self {
        let data = Bytes::copy_from_slice(data.as_ref());
        if !data.is_empty() {
            self.inner.lock().script.push_back(Segment::Data(data));
        }
        self
    }

    /// Queue a gap during which nothing arrives
    pub fn push_silence(&self, duration: Duration) -> &Self {
        self.inner.lock().script.push_back(Segment::Silence(duration));
        self
    }

    /// Report the port as closed once the script runs out
    pub fn close_when_drained(self) -> Self {
        self.inner.lock().close_when_drained = true;
        self
    }

    /// Make every connect attempt fail
    pub fn failing_connect(self) -> Self {
        self.inner.lock().fail_connect = true;
        self
    }

    /// Everything written so far, one entry per `send`
    pub fn sent(&self) -> Vec<Bytes> {
        self.inner.lock().sent.clone()
    }

    /// Number of data bytes still queued
    pub fn pending_bytes(&self) -> usize {
        self.inner
            .lock()
            .script
            .iter()
            .map(|segment| match segment {
                Segment::Data(data) => data.len(),
                Segment::Silence(_) => 0,
            })
            .sum()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&mut self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.fail_connect {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} unavailable", self.name),
            )));
        }
        if inner.connected {
            return Err(Error::AlreadyConnected);
        }
        inner.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.inner.lock().connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.inner.lock().connected
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.connected {
            return Err(Error::NotConnected);
        }
        trace!("{} <- {:02X?}", self.name, data);
        inner.sent.push(Bytes::copy_from_slice(data));
        Ok(())
    }

    async fn receive(&mut self, max_bytes: usize, timeout: Duration) -> Result<BytesMut> {
        let mut remaining = timeout;

        loop {
            let next = {
                let mut inner = self.inner.lock();
                if !inner.connected {
                    return Err(Error::NotConnected);
                }
                if inner.script.is_empty() && inner.close_when_drained {
                    return Err(Error::ConnectionClosed);
                }
                inner.script.pop_front()
            };

            match next {
                Some(Segment::Data(mut data)) => {
                    let chunk = data.split_to(max_bytes.min(data.len()));
                    if !data.is_empty() {
                        self.inner.lock().script.push_front(Segment::Data(data));
                    }
                    return Ok(BytesMut::from(&chunk[..]));
                }
                Some(Segment::Silence(gap)) if gap > remaining => {
                    self.inner
                        .lock()
                        .script
                        .push_front(Segment::Silence(gap - remaining));
                    tokio::time::sleep(remaining).await;
                    return Ok(BytesMut::new());
                }
                Some(Segment::Silence(gap)) => {
                    tokio::time::sleep(gap).await;
                    remaining -= gap;
                }
                None => {
                    tokio::time::sleep(remaining).await;
                    return Ok(BytesMut::new());
                }
            }
        }
    }

    /// Drops data that has "arrived", i.e. everything before the next silence
    async fn clear_input(&mut self) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.connected {
            return Err(Error::NotConnected);
        }
        while matches!(inner.script.front(), Some(Segment::Data(_))) {
            inner.script.pop_front();
        }
        Ok(())
    }

    fn port_name(&self) -> String {
        self.name.clone()
    }
}
