//! Serial port discovery
//!
//! Monitors stream data as soon as they are powered, so a port is
//! considered to host one when a start marker shows up on it within a
//! short listening window.

use std::collections::HashMap;
#[cfg(target_os = "linux")]
use std::fs;
use std::time::Duration;

use serialport::{SerialPortInfo, SerialPortType};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, trace};

use bpmlink_core::constants::START_MARKER;
use bpmlink_types::DeviceId;

use crate::{
    error::{Error, Result},
    serial::SerialTransport,
    Transport,
};

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Manufacturer name (if available)
    pub manufacturer: Option<String>,

    /// Product name (if available)
    pub product: Option<String>,

    /// Serial number (if available)
    pub serial_number: Option<String>,
}

impl PortInfo {
    fn bare(name: String) -> Self {
        Self {
            name,
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial_number: None,
        }
    }

    /// Device ID assigned to a monitor found on this port
    ///
    /// Ports without USB descriptors fall back to zeroed IDs.
    pub fn auto_device_id(&self) -> String {
        DeviceId::for_usb(self.vid.unwrap_or(0), self.pid.unwrap_or(0))
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb) => Self {
                name: info.port_name,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                manufacturer: usb.manufacturer,
                product: usb.product,
                serial_number: usb.serial_number,
            },
            _ => Self::bare(info.port_name),
        }
    }
}

/// USB serial adapters first (ttyUSB*, then ttyACM*), numerically, then the rest by name
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    if let Some(rest) = basename.strip_prefix("ttyUSB") {
        return (0, rest.parse().unwrap_or(usize::MAX), basename.to_string());
    }
    if let Some(rest) = basename.strip_prefix("ttyACM") {
        return (1, rest.parse().unwrap_or(usize::MAX), basename.to_string());
    }
    if let Some(rest) = basename.strip_prefix("COM") {
        if let Ok(num) = rest.parse() {
            return (2, num, basename.to_string());
        }
    }
    (3, 0, basename.to_string())
}

/// List serial ports in a deterministic order
pub fn list_ports() -> Vec<PortInfo> {
    let mut ports: HashMap<String, PortInfo> = HashMap::new();

    match serialport::available_ports() {
        Ok(found) => {
            for info in found {
                let port = PortInfo::from(info);
                ports.entry(port.name.clone()).or_insert(port);
            }
        }
        Err(e) => debug!("Port enumeration failed: {}", e),
    }

    // Enumeration can miss USB adapters without udev metadata
    #[cfg(target_os = "linux")]
    if let Ok(entries) = fs::read_dir("/dev") {
        for entry in entries.flatten() {
            if let Some(fname) = entry.file_name().to_str() {
                if fname.starts_with("ttyUSB") || fname.starts_with("ttyACM") {
                    let full = format!("/dev/{}", fname);
                    ports
                        .entry(full.clone())
                        .or_insert_with(|| PortInfo::bare(full));
                }
            }
        }
    }

    let mut ports: Vec<PortInfo> = ports.into_values().collect();
    ports.sort_by_key(|p| port_sort_key(&p.name));
    ports
}

/// Listen on one candidate until it shows a start marker or the window closes
///
/// A candidate that loses, times out or is cancelled closes its port
/// before returning.
async fn listen<T: Transport>(
    mut transport: T,
    window: Duration,
    mut cancel: watch::Receiver<bool>,
) -> Option<T> {
    if let Err(e) = transport.connect().await {
        debug!("Cannot open {}: {}", transport.port_name(), e);
        return None;
    }

    let deadline = Instant::now() + window;

    let found = loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            debug!("No start marker on {}", transport.port_name());
            break false;
        }

        tokio::select! {
            read = transport.receive(1, remaining) => match read {
                Ok(byte) if byte.first() == Some(&START_MARKER) => break true,
                Ok(_) => {}
                Err(e) => {
                    debug!("Probe of {} failed: {}", transport.port_name(), e);
                    break false;
                }
            },
            _ = cancel.changed() => {
                trace!("Probe of {} cancelled", transport.port_name());
                break false;
            }
        }
    };

    if found {
        return Some(transport);
    }

    close_candidate(&mut transport).await;
    None
}

async fn close_candidate<T: Transport>(transport: &mut T) {
    if let Err(e) = transport.disconnect().await {
        debug!("Closing {} failed: {}", transport.port_name(), e);
    }
}

/// Probe candidates concurrently and keep the first that shows a start marker
///
/// The winner is returned connected. Every other candidate is stopped and
/// disconnected before this returns.
pub async fn probe_first<T>(candidates: Vec<T>, window: Duration) -> Option<T>
where
    T: Transport + 'static,
{
    let (cancel_tx, cancel_rx) = watch::channel(false);

    let mut probes = JoinSet::new();
    for candidate in candidates {
        probes.spawn(listen(candidate, window, cancel_rx.clone()));
    }
    drop(cancel_rx);

    let mut winner: Option<T> = None;

    while let Some(joined) = probes.join_next().await {
        match joined {
            Ok(Some(transport)) if winner.is_none() => {
                cancel_tx.send_replace(true);
                winner = Some(transport);
            }
            Ok(Some(mut transport)) => {
                debug!("Dropping late detection on {}", transport.port_name());
                close_candidate(&mut transport).await;
            }
            Ok(None) => {}
            Err(e) => debug!("Probe task failed: {}", e),
        }
    }

    winner
}

/// Find the serial port a monitor is streaming on
pub async fn probe_serial_ports(
    baud_rate: u32,
    window: Duration,
) -> Result<(SerialTransport, PortInfo)> {
    let ports = list_ports();
    debug!("Probing {} serial port(s)", ports.len());

    let candidates: Vec<SerialTransport> = ports
        .iter()
        .map(|port| SerialTransport::new(port.name.clone(), baud_rate))
        .collect();

    let transport = probe_first(candidates, window)
        .await
        .ok_or(Error::NoDeviceDetected { ports: ports.len() })?;

    let name = transport.port_name();
    let port = ports
        .into_iter()
        .find(|port| port.name == name)
        .unwrap_or_else(|| PortInfo::bare(name));

    info!("Monitor detected on {}", port.name);

    Ok((transport, port))
}
