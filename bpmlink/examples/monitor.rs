//! Continuous measurement loop
//!
//! Uses the port in `BPM_PORT`, or probes every serial port for a
//! streaming monitor. Log level comes from `RUST_LOG`.

use std::time::Duration;

use anyhow::Context;
use bpmlink::{probe_serial_ports, Monitor, MonitorConfig, SessionEvent};
use bpmlink_core::constants::timing;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = MonitorConfig::default();

    let (mut monitor, usb_ids) = match std::env::var("BPM_PORT") {
        Ok(port) => (Monitor::serial(port, config), None),
        Err(_) => {
            println!("Probing serial ports...");
            let (transport, port) = probe_serial_ports(config.baud_rate, timing::PROBE_WINDOW)
                .await
                .context("no monitor found, set BPM_PORT to pick a port")?;
            let ids = port.vid.zip(port.pid);
            (Monitor::with_transport(transport, config), ids)
        }
    };

    if !monitor.is_connected() {
        monitor.connect_with_retry().await?;
    }
    println!("✓ Connected to {}", monitor.port_name());

    if let Some((vid, pid)) = usb_ids {
        match monitor.auto_assign_id(vid, pid).await {
            Ok(id) => println!("✓ Device ID: {}", id),
            Err(e) => println!("⚠ Device ID handshake failed: {}", e),
        }
    }

    loop {
        if let Err(e) = measure_once(&mut monitor).await {
            if !e.requires_reconnect() {
                return Err(e.into());
            }
            println!("⚠ {}, reconnecting...", e);
            tokio::time::sleep(Duration::from_secs(1)).await;
            monitor.connect_with_retry().await?;
        }
    }
}

async fn measure_once(monitor: &mut Monitor) -> bpmlink::Result<()> {
    monitor.start_measurement().await?;

    loop {
        match monitor.next_event().await? {
            SessionEvent::Pressure { mmhg } => println!("  cuff {:>3} mmHg", mmhg),
            SessionEvent::MeasurementComplete(m) => {
                println!("✓ {}", m);
                return Ok(());
            }
            SessionEvent::DeviceError(code) => {
                println!("✗ Device error {}", code);
                return Ok(());
            }
            SessionEvent::EmergencyStop => {
                println!("✗ Realtime data stopped, measurement aborted");
                return Ok(());
            }
            other => println!("  {:?}", other),
        }
    }
}
