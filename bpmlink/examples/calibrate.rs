//! Calibration walk-through
//!
//! Usage: `BPM_PORT=/dev/ttyUSB0 cargo run --example calibrate -- <prefill> <actual>`

use std::time::Duration;

use anyhow::{bail, Context};
use bpmlink::{Monitor, MonitorConfig, SessionEvent};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut args = std::env::args().skip(1);
    let prefill: u16 = args
        .next()
        .context("missing pre-fill pressure")?
        .parse()
        .context("pre-fill pressure must be a number")?;
    let actual: u16 = args
        .next()
        .context("missing reference pressure")?
        .parse()
        .context("reference pressure must be a number")?;

    let port = std::env::var("BPM_PORT").unwrap_or_else(|_| "/dev/ttyUSB0".to_string());
    let mut monitor = Monitor::serial(port, MonitorConfig::default());
    monitor.connect().await?;

    monitor.start_calibration(prefill).await?;
    expect_ack(&mut monitor, "START_CALIBRATION").await?;

    monitor.set_calibration_pressure(actual).await?;
    expect_ack(&mut monitor, "SET_CALIBRATION_PRESSURE").await?;

    println!("✓ Calibrated: {} mmHg pre-fill, {} mmHg reference", prefill, actual);

    monitor.disconnect().await?;
    Ok(())
}

async fn expect_ack(monitor: &mut Monitor, step: &str) -> anyhow::Result<()> {
    match monitor.await_response(Duration::from_secs(5)).await? {
        Some(SessionEvent::ExecutionResult { status, .. }) if status.is_success() => {
            println!("✓ {}: {}", step, status);
            Ok(())
        }
        Some(SessionEvent::ExecutionResult { status, .. }) => {
            monitor.cancel_calibration().await?;
            bail!("{} rejected: {}", step, status)
        }
        Some(other) => bail!("{} answered with {:?}", step, other),
        None => bail!("{} not acknowledged", step),
    }
}
