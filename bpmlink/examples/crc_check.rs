//! Check the CRC of a captured packet
//!
//! Usage: `cargo run --example crc_check -- "5A 08 28 F2 00 69 5D 85"`

use bpmlink_core::crc;

fn main() -> anyhow::Result<()> {
    let input = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if input.trim().is_empty() {
        anyhow::bail!("pass the packet as hex, CRC included");
    }

    let report = crc::inspect_hex(&input)?;
    println!("{}", report);

    if report.matched().is_some() && !report.is_valid_frame_crc() {
        println!("note: frames on the wire carry the CRC big-endian");
    }

    Ok(())
}
