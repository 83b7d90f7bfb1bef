//! Device identifier

use std::fmt;

/// Fixed length of a device ID on the wire
pub const DEVICE_ID_LEN: usize = 12;

/// Device identifier as reported by the monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceId {
    raw: Vec<u8>,
    ascii: String,
}

impl DeviceId {
    /// Build from the raw payload bytes
    ///
    /// Non-ASCII bytes are replaced with U+FFFD and trailing NUL padding
    /// is trimmed from the text form. The raw bytes are kept untouched.
    pub fn from_raw(raw: impl Into<Vec<u8>>) -> Self {
        let raw = raw.into();
        let ascii: String = raw
            .iter()
            .map(|&b| if b.is_ascii() { b as char } else { char::REPLACEMENT_CHARACTER })
            .collect::<String>()
            .trim_end_matches('\0')
            .to_string();

        Self { raw, ascii }
    }

    /// Raw payload bytes
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Text form
    pub fn as_str(&self) -> &str {
        &self.ascii
    }

    /// Auto-assigned ID derived from the USB bridge identity
    ///
    /// `bpm_` plus the 4-digit hex VID and PID is exactly twelve characters,
    /// so it survives the wire truncation intact.
    pub fn for_usb(vid: u16, pid: u16) -> String {
        format!("bpm_{:04x}{:04x}", vid, pid)
    }

    /// Wire form of an ID string
    ///
    /// Non-ASCII characters are dropped, the rest truncated to
    /// [`DEVICE_ID_LEN`] bytes and right-padded with zeros.
    pub fn wire_bytes(text: &str) -> [u8; DEVICE_ID_LEN] {
        let mut out = [0u8; DEVICE_ID_LEN];
        for (slot, b) in out
            .iter_mut()
            .zip(text.chars().filter(char::is_ascii).map(|c| c as u8))
        {
            *slot = b;
        }
        out
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.ascii)
    }
}
