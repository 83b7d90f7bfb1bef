//! Blood-pressure measurement records

use std::fmt;

use chrono::{Local, NaiveDate, NaiveDateTime};

/// Calendar fields exactly as the device reported them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceTimestamp {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
}

impl DeviceTimestamp {
    pub fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            minute,
        }
    }

    /// Interpret the fields as a calendar date/time
    ///
    /// Returns `None` when the fields do not form a valid date (month 13,
    /// February 30th, hour 24, year 0, ...).
    pub fn to_datetime(&self) -> Option<NaiveDateTime> {
        if self.year == 0 {
            return None;
        }

        NaiveDate::from_ymd_opt(
            i32::from(self.year),
            u32::from(self.month),
            u32::from(self.day),
        )?
        .and_hms_opt(u32::from(self.hour), u32::from(self.minute), 0)
    }

    /// Resolve to a datetime, falling back to the local wall clock
    pub fn resolve(&self) -> NaiveDateTime {
        self.to_datetime()
            .unwrap_or_else(|| Local::now().naive_local())
    }
}

/// A completed measurement
///
/// `taken_at` is the device timestamp when it is a valid calendar value,
/// otherwise the host time at which the result was decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Measurement {
    /// Systolic pressure (mmHg)
    pub systolic: u16,

    /// Diastolic pressure (mmHg)
    pub diastolic: u16,

    /// Mean arterial pressure (mmHg)
    pub mean: u16,

    /// Heart rate (beats per minute)
    pub heart_rate: u16,

    /// Raw timestamp fields from the device
    pub stamp: DeviceTimestamp,

    /// Effective measurement time
    pub taken_at: NaiveDateTime,
}

impl Measurement {
    pub fn new(
        systolic: u16,
        diastolic: u16,
        mean: u16,
        heart_rate: u16,
        stamp: DeviceTimestamp,
    ) -> Self {
        Self {
            systolic,
            diastolic,
            mean,
            heart_rate,
            stamp,
            taken_at: stamp.resolve(),
        }
    }

    /// True when the device timestamp was unusable and `taken_at` is host time
    pub fn clock_fallback(&self) -> bool {
        self.stamp.to_datetime().is_none()
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} mmHg (mean {}), HR {} bpm at {}",
            self.systolic,
            self.diastolic,
            self.mean,
            self.heart_rate,
            self.taken_at.format("%Y-%m-%d %H:%M")
        )
    }
}
