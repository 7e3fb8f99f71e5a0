//! MS-DOS date/time stamps as stored in ZIP headers.
//!
//! ZIP headers store the last-modification time of an entry as two 16-bit
//! MS-DOS fields:
//!
//! - time: `hour << 11 | minute << 5 | second / 2`
//! - date: `(year - 1980) << 9 | month << 5 | day`
//!
//! The representable range is 1980-01-01 00:00:00 to 2107-12-31 23:59:58
//! with two-second resolution and no time zone. Conversions from
//! [`SystemTime`] interpret the instant as UTC and clamp to that range.
//!
//! Packaging pipelines usually want reproducible output, so the default
//! stamp is [`DosDateTime::EPOCH`] rather than the current time.
//!
//! # Example
//!
//! ```rust
//! use zipmend::DosDateTime;
//!
//! let stamp = DosDateTime::from_unix_secs(1_700_000_000);
//! assert_eq!(stamp.year(), 2023);
//! assert_eq!((stamp.month(), stamp.day()), (11, 14));
//! assert_eq!(DosDateTime::from_fields(stamp.time(), stamp.date()), stamp);
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds between the Unix epoch and 1980-01-01T00:00:00Z.
const DOS_EPOCH_UNIX_SECS: i64 = 315_532_800;

/// Last representable instant, 2107-12-31T23:59:58Z.
const DOS_MAX_UNIX_SECS: i64 = 4_354_819_198;

const SECONDS_PER_DAY: i64 = 86_400;

/// A last-modified stamp in MS-DOS format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DosDateTime {
    time: u16,
    date: u16,
}

impl DosDateTime {
    /// 1980-01-01 00:00:00, the earliest representable stamp.
    pub const EPOCH: Self = Self {
        time: 0,
        date: (1 << 5) | 1,
    };

    /// Wraps raw header fields without validation.
    #[inline]
    pub const fn from_fields(time: u16, date: u16) -> Self {
        Self { time, date }
    }

    /// Converts Unix seconds (UTC), clamping to the DOS range.
    pub fn from_unix_secs(secs: i64) -> Self {
        let secs = secs.clamp(DOS_EPOCH_UNIX_SECS, DOS_MAX_UNIX_SECS);
        let days = secs.div_euclid(SECONDS_PER_DAY);
        let rem = secs.rem_euclid(SECONDS_PER_DAY);
        let (year, month, day) = civil_from_days(days);

        let hour = (rem / 3600) as u16;
        let minute = ((rem % 3600) / 60) as u16;
        let second = (rem % 60) as u16;

        Self {
            time: (hour << 11) | (minute << 5) | (second / 2),
            date: (((year - 1980) as u16) << 9) | ((month as u16) << 5) | day as u16,
        }
    }

    /// Converts a [`SystemTime`], clamping to the DOS range.
    pub fn from_system_time(time: SystemTime) -> Self {
        let secs = match time.duration_since(UNIX_EPOCH) {
            Ok(d) => i64::try_from(d.as_secs()).unwrap_or(i64::MAX),
            Err(e) => -i64::try_from(e.duration().as_secs()).unwrap_or(i64::MAX),
        };
        Self::from_unix_secs(secs)
    }

    /// Converts back to Unix seconds (UTC).
    ///
    /// Out-of-range field values (month 0, day 0) are treated as 1.
    pub fn to_unix_secs(&self) -> i64 {
        let days = days_from_civil(
            i64::from(self.year()),
            u32::from(self.month().max(1)),
            u32::from(self.day().max(1)),
        );
        days * SECONDS_PER_DAY
            + i64::from(self.hour()) * 3600
            + i64::from(self.minute()) * 60
            + i64::from(self.second())
    }

    /// Raw time field as stored in headers.
    #[inline]
    pub const fn time(&self) -> u16 {
        self.time
    }

    /// Raw date field as stored in headers.
    #[inline]
    pub const fn date(&self) -> u16 {
        self.date
    }

    /// Calendar year (1980-2107).
    pub fn year(&self) -> u16 {
        ((self.date >> 9) & 0x7F) + 1980
    }

    /// Month (1-12).
    pub fn month(&self) -> u8 {
        ((self.date >> 5) & 0x0F) as u8
    }

    /// Day of month (1-31).
    pub fn day(&self) -> u8 {
        (self.date & 0x1F) as u8
    }

    /// Hour (0-23).
    pub fn hour(&self) -> u8 {
        ((self.time >> 11) & 0x1F) as u8
    }

    /// Minute (0-59).
    pub fn minute(&self) -> u8 {
        ((self.time >> 5) & 0x3F) as u8
    }

    /// Second, always even (0-58).
    pub fn second(&self) -> u8 {
        ((self.time & 0x1F) * 2) as u8
    }
}

impl Default for DosDateTime {
    fn default() -> Self {
        Self::EPOCH
    }
}

impl From<SystemTime> for DosDateTime {
    fn from(time: SystemTime) -> Self {
        Self::from_system_time(time)
    }
}

// Proleptic Gregorian conversions (days relative to 1970-01-01).
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let year = if month <= 2 { year - 1 } else { year };
    let era = year.div_euclid(400);
    let yoe = year.rem_euclid(400);
    let month = i64::from(month);
    let mp = if month > 2 { month - 3 } else { month + 9 };
    let doy = (153 * mp + 2) / 5 + i64::from(day) - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_epoch_fields() {
        let epoch = DosDateTime::EPOCH;
        assert_eq!(epoch.date(), 0x0021);
        assert_eq!(epoch.time(), 0);
        assert_eq!((epoch.year(), epoch.month(), epoch.day()), (1980, 1, 1));
        assert_eq!(epoch.to_unix_secs(), DOS_EPOCH_UNIX_SECS);
    }

    #[test]
    fn test_default_is_epoch() {
        assert_eq!(DosDateTime::default(), DosDateTime::EPOCH);
    }

    #[test]
    fn test_from_unix_secs() {
        // 2023-11-14T22:13:20Z
        let stamp = DosDateTime::from_unix_secs(1_700_000_000);
        assert_eq!((stamp.year(), stamp.month(), stamp.day()), (2023, 11, 14));
        assert_eq!((stamp.hour(), stamp.minute(), stamp.second()), (22, 13, 20));
        assert_eq!(stamp.to_unix_secs(), 1_700_000_000);
    }

    #[test]
    fn test_odd_seconds_round_down() {
        let stamp = DosDateTime::from_unix_secs(1_700_000_001);
        assert_eq!(stamp.second(), 20);
        assert_eq!(stamp.to_unix_secs(), 1_700_000_000);
    }

    #[test]
    fn test_clamps_out_of_range() {
        assert_eq!(DosDateTime::from_unix_secs(0), DosDateTime::EPOCH);
        let max = DosDateTime::from_unix_secs(i64::MAX);
        assert_eq!((max.year(), max.month(), max.day()), (2107, 12, 31));
        assert_eq!((max.hour(), max.minute(), max.second()), (23, 59, 58));
    }

    #[test]
    fn test_leap_day() {
        // 2024-02-29T12:00:00Z
        let stamp = DosDateTime::from_unix_secs(1_709_208_000);
        assert_eq!((stamp.year(), stamp.month(), stamp.day()), (2024, 2, 29));
        assert_eq!(stamp.hour(), 12);
    }

    #[test]
    fn test_from_system_time() {
        let time = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        assert_eq!(
            DosDateTime::from(time),
            DosDateTime::from_unix_secs(1_700_000_000)
        );
        let before = UNIX_EPOCH - Duration::from_secs(10);
        assert_eq!(DosDateTime::from_system_time(before), DosDateTime::EPOCH);
    }
}
