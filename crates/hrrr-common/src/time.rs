//! Local/UTC conversion for the hourly HRRR cycle.
//!
//! The user picks a calendar date and hour in their own timezone; HRRR files
//! are keyed by UTC date (`YYYYMMDD`) and cycle hour (`tHHz`).

use chrono::{
    DateTime, Datelike, Duration, Local, LocalResult, NaiveDate, NaiveDateTime, Offset,
    TimeZone, Timelike, Utc,
};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// How far before a nonexistent local time to look for the pre-transition offset.
const GAP_LOOKBACK_HOURS: i64 = 3;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeParseError {
    #[error("Invalid date format: {0}")]
    InvalidFormat(String),

    #[error("Hour out of range (0-23): {0}")]
    InvalidHour(u32),

    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),
}

/// A UTC date and cycle hour identifying one HRRR analysis file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UtcSlot {
    pub date: NaiveDate,
    pub hour: u32,
}

impl UtcSlot {
    pub fn new(date: NaiveDate, hour: u32) -> Result<Self, TimeParseError> {
        if hour > 23 {
            return Err(TimeParseError::InvalidHour(hour));
        }
        Ok(Self { date, hour })
    }

    /// Date rendered as `YYYYMMDD`.
    pub fn date_stamp(&self) -> String {
        self.date.format("%Y%m%d").to_string()
    }

    /// Hour rendered as `tHHz`.
    pub fn cycle(&self) -> String {
        format_hour(self.hour)
    }

    pub fn datetime(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.date.and_time(Default::default()))
            + Duration::hours(i64::from(self.hour))
    }
}

impl std::fmt::Display for UtcSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.date_stamp(), self.cycle())
    }
}

/// A calendar date and hour in the converter's timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalSlot {
    pub date: NaiveDate,
    pub hour: u32,
}

/// Which timezone rules the converter applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    /// Host timezone
    Local,
    /// Explicit IANA zone
    Named(Tz),
}

/// Converts between local and UTC (date, hour) pairs.
#[derive(Debug, Clone, Copy)]
pub struct TimeConverter {
    zone: Zone,
}

impl Default for TimeConverter {
    fn default() -> Self {
        Self::local()
    }
}

impl TimeConverter {
    /// Converter using the host's timezone.
    pub fn local() -> Self {
        Self { zone: Zone::Local }
    }

    pub fn with_zone(tz: Tz) -> Self {
        Self {
            zone: Zone::Named(tz),
        }
    }

    /// Parse an IANA timezone name such as "America/Denver".
    pub fn from_name(name: &str) -> Result<Self, TimeParseError> {
        let tz: Tz = name
            .parse()
            .map_err(|_| TimeParseError::UnknownTimezone(name.to_string()))?;
        Ok(Self::with_zone(tz))
    }

    pub fn zone(&self) -> Zone {
        self.zone
    }

    /// Convert a local (date, hour) to the UTC file slot.
    ///
    /// The slot is the UTC cycle hour at or before the local instant, so in
    /// zones with a fractional-hour offset (Asia/Kolkata, America/St_Johns)
    /// local 00:00 maps to the file that started half an hour earlier.
    /// Nonexistent local times (spring-forward gap) are pushed forward by the
    /// length of the gap, so they do not round-trip. Ambiguous local times
    /// (fall-back overlap) resolve to the earlier instant.
    pub fn local_to_utc(&self, date: NaiveDate, hour: u32) -> Result<UtcSlot, TimeParseError> {
        if hour > 23 {
            return Err(TimeParseError::InvalidHour(hour));
        }
        let naive = date
            .and_hms_opt(hour, 0, 0)
            .ok_or(TimeParseError::InvalidHour(hour))?;

        let utc = match self.zone {
            Zone::Local => resolve_local(&Local, &naive),
            Zone::Named(tz) => resolve_local(&tz, &naive),
        };

        Ok(UtcSlot {
            date: utc.date(),
            hour: utc.hour(),
        })
    }

    /// Convert a UTC file slot to the local (date, hour) it represents.
    ///
    /// Inverse of [`local_to_utc`](Self::local_to_utc): a local time that is
    /// not on the hour is rounded up to the next whole local hour.
    pub fn utc_to_local(&self, utc_date: NaiveDate, utc_hour: u32) -> Result<LocalSlot, TimeParseError> {
        let slot = UtcSlot::new(utc_date, utc_hour)?;
        let instant = slot.datetime();

        let local = match self.zone {
            Zone::Local => instant.with_timezone(&Local).naive_local(),
            Zone::Named(tz) => instant.with_timezone(&tz).naive_local(),
        };
        let local = ceil_to_hour(local);
        Ok(LocalSlot {
            date: local.date(),
            hour: local.hour(),
        })
    }

    /// String form of [`local_to_utc`](Self::local_to_utc): `YYYY-MM-DD` in, `YYYYMMDD` out.
    pub fn local_str_to_utc(&self, date: &str, hour: u32) -> Result<(String, u32), TimeParseError> {
        let slot = self.local_to_utc(parse_local_date(date)?, hour)?;
        Ok((slot.date_stamp(), slot.hour))
    }

    /// String form of [`utc_to_local`](Self::utc_to_local): `YYYYMMDD` in, `YYYY-MM-DD` out.
    pub fn utc_str_to_local(&self, utc_date: &str, utc_hour: u32) -> Result<(String, u32), TimeParseError> {
        let local = self.utc_to_local(parse_utc_date(utc_date)?, utc_hour)?;
        Ok((local.date.format("%Y-%m-%d").to_string(), local.hour))
    }

    /// Today's calendar date in this timezone.
    pub fn today(&self) -> NaiveDate {
        match self.zone {
            Zone::Local => Local::now().date_naive(),
            Zone::Named(tz) => Utc::now().with_timezone(&tz).date_naive(),
        }
    }

    /// Short zone label for the hour display, e.g. "EST" or "UTC-7".
    ///
    /// The host zone has a name only when `TZ` holds an IANA zone; otherwise
    /// the label falls back to the current UTC offset.
    pub fn abbreviation(&self) -> String {
        let tz = match self.zone {
            Zone::Named(tz) => Some(tz),
            Zone::Local => std::env::var("TZ")
                .ok()
                .and_then(|name| name.trim_start_matches(':').parse::<Tz>().ok()),
        };
        match tz {
            Some(tz) => Utc::now().with_timezone(&tz).format("%Z").to_string(),
            None => offset_label(Local::now().offset().fix().local_minus_utc()),
        }
    }
}

/// `UTC+5.5` style label for an offset in seconds.
fn offset_label(seconds: i32) -> String {
    let hours = f64::from(seconds) / 3600.0;
    let sign = if hours >= 0.0 { "+" } else { "-" };
    format!("UTC{}{}", sign, hours.abs())
}

fn ceil_to_hour(dt: NaiveDateTime) -> NaiveDateTime {
    let into_hour = i64::from(dt.minute() * 60 + dt.second());
    if into_hour == 0 {
        dt
    } else {
        dt + Duration::seconds(3600 - into_hour)
    }
}

fn resolve_local<Z: TimeZone>(tz: &Z, naive: &NaiveDateTime) -> NaiveDateTime {
    match tz.from_local_datetime(naive) {
        LocalResult::Single(dt) => dt.naive_utc(),
        LocalResult::Ambiguous(earliest, _) => earliest.naive_utc(),
        LocalResult::None => {
            // inside a DST gap: apply the offset in force just before it
            let before = *naive - Duration::hours(GAP_LOOKBACK_HOURS);
            let offset = tz
                .offset_from_local_datetime(&before)
                .earliest()
                .map(|o| o.fix())
                .unwrap_or_else(|| Utc.fix());
            *naive - Duration::seconds(i64::from(offset.local_minus_utc()))
        }
    }
}

/// Parse a `YYYY-MM-DD` calendar date.
pub fn parse_local_date(s: &str) -> Result<NaiveDate, TimeParseError> {
    parse_fixed(s, "%Y-%m-%d", &[4, 7])
}

/// Parse a `YYYYMMDD` date stamp.
pub fn parse_utc_date(s: &str) -> Result<NaiveDate, TimeParseError> {
    parse_fixed(s, "%Y%m%d", &[])
}

/// chrono alone accepts unpadded fields and signed years, so the shape is
/// checked first: digits everywhere except `-` at `dashes`.
fn parse_fixed(s: &str, format: &str, dashes: &[usize]) -> Result<NaiveDate, TimeParseError> {
    let invalid = || TimeParseError::InvalidFormat(s.to_string());
    let shape_ok = s.len() == 8 + dashes.len()
        && s.bytes().enumerate().all(|(i, b)| {
            if dashes.contains(&i) {
                b == b'-'
            } else {
                b.is_ascii_digit()
            }
        });
    if !shape_ok {
        return Err(invalid());
    }
    NaiveDate::parse_from_str(s, format).map_err(|_| invalid())
}

/// `YYYY-MM-DD` form used by date pickers and the query string.
pub fn format_local_date(date: NaiveDate) -> String {
    format!("{:04}-{:02}-{:02}", date.year(), date.month(), date.day())
}

/// Hour as the HRRR cycle token, e.g. `t05z`.
pub fn format_hour(hour: u32) -> String {
    format!("t{:02}z", hour)
}

/// Hour as a 24-hour clock label, e.g. `05:00`.
pub fn format_local_hour(hour: u32) -> String {
    format!("{:02}:00", hour)
}
