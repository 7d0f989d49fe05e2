use std::{fmt, str::FromStr};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::Error;

pub const MINUTES_PER_DAY: u16 = 24 * 60;

/// A time of day stored as minutes since midnight.
///
/// `24:00` is accepted so an event may end exactly at midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClockTime(u16);

impl ClockTime {
    pub const END_OF_DAY: ClockTime = ClockTime(MINUTES_PER_DAY);
    /// Default cut-off after which a DJ event occupies the whole day.
    pub const DAY_THRESHOLD: ClockTime = ClockTime(11 * 60);

    pub fn from_minutes(minutes: u16) -> Result<Self, Error> {
        if minutes > MINUTES_PER_DAY {
            return Err(Error::InvalidTime(format!("{} minutes past midnight", minutes)));
        }
        Ok(Self(minutes))
    }

    pub fn from_hm(hour: u16, minute: u16) -> Result<Self, Error> {
        if hour > 24 || minute > 59 || (hour == 24 && minute != 0) {
            return Err(Error::InvalidTime(format!("{:02}:{:02}", hour, minute)));
        }
        Ok(Self(hour * 60 + minute))
    }

    pub const fn minutes(self) -> u16 {
        self.0
    }

    /// Signed minutes from `self` until `later`. Negative when `later` is earlier.
    pub fn minutes_until(self, later: ClockTime) -> i32 {
        i32::from(later.0) - i32::from(self.0)
    }
}

impl FromStr for ClockTime {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidTime(s.to_string());
        let mut parts = s.trim().split(':');
        let (hour, minute) = match (parts.next(), parts.next()) {
            (Some(h), Some(m)) => (h, m),
            _ => return Err(invalid()),
        };
        if let Some(second) = parts.next() {
            let valid = second.len() == 2
                && digits(second)
                && second.parse::<u8>().map(|v| v < 60).unwrap_or(false);
            if !valid || parts.next().is_some() {
                return Err(invalid());
            }
        }
        if hour.is_empty() || hour.len() > 2 || minute.len() != 2 || !digits(hour) || !digits(minute) {
            return Err(invalid());
        }
        let hour: u16 = hour.parse().map_err(|_| invalid())?;
        let minute: u16 = minute.parse().map_err(|_| invalid())?;
        Self::from_hm(hour, minute).map_err(|_| invalid())
    }
}

fn digits(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit())
}

impl TryFrom<String> for ClockTime {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ClockTime> for String {
    fn from(t: ClockTime) -> Self {
        t.to_string()
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

/// A same-day interval with `end > start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTimeRange")]
pub struct TimeRange {
    pub start: ClockTime,
    pub end: ClockTime,
}

#[derive(Deserialize)]
struct RawTimeRange {
    start: ClockTime,
    end: ClockTime,
}

impl TryFrom<RawTimeRange> for TimeRange {
    type Error = Error;

    fn try_from(raw: RawTimeRange) -> Result<Self, Self::Error> {
        TimeRange::new(raw.start, raw.end)
    }
}

impl TimeRange {
    pub fn new(start: ClockTime, end: ClockTime) -> Result<Self, Error> {
        if end <= start {
            return Err(Error::InvalidTimeRange(format!("{} - {}", start, end)));
        }
        Ok(Self { start, end })
    }

    pub fn parse(start: &str, end: &str) -> Result<Self, Error> {
        Self::new(start.parse()?, end.parse()?)
    }

    pub fn duration_minutes(&self) -> u16 {
        self.end.minutes() - self.start.minutes()
    }

    pub fn hours(&self) -> f64 {
        hours_between(self.start, self.end)
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Minutes between the end of one event and the start of the next.
pub fn gap_minutes(earlier_end: ClockTime, later_start: ClockTime) -> i32 {
    earlier_end.minutes_until(later_start)
}

pub fn hours_between(start: ClockTime, end: ClockTime) -> f64 {
    f64::from(start.minutes_until(end)) / 60.0
}

/// Render a minute count as hours with one decimal, e.g. `120 -> "2.0"`.
pub fn format_hours(minutes: i32) -> String {
    format!("{:.1}", f64::from(minutes) / 60.0)
}

pub fn parse_date(s: &str) -> Result<NaiveDate, Error> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| Error::InvalidDate(s.to_string()))
}

/// Every calendar day of the given month, in order.
pub fn month_days(year: i32, month: u32) -> Result<Vec<NaiveDate>, Error> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| Error::InvalidDate(format!("{:04}-{:02}", year, month)))?;
    Ok(first
        .iter_days()
        .take_while(|d| d.month() == month)
        .collect())
}
