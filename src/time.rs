//! Minute-granularity time of day.
//!
//! Targets are entered as `HH.MM` and compared against the wall clock with
//! seconds discarded, so everything here works on whole minutes within a
//! single day. Dates are never tracked.

use std::fmt;
use std::str::FromStr;

use config_model::{MINUTES_PER_DAY, UrgencyConfig};

use crate::error::{InvalidTimeFormat, TimeFormatIssue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    pub const MIDNIGHT: Self = Self { hour: 0, minute: 0 };

    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        if hour > 23 || minute > 59 {
            return None;
        }
        Some(Self {
            hour: hour as u8,
            minute: minute as u8,
        })
    }

    /// Parses a user supplied `HH.MM` string.
    ///
    /// Both parts must be non-empty runs of ASCII digits; leading zeros are
    /// fine ("09.05", "9.5" and "0009.05" all mean 9:05). Nothing else is
    /// tolerated, including surrounding whitespace or a sign.
    pub fn parse(raw: &str) -> Result<Self, InvalidTimeFormat> {
        let invalid = |issue| InvalidTimeFormat::new(raw, issue);

        let mut parts = raw.split('.');
        let (Some(hour), Some(minute), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(invalid(TimeFormatIssue::WrongShape));
        };

        let hour = parse_digits(hour).ok_or_else(|| invalid(TimeFormatIssue::NotDigits))?;
        let minute = parse_digits(minute).ok_or_else(|| invalid(TimeFormatIssue::NotDigits))?;

        if hour > 23 {
            return Err(invalid(TimeFormatIssue::HourOutOfRange));
        }
        if minute > 59 {
            return Err(invalid(TimeFormatIssue::MinuteOutOfRange));
        }

        Ok(Self {
            hour: hour as u8,
            minute: minute as u8,
        })
    }

    pub fn hour(self) -> u32 {
        u32::from(self.hour)
    }

    pub fn minute(self) -> u32 {
        u32::from(self.minute)
    }

    /// Minutes elapsed since midnight.
    pub fn minute_of_day(self) -> u32 {
        self.hour() * 60 + self.minute()
    }

    fn from_minute_of_day(minutes: u32) -> Self {
        let minutes = minutes % MINUTES_PER_DAY;
        Self {
            hour: (minutes / 60) as u8,
            minute: (minutes % 60) as u8,
        }
    }

    /// Moves `n` minutes back, wrapping past midnight into the previous evening.
    ///
    /// `00.01` minus 2 minutes is `23.59`.
    pub fn minus_minutes(self, n: u32) -> Self {
        let back = n % MINUTES_PER_DAY;
        Self::from_minute_of_day(self.minute_of_day() + MINUTES_PER_DAY - back)
    }

    /// Moves `n` minutes forward, wrapping past midnight.
    pub fn plus_minutes(self, n: u32) -> Self {
        Self::from_minute_of_day(self.minute_of_day() + n % MINUTES_PER_DAY)
    }

    /// Minutes from `self` forward to `target`, wrapping at midnight.
    ///
    /// Returns 0 when both are equal, so a target just behind `self`
    /// reads as almost a full day away.
    pub fn minutes_until(self, target: Self) -> u32 {
        (target.minute_of_day() + MINUTES_PER_DAY - self.minute_of_day()) % MINUTES_PER_DAY
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}.{:02}", self.hour, self.minute)
    }
}

impl FromStr for TimeOfDay {
    type Err = InvalidTimeFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// Any digit run is accepted; values that do not fit saturate so the range
// check reports them instead of an overflow.
fn parse_digits(part: &str) -> Option<u32> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(part.bytes().fold(0u32, |acc, b| {
        acc.saturating_mul(10).saturating_add(u32::from(b - b'0'))
    }))
}

/// How close the countdown is to the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Urgency {
    Normal,
    Soon,
    Near,
    Imminent,
}

impl Urgency {
    pub fn from_remaining(minutes: u32, bands: &UrgencyConfig) -> Self {
        if minutes <= bands.imminent_minutes {
            Self::Imminent
        } else if minutes <= bands.near_minutes {
            Self::Near
        } else if minutes <= bands.soon_minutes {
            Self::Soon
        } else {
            Self::Normal
        }
    }
}

/// Formats a minute count the way the countdown shows it: `HH:MM`.
pub fn format_remaining(minutes: u32) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}
