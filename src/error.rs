use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// A target time that is not a valid `HH.MM` string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid time {input:?}: {issue}; enter the time as HH.MM")]
pub struct InvalidTimeFormat {
    input: String,
    issue: TimeFormatIssue,
}

impl InvalidTimeFormat {
    pub(crate) fn new(input: &str, issue: TimeFormatIssue) -> Self {
        Self {
            input: input.to_string(),
            issue,
        }
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn issue(&self) -> TimeFormatIssue {
        self.issue
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeFormatIssue {
    /// Not exactly two dot-separated parts.
    WrongShape,
    /// A part is empty or holds something other than ASCII digits.
    NotDigits,
    HourOutOfRange,
    MinuteOutOfRange,
}

impl fmt::Display for TimeFormatIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::WrongShape => "expected two parts separated by a dot",
            Self::NotDigits => "hour and minute must be digits only",
            Self::HourOutOfRange => "hour must be between 0 and 23",
            Self::MinuteOutOfRange => "minute must be between 0 and 59",
        })
    }
}

/// Failures along the power action chain.
///
/// The first two are recovered by falling back to the OS command; only
/// `FallbackActionFailed` ends the chain.
#[derive(Debug, Error)]
pub enum PowerError {
    #[error("primary shutdown script {} not found", .0.display())]
    PrimaryActionMissing(PathBuf),

    #[error("primary shutdown script {} failed: {detail}", .path.display())]
    PrimaryActionFailed { path: PathBuf, detail: String },

    #[error("power command `{command}` failed: {detail}")]
    FallbackActionFailed { command: String, detail: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("the power action already ran; a new schedule needs a new scheduler")]
    AlreadyFired,
}
