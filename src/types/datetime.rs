//! Millisecond-resolution datetimes and durations.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use chrono::{DateTime, NaiveDate};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::error::EvalError;

const MS_PER_SECOND: i64 = 1_000;
const MS_PER_MINUTE: i64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;
const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;

static DATETIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^([0-9]{4})-([0-9]{2})-([0-9]{2})(?:T([0-9]{2}):([0-9]{2}):([0-9]{2})(?:\.([0-9]{3}))?(Z|[+-][0-9]{4}))?$",
    )
    .expect("datetime pattern must compile")
});

static DURATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(-)?(?:([0-9]+)d)?(?:([0-9]+)h)?(?:([0-9]+)m)?(?:([0-9]+)s)?(?:([0-9]+)ms)?$")
        .expect("duration pattern must compile")
});

/// Milliseconds since the Unix epoch, UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Datetime(i64);

/// A signed span of milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Duration(i64);

fn invalid(function: &str, input: &str, message: &str) -> EvalError {
    EvalError::InvalidExtensionArgument {
        function: function.to_string(),
        message: format!("{input:?}: {message}"),
    }
}

fn overflow(op: &str, operands: &[i64]) -> EvalError {
    EvalError::overflow(op, operands)
}

fn number(caps: &Captures<'_>, idx: usize) -> Option<i64> {
    caps.get(idx).and_then(|m| m.as_str().parse().ok())
}

impl Datetime {
    pub fn from_millis(ms: i64) -> Self {
        Datetime(ms)
    }

    pub fn millis(&self) -> i64 {
        self.0
    }

    pub fn offset(&self, by: Duration) -> Result<Datetime, EvalError> {
        self.0
            .checked_add(by.0)
            .map(Datetime)
            .ok_or_else(|| overflow("offset", &[self.0, by.0]))
    }

    pub fn duration_since(&self, other: Datetime) -> Result<Duration, EvalError> {
        self.0
            .checked_sub(other.0)
            .map(Duration)
            .ok_or_else(|| overflow("durationSince", &[self.0, other.0]))
    }

    /// Midnight (UTC) of the same day.
    pub fn to_date(&self) -> Result<Datetime, EvalError> {
        let into_day = self.0.rem_euclid(MS_PER_DAY);
        self.0
            .checked_sub(into_day)
            .map(Datetime)
            .ok_or_else(|| overflow("toDate", &[self.0, into_day]))
    }

    /// Time elapsed since midnight (UTC).
    pub fn to_time(&self) -> Duration {
        Duration(self.0.rem_euclid(MS_PER_DAY))
    }
}

impl FromStr for Datetime {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = DATETIME_RE
            .captures(s)
            .ok_or_else(|| invalid("datetime", s, "unrecognized format"))?;
        let field = |idx| number(&caps, idx).unwrap_or(0);

        let date = NaiveDate::from_ymd_opt(field(1) as i32, field(2) as u32, field(3) as u32)
            .ok_or_else(|| invalid("datetime", s, "no such calendar date"))?;
        let naive = date
            .and_hms_milli_opt(field(4) as u32, field(5) as u32, field(6) as u32, field(7) as u32)
            .ok_or_else(|| invalid("datetime", s, "no such time of day"))?;

        let offset_ms = match caps.get(8).map(|m| m.as_str()) {
            None | Some("Z") => 0,
            Some(zone) => {
                let hours: i64 = zone[1..3].parse().unwrap_or(0);
                let minutes: i64 = zone[3..5].parse().unwrap_or(0);
                if hours >= 24 || minutes >= 60 {
                    return Err(invalid("datetime", s, "offset out of range"));
                }
                let magnitude = hours * MS_PER_HOUR + minutes * MS_PER_MINUTE;
                if zone.starts_with('-') { -magnitude } else { magnitude }
            }
        };

        let local = naive.and_utc().timestamp_millis();
        local
            .checked_sub(offset_ms)
            .map(Datetime)
            .ok_or_else(|| invalid("datetime", s, "value out of range"))
    }
}

impl Display for Datetime {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match DateTime::from_timestamp_millis(self.0) {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.3fZ")),
            None => write!(f, "{}ms", self.0),
        }
    }
}

impl Duration {
    pub fn from_millis(ms: i64) -> Self {
        Duration(ms)
    }

    pub fn to_milliseconds(&self) -> i64 {
        self.0
    }

    pub fn to_seconds(&self) -> i64 {
        self.0 / MS_PER_SECOND
    }

    pub fn to_minutes(&self) -> i64 {
        self.0 / MS_PER_MINUTE
    }

    pub fn to_hours(&self) -> i64 {
        self.0 / MS_PER_HOUR
    }

    pub fn to_days(&self) -> i64 {
        self.0 / MS_PER_DAY
    }
}

impl FromStr for Duration {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = DURATION_RE
            .captures(s)
            .ok_or_else(|| invalid("duration", s, "unrecognized format"))?;
        if (2..=6).all(|idx| caps.get(idx).is_none()) {
            return Err(invalid("duration", s, "at least one unit is required"));
        }

        let units = [
            (2, MS_PER_DAY),
            (3, MS_PER_HOUR),
            (4, MS_PER_MINUTE),
            (5, MS_PER_SECOND),
            (6, 1),
        ];
        let mut total: i64 = 0;
        for (idx, scale) in units {
            let Some(m) = caps.get(idx) else {
                continue;
            };
            total = m
                .as_str()
                .parse::<i64>()
                .ok()
                .and_then(|n| n.checked_mul(scale))
                .and_then(|n| total.checked_add(n))
                .ok_or_else(|| invalid("duration", s, "value out of range"))?;
        }

        if caps.get(1).is_some() {
            total = -total;
        }
        Ok(Duration(total))
    }
}

impl Display for Duration {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}ms", self.0)
    }
}
