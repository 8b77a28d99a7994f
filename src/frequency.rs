//! Run-frequency specification: "run at most every N units".

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Months, Utc};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0} is not a valid frequency")]
pub struct FrequencyParseError(String);

/// Calendar unit a frequency counts in. Month-sized frequencies vary with
/// month length, so unit addition is calendar-aware rather than a fixed
/// millisecond multiple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrequencyUnit {
    Second,
    Minute,
    Hour,
    Day,
    Month,
}

impl FrequencyUnit {
    fn code(&self) -> char {
        match self {
            FrequencyUnit::Second => 's',
            FrequencyUnit::Minute => 'M',
            FrequencyUnit::Hour => 'h',
            FrequencyUnit::Day => 'd',
            FrequencyUnit::Month => 'm',
        }
    }
}

/// Parsed form of a compact frequency string such as `"60s"` or `"1m"`.
///
/// Grammar: `(0|[1-9][0-9]*)(s|M|h|d|m)` — a leading zero on a nonzero value
/// is rejected, as is any unrecognized unit suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frequency {
    value: u32,
    unit: FrequencyUnit,
}

impl Frequency {
    pub fn new(value: u32, unit: FrequencyUnit) -> Self {
        Self { value, unit }
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn unit(&self) -> FrequencyUnit {
        self.unit
    }

    /// The earliest instant one full frequency interval after `start`,
    /// computed with calendar-field addition.
    pub fn next_from(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        let value = i64::from(self.value);
        match self.unit {
            FrequencyUnit::Second => start + Duration::seconds(value),
            FrequencyUnit::Minute => start + Duration::minutes(value),
            FrequencyUnit::Hour => start + Duration::hours(value),
            FrequencyUnit::Day => start + Duration::days(value),
            // overflow only at the far end of chrono's representable range
            FrequencyUnit::Month => start.checked_add_months(Months::new(self.value)).unwrap_or(start),
        }
    }
}

impl FromStr for Frequency {
    type Err = FrequencyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || FrequencyParseError(s.to_string());

        let mut chars = s.chars();
        let unit = match chars.next_back() {
            Some('s') => FrequencyUnit::Second,
            Some('M') => FrequencyUnit::Minute,
            Some('h') => FrequencyUnit::Hour,
            Some('d') => FrequencyUnit::Day,
            Some('m') => FrequencyUnit::Month,
            _ => return Err(err()),
        };

        let digits = chars.as_str();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err());
        }
        if digits.len() > 1 && digits.starts_with('0') {
            return Err(err());
        }
        let value = digits.parse::<u32>().map_err(|_| err())?;

        Ok(Self { value, unit })
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit.code())
    }
}
