//! ISO-8601 durations and timestamps as they appear on the wire.
//!
//! Aggregation periods arrive as strings such as `PT1M` or `PT5M`, and
//! period starts as RFC 3339 timestamps. [`Period`] keeps the calendar
//! components separate so that month and year periods advance by calendar
//! months rather than a fixed number of seconds.

use std::fmt::{self, Display};
use std::str::FromStr;

use chrono::{DateTime, Months, NaiveDateTime, TimeDelta, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ParseError;

/// An ISO-8601 duration (`PnYnMnWnDTnHnMnS`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Period {
    years: u32,
    months: u32,
    weeks: u32,
    days: u32,
    hours: u32,
    minutes: u32,
    seconds: u32,
    millis: u32,
}

impl Period {
    /// A period of the given number of whole seconds.
    pub fn seconds(seconds: u32) -> Self {
        Self {
            seconds,
            ..Self::default()
        }
    }

    /// A period of the given number of whole minutes.
    pub fn minutes(minutes: u32) -> Self {
        Self {
            minutes,
            ..Self::default()
        }
    }

    /// A period of the given number of whole hours.
    pub fn hours(hours: u32) -> Self {
        Self {
            hours,
            ..Self::default()
        }
    }

    /// A period of the given number of calendar months.
    pub fn months(months: u32) -> Self {
        Self {
            months,
            ..Self::default()
        }
    }

    /// Returns true if every component is zero.
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    /// Returns the non-calendar part of the period (weeks and smaller).
    fn fixed_part(&self) -> TimeDelta {
        TimeDelta::weeks(i64::from(self.weeks))
            + TimeDelta::days(i64::from(self.days))
            + TimeDelta::hours(i64::from(self.hours))
            + TimeDelta::minutes(i64::from(self.minutes))
            + TimeDelta::seconds(i64::from(self.seconds))
            + TimeDelta::milliseconds(i64::from(self.millis))
    }

    /// Adds this period to `instant`.
    ///
    /// Calendar components are applied first, then the fixed components.
    /// Returns `None` on overflow of the representable date range.
    pub fn add_to(&self, instant: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let months = self.years.checked_mul(12)?.checked_add(self.months)?;
        let shifted = if months == 0 {
            instant
        } else {
            instant.checked_add_months(Months::new(months))?
        };
        shifted.checked_add_signed(self.fixed_part())
    }

    /// Returns the exact length of the period, or `None` if it contains
    /// calendar months or years whose length depends on the start date.
    pub fn as_time_delta(&self) -> Option<TimeDelta> {
        if self.years == 0 && self.months == 0 {
            Some(self.fixed_part())
        } else {
            None
        }
    }
}

impl Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return f.write_str("PT0S");
        }
        f.write_str("P")?;
        for (value, designator) in [
            (self.years, 'Y'),
            (self.months, 'M'),
            (self.weeks, 'W'),
            (self.days, 'D'),
        ] {
            if value > 0 {
                write!(f, "{value}{designator}")?;
            }
        }
        if self.hours > 0 || self.minutes > 0 || self.seconds > 0 || self.millis > 0 {
            f.write_str("T")?;
            if self.hours > 0 {
                write!(f, "{}H", self.hours)?;
            }
            if self.minutes > 0 {
                write!(f, "{}M", self.minutes)?;
            }
            if self.millis > 0 {
                write!(f, "{}.{:03}S", self.seconds, self.millis)?;
            } else if self.seconds > 0 {
                write!(f, "{}S", self.seconds)?;
            }
        }
        Ok(())
    }
}

impl FromStr for Period {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidPeriod(s.to_string());

        let body = s
            .strip_prefix('P')
            .or_else(|| s.strip_prefix('p'))
            .ok_or_else(invalid)?;
        if body.is_empty() {
            return Err(invalid());
        }

        let (date_part, time_part) = match body.split_once(['T', 't']) {
            Some((_, "")) => return Err(invalid()),
            Some((date, time)) => (date, Some(time)),
            None => (body, None),
        };

        let mut period = Period::default();

        for (number, designator) in components(date_part, "YMWD").ok_or_else(invalid)? {
            let value = number.parse::<u32>().map_err(|_| invalid())?;
            match designator {
                'Y' => period.years = value,
                'M' => period.months = value,
                'W' => period.weeks = value,
                _ => period.days = value,
            }
        }

        if let Some(time_part) = time_part {
            for (number, designator) in components(time_part, "HMS").ok_or_else(invalid)? {
                if designator == 'S' {
                    let (whole, fraction) = number.split_once(['.', ',']).unwrap_or((number, ""));
                    period.seconds = whole.parse::<u32>().map_err(|_| invalid())?;
                    period.millis = parse_millis(fraction).ok_or_else(invalid)?;
                    continue;
                }
                let value = number.parse::<u32>().map_err(|_| invalid())?;
                if designator == 'H' {
                    period.hours = value;
                } else {
                    period.minutes = value;
                }
            }
        }

        Ok(period)
    }
}

/// Splits `part` into `(number, designator)` pairs.
///
/// Designators must come from `allowed`, appear at most once and in the
/// order given by `allowed`.
fn components<'a>(part: &'a str, allowed: &str) -> Option<Vec<(&'a str, char)>> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut last_rank = None;

    for (idx, ch) in part.char_indices() {
        if ch.is_ascii_digit() || ch == '.' || ch == ',' {
            continue;
        }
        let designator = ch.to_ascii_uppercase();
        let rank = allowed.find(designator)?;
        if last_rank.is_some_and(|last| rank <= last) {
            return None;
        }
        let number = &part[start..idx];
        if number.is_empty() {
            return None;
        }
        if designator != 'S' && number.contains(['.', ',']) {
            return None;
        }
        out.push((number, designator));
        last_rank = Some(rank);
        start = idx + ch.len_utf8();
    }

    // Trailing digits without a designator.
    if start != part.len() {
        return None;
    }
    Some(out)
}

fn parse_millis(fraction: &str) -> Option<u32> {
    if fraction.is_empty() {
        return Some(0);
    }
    if !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let mut digits: String = fraction.chars().take(3).collect();
    while digits.len() < 3 {
        digits.push('0');
    }
    digits.parse().ok()
}

impl Serialize for Period {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Parses an ISO-8601 timestamp.
///
/// Accepts RFC 3339 (with offset) and falls back to a bare local date-time
/// which is interpreted as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ParseError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| ParseError::InvalidTimestamp(raw.to_string()))
}
