//! Units of measure attached to aggregated values.

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ParseError;

/// Unit catalogue. Wire names are the upper-case variant names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Unit {
    // Time
    Nanosecond,
    Microsecond,
    Millisecond,
    Second,
    Minute,
    Hour,
    Day,
    Week,

    // Data size
    Bit,
    Byte,
    Kilobit,
    Megabit,
    Gigabit,
    Terabit,
    Petabit,
    Kilobyte,
    Megabyte,
    Gigabyte,
    Terabyte,
    Petabyte,

    // Temperature
    Kelvin,
    Celcius,
    Fahrenheit,
}

/// Coarse grouping of units that can be converted into each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitKind {
    Time,
    DataSize,
    Temperature,
}

const ALL_UNITS: [Unit; 23] = [
    Unit::Nanosecond,
    Unit::Microsecond,
    Unit::Millisecond,
    Unit::Second,
    Unit::Minute,
    Unit::Hour,
    Unit::Day,
    Unit::Week,
    Unit::Bit,
    Unit::Byte,
    Unit::Kilobit,
    Unit::Megabit,
    Unit::Gigabit,
    Unit::Terabit,
    Unit::Petabit,
    Unit::Kilobyte,
    Unit::Megabyte,
    Unit::Gigabyte,
    Unit::Terabyte,
    Unit::Petabyte,
    Unit::Kelvin,
    Unit::Celcius,
    Unit::Fahrenheit,
];

impl Unit {
    /// Wire name of the unit.
    pub fn name(self) -> &'static str {
        match self {
            Self::Nanosecond => "NANOSECOND",
            Self::Microsecond => "MICROSECOND",
            Self::Millisecond => "MILLISECOND",
            Self::Second => "SECOND",
            Self::Minute => "MINUTE",
            Self::Hour => "HOUR",
            Self::Day => "DAY",
            Self::Week => "WEEK",
            Self::Bit => "BIT",
            Self::Byte => "BYTE",
            Self::Kilobit => "KILOBIT",
            Self::Megabit => "MEGABIT",
            Self::Gigabit => "GIGABIT",
            Self::Terabit => "TERABIT",
            Self::Petabit => "PETABIT",
            Self::Kilobyte => "KILOBYTE",
            Self::Megabyte => "MEGABYTE",
            Self::Gigabyte => "GIGABYTE",
            Self::Terabyte => "TERABYTE",
            Self::Petabyte => "PETABYTE",
            Self::Kelvin => "KELVIN",
            Self::Celcius => "CELCIUS",
            Self::Fahrenheit => "FAHRENHEIT",
        }
    }

    pub fn kind(self) -> UnitKind {
        match self {
            Self::Nanosecond
            | Self::Microsecond
            | Self::Millisecond
            | Self::Second
            | Self::Minute
            | Self::Hour
            | Self::Day
            | Self::Week => UnitKind::Time,
            Self::Kelvin | Self::Celcius | Self::Fahrenheit => UnitKind::Temperature,
            _ => UnitKind::DataSize,
        }
    }

    /// Parses an optional wire unit. An empty string means "no unit".
    pub fn parse_optional(raw: Option<&str>) -> Result<Option<Self>, ParseError> {
        match raw {
            None | Some("") => Ok(None),
            Some(name) => name.parse().map(Some),
        }
    }
}

impl FromStr for Unit {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_UNITS
            .iter()
            .copied()
            .find(|unit| unit.name() == s)
            .ok_or_else(|| ParseError::UnknownUnit(s.to_string()))
    }
}

impl Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_unit_parses_from_its_name() {
        for unit in ALL_UNITS {
            assert_eq!(unit.name().parse::<Unit>().unwrap(), unit);
        }
    }

    #[test]
    fn names_are_case_sensitive() {
        assert!(matches!(
            "second".parse::<Unit>(),
            Err(ParseError::UnknownUnit(_))
        ));
    }

    #[test]
    fn empty_and_missing_units_are_absent() {
        assert_eq!(Unit::parse_optional(None).unwrap(), None);
        assert_eq!(Unit::parse_optional(Some("")).unwrap(), None);
        assert_eq!(
            Unit::parse_optional(Some("MILLISECOND")).unwrap(),
            Some(Unit::Millisecond)
        );
        assert!(Unit::parse_optional(Some("FURLONG")).is_err());
    }

    #[test]
    fn kinds() {
        assert_eq!(Unit::Hour.kind(), UnitKind::Time);
        assert_eq!(Unit::Megabyte.kind(), UnitKind::DataSize);
        assert_eq!(Unit::Kelvin.kind(), UnitKind::Temperature);
    }
}
