//! Parse and construction errors for core types.

use thiserror::Error;

/// Errors raised while turning wire-level strings into typed values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The string is not an ISO-8601 duration this crate understands.
    #[error("invalid ISO-8601 period: {0:?}")]
    InvalidPeriod(String),

    /// The period parsed but has zero length.
    #[error("period must be non-zero: {0}")]
    ZeroPeriod(String),

    /// The string is not an ISO-8601 timestamp.
    #[error("invalid ISO-8601 timestamp: {0:?}")]
    InvalidTimestamp(String),

    /// The unit name is not in the unit catalogue.
    #[error("unknown unit: {0:?}")]
    UnknownUnit(String),

    /// A required field was not supplied to a builder.
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}
