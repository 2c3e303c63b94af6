//! Server error types.

use std::net::SocketAddr;

use clusteragg_types::ParseError;
use clusteragg_wire::WireError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that end a connection or stop the listener.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Wire protocol error that leaves the receive buffer unusable.
    #[error("wire protocol error: {0}")]
    Wire(#[from] WireError),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The supervisor stopped accepting events from its connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// Bind failed.
    #[error("failed to bind to {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// The connection task panicked or was cancelled.
    #[error("connection task failed: {0}")]
    ConnectionTask(String),

    /// Metrics registration failed.
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// The tracing subscriber could not be installed.
    #[error("telemetry error: {0}")]
    Telemetry(String),

    /// Invalid server configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Why a single record was dropped. Never fatal to the connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// The statistic name is not in the registry.
    #[error("unknown statistic: {0:?}")]
    UnknownStatistic(String),

    /// A field could not be parsed.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl RecordError {
    /// Short label used for the dropped-records metric.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::UnknownStatistic(_) => "unknown_statistic",
            Self::Parse(ParseError::InvalidPeriod(_) | ParseError::ZeroPeriod(_)) => {
                "invalid_period"
            }
            Self::Parse(ParseError::InvalidTimestamp(_)) => "invalid_timestamp",
            Self::Parse(ParseError::UnknownUnit(_)) => "unknown_unit",
            Self::Parse(ParseError::MissingField(_)) => "missing_field",
        }
    }
}
