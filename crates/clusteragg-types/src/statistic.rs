//! Statistic references and the name registry used to resolve them.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// A statistic computed by the aggregation library.
///
/// The core never evaluates statistics; it only carries a typed reference
/// so downstream publishers know what the value represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statistic {
    /// Minimum (0th percentile).
    Tp0,
    /// Median (50th percentile).
    Tp50,
    /// 90th percentile.
    Tp90,
    /// 99th percentile.
    Tp99,
    /// 99.9th percentile.
    Tp99p9,
    /// Maximum (100th percentile).
    Tp100,
    /// Arithmetic mean.
    Mean,
    /// Sum of samples.
    Sum,
    /// Number of samples.
    Count,
}

impl Statistic {
    /// Canonical wire name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Tp0 => "tp0",
            Self::Tp50 => "tp50",
            Self::Tp90 => "tp90",
            Self::Tp99 => "tp99",
            Self::Tp99p9 => "tp99.9",
            Self::Tp100 => "tp100",
            Self::Mean => "mean",
            Self::Sum => "sum",
            Self::Count => "count",
        }
    }

    /// Resolves a statistic by any of its accepted names, ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        let lowered = name.to_ascii_lowercase();
        let statistic = match lowered.as_str() {
            "tp0" | "p0" | "min" => Self::Tp0,
            "tp50" | "p50" | "median" => Self::Tp50,
            "tp90" | "p90" => Self::Tp90,
            "tp99" | "p99" => Self::Tp99,
            "tp99.9" | "p99.9" => Self::Tp99p9,
            "tp100" | "p100" | "max" => Self::Tp100,
            "mean" => Self::Mean,
            "sum" => Self::Sum,
            "n" | "count" => Self::Count,
            _ => return None,
        };
        Some(statistic)
    }
}

impl Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Turns a wire statistic name into a [`Statistic`].
///
/// An unknown name is a per-record failure, never a fatal one.
pub trait StatisticRegistry: Send + Sync {
    fn resolve(&self, name: &str) -> Option<Statistic>;
}

/// Registry backed by [`Statistic::from_name`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultStatisticRegistry;

impl StatisticRegistry for DefaultStatisticRegistry {
    fn resolve(&self, name: &str) -> Option<Statistic> {
        Statistic::from_name(name)
    }
}
