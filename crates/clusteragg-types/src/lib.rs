//! # clusteragg-types: Core types for `clusteragg`
//!
//! Shared types used across the ingestion and sharding crates:
//! - Aggregated output ([`AggregatedData`], [`Fqdsn`], [`Quantity`])
//! - Statistic references ([`Statistic`], [`StatisticRegistry`])
//! - Units of measure ([`Unit`])
//! - Temporal types ([`Period`], [`parse_timestamp`])

mod error;
mod period;
mod statistic;
mod unit;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use error::ParseError;
pub use period::{Period, parse_timestamp};
pub use statistic::{DefaultStatisticRegistry, Statistic, StatisticRegistry};
pub use unit::{Unit, UnitKind};

// ============================================================================
// Quantity
// ============================================================================

/// A numeric value with an optional unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    value: f64,
    unit: Option<Unit>,
}

impl Quantity {
    pub fn new(value: f64) -> Self {
        Self { value, unit: None }
    }

    pub fn with_unit(value: f64, unit: Option<Unit>) -> Self {
        Self { value, unit }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn unit(&self) -> Option<Unit> {
        self.unit
    }
}

// ============================================================================
// Fully-qualified statistic name
// ============================================================================

/// Fully-qualified data space name: the identity of an aggregated series
/// independent of which host reported it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fqdsn {
    pub cluster: String,
    pub service: String,
    pub metric: String,
    pub statistic: Statistic,
}

// ============================================================================
// Aggregated data
// ============================================================================

/// One aggregated value reported by a remote host for one period.
///
/// Instances are only produced by [`AggregatedDataBuilder::build`], which
/// refuses to construct a record with missing fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedData {
    host: String,
    fqdsn: Fqdsn,
    period: Period,
    start: DateTime<Utc>,
    population_size: u64,
    value: Quantity,
    samples: Vec<Quantity>,
}

impl AggregatedData {
    pub fn builder() -> AggregatedDataBuilder {
        AggregatedDataBuilder::default()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn fqdsn(&self) -> &Fqdsn {
        &self.fqdsn
    }

    pub fn cluster(&self) -> &str {
        &self.fqdsn.cluster
    }

    pub fn service(&self) -> &str {
        &self.fqdsn.service
    }

    pub fn metric(&self) -> &str {
        &self.fqdsn.metric
    }

    pub fn statistic(&self) -> Statistic {
        self.fqdsn.statistic
    }

    pub fn period(&self) -> Period {
        self.period
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn population_size(&self) -> u64 {
        self.population_size
    }

    pub fn value(&self) -> Quantity {
        self.value
    }

    pub fn samples(&self) -> &[Quantity] {
        &self.samples
    }
}

/// Builder for [`AggregatedData`].
///
/// Every field except `samples` is required.
#[derive(Debug, Clone, Default)]
pub struct AggregatedDataBuilder {
    host: Option<String>,
    cluster: Option<String>,
    service: Option<String>,
    metric: Option<String>,
    statistic: Option<Statistic>,
    period: Option<Period>,
    start: Option<DateTime<Utc>>,
    population_size: Option<u64>,
    value: Option<Quantity>,
    samples: Vec<Quantity>,
}

impl AggregatedDataBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = Some(cluster.into());
        self
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn metric(mut self, metric: impl Into<String>) -> Self {
        self.metric = Some(metric.into());
        self
    }

    pub fn statistic(mut self, statistic: Statistic) -> Self {
        self.statistic = Some(statistic);
        self
    }

    pub fn period(mut self, period: Period) -> Self {
        self.period = Some(period);
        self
    }

    pub fn start(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    pub fn population_size(mut self, population_size: u64) -> Self {
        self.population_size = Some(population_size);
        self
    }

    pub fn value(mut self, value: Quantity) -> Self {
        self.value = Some(value);
        self
    }

    pub fn samples(mut self, samples: Vec<Quantity>) -> Self {
        self.samples = samples;
        self
    }

    pub fn build(self) -> Result<AggregatedData, ParseError> {
        Ok(AggregatedData {
            host: self.host.ok_or(ParseError::MissingField("host"))?,
            fqdsn: Fqdsn {
                cluster: self.cluster.ok_or(ParseError::MissingField("cluster"))?,
                service: self.service.ok_or(ParseError::MissingField("service"))?,
                metric: self.metric.ok_or(ParseError::MissingField("metric"))?,
                statistic: self.statistic.ok_or(ParseError::MissingField("statistic"))?,
            },
            period: self.period.ok_or(ParseError::MissingField("period"))?,
            start: self.start.ok_or(ParseError::MissingField("start"))?,
            population_size: self
                .population_size
                .ok_or(ParseError::MissingField("population_size"))?,
            value: self.value.ok_or(ParseError::MissingField("value"))?,
            samples: self.samples,
        })
    }
}
