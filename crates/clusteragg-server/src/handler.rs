//! Per-connection state machine.
//!
//! The handler owns the connection's [`FrameBuffer`] and session identity
//! and turns decoded frames into [`AggregatedData`]. It performs no I/O;
//! the connection task feeds it bytes and forwards what it returns.
//!
//! ```text
//!   Unidentified ──HostIdentification──▶ Identified
//!        │                                   │
//!        └────────── close / timeout ────────┴──▶ Closed
//! ```

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Timelike, Utc};
use clusteragg_types::{
    AggregatedData, ParseError, Period, Quantity, StatisticRegistry, Unit, parse_timestamp,
};
use clusteragg_wire::{
    AggregationRecord, FrameBuffer, HeartbeatRecord, HostIdentification, LegacyAggRecord, Message,
    WireError,
};
use tracing::{debug, error, info, warn};

use crate::error::RecordError;
use crate::metrics::ServerMetrics;

/// Lifecycle of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No `HostIdentification` received yet.
    Unidentified,
    /// Host and cluster names are known.
    Identified,
    /// The connection is gone. Further input is ignored.
    Closed,
}

/// Outcome of feeding one chunk of bytes to a [`ConnectionHandler`].
#[derive(Debug, Default)]
pub struct Received {
    /// Records completed by the chunk, in stream order.
    pub records: Vec<AggregatedData>,
    /// Set when the stream cannot be framed any more.
    pub fatal: Option<WireError>,
}

/// State machine for a single client connection.
pub struct ConnectionHandler {
    state: SessionState,
    host_name: Option<String>,
    cluster_name: Option<String>,
    framer: FrameBuffer,
    registry: Arc<dyn StatisticRegistry>,
    metrics: Arc<ServerMetrics>,
    frames_skipped: u64,
}

impl ConnectionHandler {
    pub fn new(registry: Arc<dyn StatisticRegistry>, metrics: Arc<ServerMetrics>) -> Self {
        Self {
            state: SessionState::Unidentified,
            host_name: None,
            cluster_name: None,
            framer: FrameBuffer::new(),
            registry,
            metrics,
            frames_skipped: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn host_name(&self) -> Option<&str> {
        self.host_name.as_deref()
    }

    pub fn cluster_name(&self) -> Option<&str> {
        self.cluster_name.as_deref()
    }

    /// Bytes received but not yet decodable.
    pub fn buffered(&self) -> usize {
        self.framer.buffered()
    }

    /// Feeds bytes received from the socket and returns the records they
    /// completed.
    ///
    /// A fatal [`WireError`] stops decoding, but records from frames that
    /// preceded it in the same chunk are still returned alongside it.
    pub fn on_received(&mut self, bytes: &[u8]) -> Received {
        self.on_received_at(bytes, Utc::now())
    }

    /// Like [`on_received`](Self::on_received) with an explicit clock, used
    /// for legacy records that carry no period start.
    pub fn on_received_at(&mut self, bytes: &[u8], now: DateTime<Utc>) -> Received {
        let mut received = Received::default();
        if self.state == SessionState::Closed {
            debug!(len = bytes.len(), "ignoring bytes received after close");
            return received;
        }

        self.framer.feed(bytes);

        // One drain per message so the handler can be borrowed in between.
        while let Some(next) = self.framer.drain().next() {
            match next {
                Ok(message) => {
                    if let Some(record) = self.handle_message_at(message, now) {
                        received.records.push(record);
                    }
                }
                Err(e) => {
                    received.fatal = Some(e);
                    break;
                }
            }
        }

        let skipped = self.framer.frames_skipped();
        if skipped > self.frames_skipped {
            self.metrics.frames_skipped.inc_by(skipped - self.frames_skipped);
            self.frames_skipped = skipped;
        }
        received
    }

    /// Applies one decoded message to the session.
    pub fn handle_message_at(
        &mut self,
        message: Message,
        now: DateTime<Utc>,
    ) -> Option<AggregatedData> {
        if self.state == SessionState::Closed {
            return None;
        }

        self.metrics
            .frames_decoded
            .with_label_values(&[message.message_type().name()])
            .inc();

        match message {
            Message::HostIdentification(ident) => {
                self.identify(ident);
                None
            }
            Message::AggregationRecord(record) => self.current_record(&record),
            Message::LegacyAggRecord(record) => self.legacy_record(&record, now),
            Message::HeartbeatRecord(HeartbeatRecord { timestamp }) => {
                debug!(host = self.host(), %timestamp, "heartbeat");
                None
            }
        }
    }

    /// Marks the connection closed. Idempotent.
    pub fn close(&mut self) {
        if self.state != SessionState::Closed {
            debug!(
                host = self.host(),
                buffered = self.framer.buffered(),
                "connection handler closed"
            );
            self.state = SessionState::Closed;
        }
    }

    fn identify(&mut self, ident: HostIdentification) {
        if let Some(host_name) = ident.host_name {
            self.host_name = Some(host_name);
        }
        if let Some(cluster_name) = ident.cluster_name {
            self.cluster_name = Some(cluster_name);
        }

        if self.state == SessionState::Unidentified {
            self.state = SessionState::Identified;
            info!(host = self.host(), cluster = self.cluster(), "host identified");
        } else {
            debug!(host = self.host(), cluster = self.cluster(), "host identification updated");
        }
    }

    fn host(&self) -> &str {
        self.host_name.as_deref().unwrap_or("")
    }

    fn cluster(&self) -> &str {
        self.cluster_name.as_deref().unwrap_or("")
    }

    fn warn_if_unidentified(&self) {
        if self.state == SessionState::Unidentified {
            warn!("aggregation record received before host identification");
        }
    }

    fn current_record(&self, record: &AggregationRecord) -> Option<AggregatedData> {
        self.warn_if_unidentified();
        match self.build_current(record) {
            Ok(data) => Some(data),
            Err(e) => {
                warn!(
                    host = self.host(),
                    service = %record.service,
                    metric = %record.metric,
                    error = %e,
                    "dropping aggregation record"
                );
                self.metrics.records_dropped.with_label_values(&[e.reason()]).inc();
                None
            }
        }
    }

    fn build_current(&self, record: &AggregationRecord) -> Result<AggregatedData, RecordError> {
        let statistic = self
            .registry
            .resolve(&record.statistic)
            .ok_or_else(|| RecordError::UnknownStatistic(record.statistic.clone()))?;
        let period: Period = record.period.parse()?;
        let start = parse_timestamp(&record.period_start)?;
        let unit = Unit::parse_optional(record.unit.as_deref())?;

        let data = AggregatedData::builder()
            .host(self.host())
            .cluster(self.cluster())
            .service(record.service.as_str())
            .metric(record.metric.as_str())
            .statistic(statistic)
            .period(period)
            .start(start)
            .population_size(record.population_size)
            .value(Quantity::with_unit(record.statistic_value, unit))
            .samples(
                record
                    .samples
                    .iter()
                    .map(|&sample| Quantity::with_unit(sample, unit))
                    .collect(),
            )
            .build()?;
        Ok(data)
    }

    fn legacy_record(
        &self,
        record: &LegacyAggRecord,
        now: DateTime<Utc>,
    ) -> Option<AggregatedData> {
        self.warn_if_unidentified();
        match self.build_legacy(record, now) {
            Ok(data) => Some(data),
            Err(e) => {
                error!(
                    host = self.host(),
                    service = %record.service,
                    metric = %record.metric,
                    error = %e,
                    "dropping legacy aggregation record"
                );
                self.metrics.records_dropped.with_label_values(&[e.reason()]).inc();
                None
            }
        }
    }

    fn build_legacy(
        &self,
        record: &LegacyAggRecord,
        now: DateTime<Utc>,
    ) -> Result<AggregatedData, RecordError> {
        let statistic = self
            .registry
            .resolve(&record.statistic)
            .ok_or_else(|| RecordError::UnknownStatistic(record.statistic.clone()))?;
        let period: Period = record.period.parse()?;
        if period.is_zero() {
            return Err(ParseError::ZeroPeriod(record.period.clone()).into());
        }
        let start = match &record.period_start {
            Some(raw) => parse_timestamp(raw)?,
            None => legacy_period_start(period, now),
        };

        let data = AggregatedData::builder()
            .host(self.host())
            .cluster(self.cluster())
            .service(record.service.as_str())
            .metric(record.metric.as_str())
            .statistic(statistic)
            .period(period)
            .start(start)
            .population_size(legacy_population_size(record))
            .value(Quantity::new(record.statistic_value))
            .samples(
                record
                    .statistic_samples
                    .iter()
                    .copied()
                    .map(Quantity::new)
                    .collect(),
            )
            .build()?;
        Ok(data)
    }
}

/// Population of a legacy record: the raw sample count if sent, else the
/// number of samples, else one.
pub fn legacy_population_size(record: &LegacyAggRecord) -> u64 {
    record.raw_sample_count.unwrap_or_else(|| {
        if record.statistic_samples.is_empty() {
            1
        } else {
            record.statistic_samples.len() as u64
        }
    })
}

/// Start of the period containing `now`, counted in whole periods from the
/// top of the current hour.
///
/// `period` must be non-zero.
pub fn legacy_period_start(period: Period, now: DateTime<Utc>) -> DateTime<Utc> {
    let top_of_hour = now
        - TimeDelta::minutes(i64::from(now.minute()))
        - TimeDelta::seconds(i64::from(now.second()))
        - TimeDelta::nanoseconds(i64::from(now.nanosecond()));

    if let Some(step) = period.as_time_delta() {
        return fixed_period_start(top_of_hour, step, now);
    }

    // Calendar periods span at least a month, so this runs at most once.
    let mut start = top_of_hour;
    while let Some(next) = period.add_to(start) {
        if next >= now || next <= start {
            break;
        }
        start = next;
    }
    start
}

/// Last `top_of_hour + k * step` with `k >= 0` for which one more step is
/// still before `now`.
fn fixed_period_start(
    top_of_hour: DateTime<Utc>,
    step: TimeDelta,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let (Some(step_ns), Some(elapsed_ns)) = (
        step.num_nanoseconds(),
        (now - top_of_hour).num_nanoseconds(),
    ) else {
        return top_of_hour;
    };
    if step_ns <= 0 || elapsed_ns <= 0 {
        return top_of_hour;
    }
    let steps = (elapsed_ns - 1) / step_ns;
    top_of_hour + TimeDelta::nanoseconds(steps * step_ns)
}
