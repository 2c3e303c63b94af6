//! Prometheus metrics for the ingestion server.
//!
//! All metrics use the `clusteragg` namespace and live in a registry owned by
//! [`ServerMetrics`], so several servers in one process do not collide.

use std::fmt;

use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

const NAMESPACE: &str = "clusteragg";

/// Operational counters for connections, frames and records.
#[derive(Clone)]
pub struct ServerMetrics {
    registry: Registry,
    /// Connections accepted by the listener.
    pub connections_accepted: IntCounter,
    /// Connections currently being served.
    pub connections_active: IntGauge,
    /// Connections closed, by reason.
    pub connections_closed: IntCounterVec,
    /// Frames decoded, by message type.
    pub frames_decoded: IntCounterVec,
    /// Frames dropped for an unknown tag or corrupt payload.
    pub frames_skipped: IntCounter,
    /// Records handed to the router and emitter.
    pub records_forwarded: IntCounter,
    /// Records dropped, by reason.
    pub records_dropped: IntCounterVec,
}

impl ServerMetrics {
    /// Creates and registers every metric in a fresh registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let connections_accepted = IntCounter::with_opts(
            Opts::new(
                "connections_accepted_total",
                "Connections accepted by the aggregation listener.",
            )
            .namespace(NAMESPACE),
        )?;
        let connections_active = IntGauge::with_opts(
            Opts::new("connections_active", "Connections currently being served.")
                .namespace(NAMESPACE),
        )?;
        let connections_closed = IntCounterVec::new(
            Opts::new("connections_closed_total", "Connections closed, by reason.")
                .namespace(NAMESPACE),
            &["reason"],
        )?;
        let frames_decoded = IntCounterVec::new(
            Opts::new("frames_decoded_total", "Frames decoded, by message type.")
                .namespace(NAMESPACE),
            &["message_type"],
        )?;
        let frames_skipped = IntCounter::with_opts(
            Opts::new(
                "frames_skipped_total",
                "Frames dropped for an unknown type tag or corrupt payload.",
            )
            .namespace(NAMESPACE),
        )?;
        let records_forwarded = IntCounter::with_opts(
            Opts::new(
                "records_forwarded_total",
                "Aggregated records forwarded downstream.",
            )
            .namespace(NAMESPACE),
        )?;
        let records_dropped = IntCounterVec::new(
            Opts::new("records_dropped_total", "Aggregated records dropped, by reason.")
                .namespace(NAMESPACE),
            &["reason"],
        )?;

        registry.register(Box::new(connections_accepted.clone()))?;
        registry.register(Box::new(connections_active.clone()))?;
        registry.register(Box::new(connections_closed.clone()))?;
        registry.register(Box::new(frames_decoded.clone()))?;
        registry.register(Box::new(frames_skipped.clone()))?;
        registry.register(Box::new(records_forwarded.clone()))?;
        registry.register(Box::new(records_dropped.clone()))?;

        Ok(Self {
            registry,
            connections_accepted,
            connections_active,
            connections_closed,
            frames_decoded,
            frames_skipped,
            records_forwarded,
            records_dropped,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Renders every metric in the Prometheus text exposition format.
    pub fn gather_text(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}

impl fmt::Debug for ServerMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerMetrics")
            .field("connections_active", &self.connections_active.get())
            .field("records_forwarded", &self.records_forwarded.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exports_namespaced_metrics() {
        let metrics = ServerMetrics::new().unwrap();
        metrics.connections_accepted.inc();
        metrics
            .records_dropped
            .with_label_values(&["unknown_statistic"])
            .inc_by(2);

        let text = metrics.gather_text().unwrap();
        assert!(text.contains("clusteragg_connections_accepted_total 1"));
        assert!(text.contains("clusteragg_records_dropped_total{reason=\"unknown_statistic\"} 2"));
    }

    #[test]
    fn instances_do_not_share_registries() {
        let a = ServerMetrics::new().unwrap();
        let b = ServerMetrics::new().unwrap();
        a.records_forwarded.inc();
        assert_eq!(a.records_forwarded.get(), 1);
        assert_eq!(b.records_forwarded.get(), 0);
    }
}
