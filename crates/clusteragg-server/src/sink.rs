//! Downstream collaborators that receive aggregated records.
//!
//! Both calls are fire-and-forget: a sink that cannot accept a record logs
//! and drops it rather than failing the connection.

use clusteragg_types::AggregatedData;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Hands records to the sharding layer for partitioned processing.
pub trait ShardRouter: Send + Sync {
    fn route(&self, data: AggregatedData);
}

/// Publishes records to downstream metric sinks.
pub trait MetricsEmitter: Send + Sync {
    fn emit(&self, data: &AggregatedData);
}

impl ShardRouter for mpsc::UnboundedSender<AggregatedData> {
    fn route(&self, data: AggregatedData) {
        if self.send(data).is_err() {
            warn!("shard router channel closed, dropping record");
        }
    }
}

impl MetricsEmitter for mpsc::UnboundedSender<AggregatedData> {
    fn emit(&self, data: &AggregatedData) {
        if self.send(data.clone()).is_err() {
            warn!("metrics emitter channel closed, dropping record");
        }
    }
}

/// Emitter that logs every record at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEmitter;

impl MetricsEmitter for TracingEmitter {
    fn emit(&self, data: &AggregatedData) {
        debug!(
            host = data.host(),
            cluster = data.cluster(),
            service = data.service(),
            metric = data.metric(),
            statistic = data.statistic().name(),
            period = %data.period(),
            start = %data.start(),
            value = data.value().value(),
            population = data.population_size(),
            "aggregated record"
        );
    }
}

/// Router that discards everything. Useful when only emission matters.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardRouter;

impl ShardRouter for DiscardRouter {
    fn route(&self, _data: AggregatedData) {}
}
