//! Wiring from configuration to a running ingestion listener.

use std::fmt::Debug;
use std::net::SocketAddr;
use std::sync::Arc;

use clusteragg_config::ClusterAggConfig;
use clusteragg_server::{
    AggregationServer, ConnectionSettings, ConnectionSupervisor, MetricsEmitter, ServerConfig,
    ServerMetrics, ShardRouter, ShutdownHandle,
};
use clusteragg_sharding::ParallelLeastShardAllocationStrategy;
use clusteragg_types::{DefaultStatisticRegistry, StatisticRegistry};
use tracing::info;

use crate::error::Result;

/// Builds the listener settings from the `[aggregation]` section.
pub fn server_config(config: &ClusterAggConfig) -> Result<ServerConfig> {
    config.validate()?;
    let aggregation = &config.aggregation;
    Ok(ServerConfig {
        bind_addr: aggregation.bind_addr()?,
        backlog: aggregation.backlog,
        connection: ConnectionSettings {
            min_lifetime: aggregation.min_connection_lifetime(),
            max_lifetime: aggregation.max_connection_lifetime(),
            event_channel_capacity: aggregation.event_channel_capacity,
            ..ConnectionSettings::default()
        },
    })
}

/// Builds a strategy from the `[rebalance]` section.
pub fn allocation_strategy<N>(
    config: &ClusterAggConfig,
) -> Result<ParallelLeastShardAllocationStrategy<N>>
where
    N: Ord + Clone + Debug,
{
    Ok(ParallelLeastShardAllocationStrategy::new(
        config.rebalance.max_parallel,
        config.rebalance.threshold,
    )?)
}

/// A bound ingestion listener plus the metrics it reports into.
pub struct ClusterAggregator {
    server: AggregationServer,
    metrics: Arc<ServerMetrics>,
}

impl ClusterAggregator {
    /// Binds the aggregation port described by `config`.
    pub fn bind(
        config: &ClusterAggConfig,
        router: Arc<dyn ShardRouter>,
        emitter: Arc<dyn MetricsEmitter>,
    ) -> Result<Self> {
        Self::bind_with_registry(config, router, emitter, Arc::new(DefaultStatisticRegistry))
    }

    /// Like [`bind`](Self::bind) with a custom statistic registry.
    pub fn bind_with_registry(
        config: &ClusterAggConfig,
        router: Arc<dyn ShardRouter>,
        emitter: Arc<dyn MetricsEmitter>,
        registry: Arc<dyn StatisticRegistry>,
    ) -> Result<Self> {
        let server_config = server_config(config)?;
        let metrics = Arc::new(ServerMetrics::new().map_err(clusteragg_server::ServerError::from)?);
        let supervisor = ConnectionSupervisor::new(
            router,
            emitter,
            registry,
            Arc::clone(&metrics),
            server_config.connection,
        );
        let server = AggregationServer::bind(&server_config, supervisor)?;
        info!(addr = %server.local_addr(), "cluster aggregator ready");
        Ok(Self { server, metrics })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.server.shutdown_handle()
    }

    pub fn metrics(&self) -> &Arc<ServerMetrics> {
        &self.metrics
    }

    /// Serves connections until shutdown is signalled.
    pub async fn run(self) -> Result<()> {
        self.server.run().await?;
        Ok(())
    }
}
