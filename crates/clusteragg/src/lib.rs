//! # clusteragg
//!
//! Cluster-wide metric aggregation ingestion and shard rebalancing.
//!
//! Remote hosts pre-aggregate their metrics and stream the results over
//! long-lived TCP connections. Ingestion nodes decode the stream, validate
//! each record and hand it to a shard router; a least-loaded allocation
//! strategy keeps the shards spread evenly across regions.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                           clusteragg                            │
//! │  ┌──────────┐   ┌──────────────┐   ┌──────────┐   ┌──────────┐ │
//! │  │  Config  │ → │   Listener   │ → │ Handler  │ → │  Router  │ │
//! │  │ (layers) │   │ (supervised) │   │ (frames) │   │ (shards) │ │
//! │  └──────────┘   └──────────────┘   └──────────┘   └──────────┘ │
//! │                                           Strategy (rebalance) │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use clusteragg::{ClusterAggConfig, ClusterAggregator, DiscardRouter, TracingEmitter};
//!
//! clusteragg::init_tracing("info")?;
//! let config = ClusterAggConfig::load()?;
//! let aggregator =
//!     ClusterAggregator::bind(&config, Arc::new(DiscardRouter), Arc::new(TracingEmitter))?;
//! aggregator.run().await?;
//! ```

mod aggregator;
mod error;

pub use aggregator::{ClusterAggregator, allocation_strategy, server_config};
pub use error::{ClusterAggError, Result};

// Configuration
pub use clusteragg_config::{AggregationConfig, ClusterAggConfig, ConfigLoader, RebalanceConfig};

// Data model
pub use clusteragg_types::{
    AggregatedData, DefaultStatisticRegistry, Period, Quantity, Statistic, StatisticRegistry, Unit,
};

// Wire protocol
pub use clusteragg_wire::{FrameBuffer, Message, MessageType, WireError};

// Ingestion server
pub use clusteragg_server::{
    AggregationServer, CloseReason, ConnectionSupervisor, DiscardRouter, MetricsEmitter,
    ServerConfig, ServerError, ServerMetrics, ShardRouter, ShutdownHandle, TracingEmitter,
    init_tracing,
};

// Shard allocation
pub use clusteragg_sharding::{
    Allocations, BroadcastNotifier, ParallelLeastShardAllocationStrategy, RebalanceNotification,
    RebalanceNotifier, ShardAllocation, ShardId, ShardingError,
};
