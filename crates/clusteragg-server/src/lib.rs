//! # clusteragg-server: aggregation ingestion server
//!
//! Remote hosts keep long-lived TCP connections to the aggregation port and
//! stream framed records over them. This crate accepts those connections,
//! decodes the frames, validates the records and forwards them downstream.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        clusteragg-server                          │
//! │  ┌───────────────┐   ┌──────────────┐   ┌─────────────────────┐  │
//! │  │ Aggregation   │ → │ Connection   │ → │ serve_connection     │  │
//! │  │ Server (TCP)  │   │ Supervisor   │   │ (ConnectionHandler)  │  │
//! │  └───────────────┘   └──────┬───────┘   └─────────────────────┘  │
//! │                             ↓                                     │
//! │                 MetricsEmitter, ShardRouter                       │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every accepted socket gets its own supervisor task, which spawns the
//! connection task and relays its records. Connections are recycled after a
//! randomized lifetime so that load spreads over the cluster as nodes come
//! and go.
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use clusteragg_server::{
//!     AggregationServer, ConnectionSupervisor, DiscardRouter, ServerConfig, ServerMetrics,
//!     TracingEmitter,
//! };
//! use clusteragg_types::DefaultStatisticRegistry;
//!
//! let config = ServerConfig::default();
//! let supervisor = ConnectionSupervisor::new(
//!     Arc::new(DiscardRouter),
//!     Arc::new(TracingEmitter),
//!     Arc::new(DefaultStatisticRegistry),
//!     Arc::new(ServerMetrics::new()?),
//!     config.connection,
//! );
//! let server = AggregationServer::bind(&config, supervisor)?;
//! server.run().await?;
//! ```

mod config;
mod connection;
mod error;
mod handler;
pub mod metrics;
mod server;
mod sink;
mod supervisor;
pub mod telemetry;

pub use config::{ConnectionSettings, DEFAULT_PORT, ServerConfig};
pub use connection::{CloseReason, ConnectionContext, serve_connection};
pub use error::{RecordError, ServerError, ServerResult};
pub use handler::{
    ConnectionHandler, Received, SessionState, legacy_period_start, legacy_population_size,
};
pub use metrics::ServerMetrics;
pub use server::{AggregationServer, ShutdownHandle};
pub use sink::{DiscardRouter, MetricsEmitter, ShardRouter, TracingEmitter};
pub use supervisor::{ConnectionSupervisor, sample_connection_lifetime};
pub use telemetry::init_tracing;
