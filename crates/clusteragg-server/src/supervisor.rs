//! Per-connection supervision.
//!
//! Each accepted socket gets one [`ConnectionSupervisor::supervise`] task,
//! which spawns the connection task as its only child and forwards the
//! child's records downstream. The policy is stop-on-failure: any error or
//! panic in the child ends the supervisor too, and nothing is restarted.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clusteragg_types::StatisticRegistry;
use prometheus::IntGauge;
use rand::Rng;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument};

use crate::config::ConnectionSettings;
use crate::connection::{CloseReason, ConnectionContext, serve_connection};
use crate::error::{ServerError, ServerResult};
use crate::handler::ConnectionHandler;
use crate::metrics::ServerMetrics;
use crate::sink::{MetricsEmitter, ShardRouter};

/// Samples a connection lifetime uniformly from `[min, max]`.
///
/// Called once per connection; the lifetime is never re-rolled.
pub fn sample_connection_lifetime<R: Rng>(
    min: Duration,
    max: Duration,
    rng: &mut R,
) -> Duration {
    if min >= max {
        return min;
    }
    rng.gen_range(min..=max)
}

/// Shared collaborators cloned into every connection's supervisor.
#[derive(Clone)]
pub struct ConnectionSupervisor {
    router: Arc<dyn ShardRouter>,
    emitter: Arc<dyn MetricsEmitter>,
    registry: Arc<dyn StatisticRegistry>,
    metrics: Arc<ServerMetrics>,
    settings: ConnectionSettings,
}

impl ConnectionSupervisor {
    pub fn new(
        router: Arc<dyn ShardRouter>,
        emitter: Arc<dyn MetricsEmitter>,
        registry: Arc<dyn StatisticRegistry>,
        metrics: Arc<ServerMetrics>,
        settings: ConnectionSettings,
    ) -> Self {
        Self {
            router,
            emitter,
            registry,
            metrics,
            settings,
        }
    }

    pub fn metrics(&self) -> &Arc<ServerMetrics> {
        &self.metrics
    }

    pub fn settings(&self) -> ConnectionSettings {
        self.settings
    }

    /// Owns `stream` until its connection ends.
    ///
    /// Returns the child's close reason, or the error that stopped it.
    #[instrument(skip_all, fields(%peer))]
    pub async fn supervise<S>(
        self,
        stream: S,
        peer: SocketAddr,
        shutdown: watch::Receiver<bool>,
    ) -> ServerResult<CloseReason>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let lifetime = sample_connection_lifetime(
            self.settings.min_lifetime,
            self.settings.max_lifetime,
            &mut rand::thread_rng(),
        );
        let (events, mut records) = mpsc::channel(self.settings.event_channel_capacity);
        let handler = ConnectionHandler::new(Arc::clone(&self.registry), Arc::clone(&self.metrics));
        let ctx = ConnectionContext {
            peer,
            lifetime,
            read_buffer_size: self.settings.read_buffer_size,
            events,
            shutdown,
        };

        let active = ActiveConnection::new(&self.metrics.connections_active);
        info!(lifetime_secs = lifetime.as_secs(), "connection accepted");

        let child = ChildTask(tokio::spawn(serve_connection(stream, handler, ctx)));

        // The channel closes once the child has finished, whatever the outcome.
        while let Some(record) = records.recv().await {
            self.emitter.emit(&record);
            self.router.route(record);
            self.metrics.records_forwarded.inc();
        }

        let outcome = child.join().await;
        drop(active);

        match &outcome {
            Ok(reason) => {
                info!(%reason, "connection closed");
                self.metrics
                    .connections_closed
                    .with_label_values(&[reason.as_str()])
                    .inc();
            }
            Err(e) => {
                error!(error = %e, "connection failed, stopping supervisor");
                self.metrics
                    .connections_closed
                    .with_label_values(&["error"])
                    .inc();
            }
        }
        outcome
    }
}

/// Join handle that aborts the child when the supervisor is dropped.
struct ChildTask(JoinHandle<ServerResult<CloseReason>>);

impl ChildTask {
    async fn join(mut self) -> ServerResult<CloseReason> {
        match (&mut self.0).await {
            Ok(outcome) => outcome,
            Err(e) => Err(ServerError::ConnectionTask(e.to_string())),
        }
    }
}

impl Drop for ChildTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Holds one unit of the active-connections gauge until dropped.
struct ActiveConnection(IntGauge);

impl ActiveConnection {
    fn new(gauge: &IntGauge) -> Self {
        gauge.inc();
        Self(gauge.clone())
    }
}

impl Drop for ActiveConnection {
    fn drop(&mut self) {
        self.0.dec();
    }
}
