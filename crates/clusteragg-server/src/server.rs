//! TCP listener for the aggregation port.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::config::ServerConfig;
use crate::connection::CloseReason;
use crate::error::{ServerError, ServerResult};
use crate::supervisor::ConnectionSupervisor;

/// Signals a running [`AggregationServer`] and its connections to stop.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        // send_replace never fails, even without receivers.
        self.sender.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.sender.borrow()
    }
}

/// Accepts aggregator connections and supervises one task per socket.
pub struct AggregationServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    supervisor: ConnectionSupervisor,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl AggregationServer {
    /// Binds the listener.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::BindFailed`] if the address cannot be bound,
    /// or [`ServerError::Config`] if the configuration is invalid.
    pub fn bind(config: &ServerConfig, supervisor: ConnectionSupervisor) -> ServerResult<Self> {
        config.validate()?;

        let addr = config.bind_addr;
        let listener = match listen(addr, config.backlog) {
            Ok(listener) => listener,
            Err(source) => {
                error!(%addr, error = %source, "failed to bind aggregation listener");
                return Err(ServerError::BindFailed { addr, source });
            }
        };
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "Successfully bound aggregation listener");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Ok(Self {
            listener,
            local_addr,
            supervisor,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            sender: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Runs the accept loop until shutdown is signalled.
    ///
    /// A failed connection ends only its own supervisor. On shutdown every
    /// open connection is told to close and awaited before returning.
    #[instrument(skip_all, fields(addr = %self.local_addr))]
    pub async fn run(self) -> ServerResult<()> {
        let Self {
            listener,
            supervisor,
            mut shutdown_rx,
            ..
        } = self;
        let mut connections: JoinSet<ServerResult<CloseReason>> = JoinSet::new();

        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!(%peer, error = %e, "failed to set TCP_NODELAY");
                        }
                        supervisor.metrics().connections_accepted.inc();
                        connections.spawn(supervisor.clone().supervise(
                            stream,
                            peer,
                            shutdown_rx.clone(),
                        ));
                    }
                    Err(e) => {
                        // Per-connection accept failures leave the listener usable.
                        warn!(error = %e, "accept failed");
                    }
                },
                Some(joined) = connections.join_next() => log_joined(joined),
            }
        }

        info!(open = connections.len(), "shutting down aggregation listener");
        drop(listener);
        while let Some(joined) = connections.join_next().await {
            log_joined(joined);
        }
        info!("aggregation listener stopped");
        Ok(())
    }
}

fn listen(addr: SocketAddr, backlog: u32) -> std::io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(backlog)
}

fn log_joined(joined: Result<ServerResult<CloseReason>, tokio::task::JoinError>) {
    match joined {
        Ok(Ok(reason)) => debug!(%reason, "connection task finished"),
        // The supervisor already logged the failure.
        Ok(Err(_)) => {}
        Err(e) => error!(error = %e, "connection supervisor panicked"),
    }
}
