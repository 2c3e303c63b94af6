//! The task that reads one socket and drives its [`ConnectionHandler`].

use std::fmt::{self, Display};
use std::net::SocketAddr;
use std::time::Duration;

use bytes::BytesMut;
use clusteragg_types::AggregatedData;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, instrument};

use crate::error::{ServerError, ServerResult};
use crate::handler::ConnectionHandler;

/// Why a connection ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client closed its side of the socket.
    PeerClosed,
    /// The connection's randomized lifetime elapsed.
    LifetimeElapsed,
    /// The server is shutting down.
    Shutdown,
}

impl CloseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PeerClosed => "peer_closed",
            Self::LifetimeElapsed => "lifetime_elapsed",
            Self::Shutdown => "shutdown",
        }
    }
}

impl Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a connection task needs besides its socket.
pub struct ConnectionContext {
    pub peer: SocketAddr,
    pub lifetime: Duration,
    pub read_buffer_size: usize,
    pub events: mpsc::Sender<AggregatedData>,
    pub shutdown: watch::Receiver<bool>,
}

/// Serves one connection until the peer leaves, the lifetime elapses or the
/// server shuts down.
///
/// Bytes are processed strictly in arrival order. Records are sent to the
/// supervisor as soon as the chunk that completed them has been decoded.
///
/// # Errors
///
/// Any socket error, fatal framing error or a closed event channel ends the
/// connection with an error.
#[instrument(skip_all, fields(peer = %ctx.peer, lifetime_secs = ctx.lifetime.as_secs()))]
pub async fn serve_connection<S>(
    mut stream: S,
    mut handler: ConnectionHandler,
    mut ctx: ConnectionContext,
) -> ServerResult<CloseReason>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let deadline = tokio::time::sleep(ctx.lifetime);
    tokio::pin!(deadline);

    let mut read_buf = BytesMut::with_capacity(ctx.read_buffer_size);

    let outcome = loop {
        read_buf.clear();
        tokio::select! {
            () = &mut deadline => {
                info!("connection lifetime elapsed, closing");
                break Ok(CloseReason::LifetimeElapsed);
            }
            changed = ctx.shutdown.changed() => {
                if changed.is_err() || *ctx.shutdown.borrow() {
                    break Ok(CloseReason::Shutdown);
                }
            }
            read = stream.read_buf(&mut read_buf) => {
                let n = match read {
                    Ok(n) => n,
                    Err(e) => break Err(ServerError::Io(e)),
                };
                if n == 0 {
                    debug!("peer closed connection");
                    break Ok(CloseReason::PeerClosed);
                }

                let received = handler.on_received(&read_buf);
                let mut supervisor_gone = false;
                for record in received.records {
                    if ctx.events.send(record).await.is_err() {
                        supervisor_gone = true;
                        break;
                    }
                }
                if supervisor_gone {
                    break Err(ServerError::ConnectionClosed);
                }
                if let Some(e) = received.fatal {
                    break Err(ServerError::Wire(e));
                }
            }
        }
    };

    handler.close();
    if !matches!(outcome, Ok(CloseReason::PeerClosed)) {
        // Best effort; the socket is dropped either way.
        let _ = stream.shutdown().await;
    }
    outcome
}
