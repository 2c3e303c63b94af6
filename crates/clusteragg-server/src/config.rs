//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{ServerError, ServerResult};

/// Default aggregation port.
pub const DEFAULT_PORT: u16 = 7065;

/// Listener and per-connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind.
    pub bind_addr: SocketAddr,
    /// Pending-connection queue length passed to `listen`.
    pub backlog: u32,
    /// Connection settings applied to every accepted socket.
    pub connection: ConnectionSettings,
}

/// Settings sampled or applied once per accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Shortest lifetime a connection may be given.
    pub min_lifetime: Duration,
    /// Longest lifetime a connection may be given.
    pub max_lifetime: Duration,
    /// Capacity of the channel between a connection and its supervisor.
    pub event_channel_capacity: usize,
    /// Initial size of the socket read buffer.
    pub read_buffer_size: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            min_lifetime: Duration::from_secs(30 * 60),
            max_lifetime: Duration::from_secs(60 * 60),
            event_channel_capacity: 1024,
            read_buffer_size: 64 * 1024,
        }
    }
}

impl ServerConfig {
    /// Creates a configuration for `bind_addr` with default settings.
    pub fn new(bind_addr: impl Into<SocketAddr>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            backlog: 15,
            connection: ConnectionSettings::default(),
        }
    }

    pub fn with_backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog;
        self
    }

    pub fn with_connection_lifetime(mut self, min: Duration, max: Duration) -> Self {
        self.connection.min_lifetime = min;
        self.connection.max_lifetime = max;
        self
    }

    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.connection.event_channel_capacity = capacity;
        self
    }

    /// Checks the settings that would otherwise fail at runtime.
    pub fn validate(&self) -> ServerResult<()> {
        let connection = &self.connection;
        if connection.min_lifetime > connection.max_lifetime {
            return Err(ServerError::Config(format!(
                "min connection lifetime {:?} exceeds max {:?}",
                connection.min_lifetime, connection.max_lifetime
            )));
        }
        if connection.event_channel_capacity == 0 {
            return Err(ServerError::Config(
                "event channel capacity must be at least 1".to_string(),
            ));
        }
        if connection.read_buffer_size == 0 {
            return Err(ServerError::Config(
                "read buffer size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(([0, 0, 0, 0], DEFAULT_PORT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_aggregation_port() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 7065);
        assert_eq!(config.backlog, 15);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn inverted_lifetime_is_rejected() {
        let config = ServerConfig::default()
            .with_connection_lifetime(Duration::from_secs(10), Duration::from_secs(5));
        assert!(matches!(config.validate(), Err(ServerError::Config(_))));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let config = ServerConfig::default().with_event_channel_capacity(0);
        assert!(config.validate().is_err());
    }
}
