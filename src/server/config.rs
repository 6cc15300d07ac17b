//! Server configuration

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::registry::RegistryConfig;

/// Default listen port
pub const DEFAULT_PORT: u16 = 5000;

/// Default maximum inbound message size in bytes
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 2048;

/// Shortest ping interval the writer will schedule
pub const MIN_PING_INTERVAL: Duration = Duration::from_millis(1);

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Largest inbound message accepted; bigger frames close the connection
    pub max_message_size: usize,

    /// How often the server pings each client (floored at `MIN_PING_INTERVAL`)
    pub ping_interval: Duration,

    /// Close the connection if nothing arrives from the client for this long
    pub pong_timeout: Duration,

    /// Maximum time a single outbound write may take
    pub write_timeout: Duration,

    /// Registry and outbound queue settings
    pub registry: RegistryConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::from([0, 0, 0, 0]), DEFAULT_PORT),
            max_connections: 0, // Unlimited
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            ping_interval: Duration::from_secs(54),
            pong_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(10),
            registry: RegistryConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Build a config from the process environment
    ///
    /// | Variable                 | Default   |
    /// |--------------------------|-----------|
    /// | `PORT`                   | `5000`    |
    /// | `RELAY_HOST`             | `0.0.0.0` |
    /// | `RELAY_MAX_CONNECTIONS`  | `0`       |
    /// | `RELAY_MAX_MESSAGE_SIZE` | `2048`    |
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        // Empty values count as unset
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(port) = get("PORT") {
            let port: u16 = parse_var("PORT", &port)?;
            config.bind_addr.set_port(port);
        }
        if let Some(host) = get("RELAY_HOST") {
            let ip: IpAddr = parse_var("RELAY_HOST", &host)?;
            config.bind_addr.set_ip(ip);
        }
        if let Some(max) = get("RELAY_MAX_CONNECTIONS") {
            config.max_connections = parse_var("RELAY_MAX_CONNECTIONS", &max)?;
        }
        if let Some(size) = get("RELAY_MAX_MESSAGE_SIZE") {
            let size: usize = parse_var("RELAY_MAX_MESSAGE_SIZE", &size)?;
            config = config.max_message_size(size);
        }

        Ok(config)
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set maximum inbound message size
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size.max(1);
        self
    }

    /// Set ping interval
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval.max(MIN_PING_INTERVAL);
        self
    }

    /// Set pong timeout
    pub fn pong_timeout(mut self, timeout: Duration) -> Self {
        self.pong_timeout = timeout;
        self
    }

    /// Set write timeout
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set registry configuration
    pub fn registry(mut self, registry: RegistryConfig) -> Self {
        self.registry = registry;
        self
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("{}={:?}: {}", key, value, e)))
}
