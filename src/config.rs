//! Configuration for the transport layer
//!
//! Centralized configuration with sensible defaults. The transport factory
//! only ever reads from it.

use std::fmt;
use std::time::Duration;

use crate::balancer::BalancingStrategyProducer;

/// Main client configuration
#[derive(Clone)]
pub struct Configuration {
    // -------------------------------------------------------------------------
    // Cluster
    // -------------------------------------------------------------------------
    /// Initial servers, used until the cluster reports its own topology
    pub servers: Vec<ServerConfig>,

    /// Optional balancing strategy constructor (round robin when absent)
    pub balancing_strategy: Option<BalancingStrategyProducer>,

    // -------------------------------------------------------------------------
    // Connection Pool
    // -------------------------------------------------------------------------
    pub pool: PoolConfig,

    // -------------------------------------------------------------------------
    // Network
    // -------------------------------------------------------------------------
    /// Connect timeout (milliseconds)
    pub connect_timeout_ms: u64,

    /// Socket read/write timeout (milliseconds, 0 = none)
    pub socket_timeout_ms: u64,

    /// Disable Nagle's algorithm on new sockets
    pub tcp_no_delay: bool,

    /// Retry budget handed to the operation layer
    pub max_retries: u32,

    // -------------------------------------------------------------------------
    // SSL
    // -------------------------------------------------------------------------
    pub ssl: SslConfig,
}

/// A statically configured server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

/// What a borrow does when a server's sub-pool is at `max_active`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaustedAction {
    /// Fail immediately with `PoolExhausted`
    Fail,

    /// Block up to `max_wait`, then fail with `PoolExhausted`
    Wait,

    /// Create a connection past the limit
    Grow,
}

/// Sizing and validation policy of the per-server sub-pools
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Behaviour when a sub-pool is exhausted
    pub exhausted_action: ExhaustedAction,

    /// Hand out the most recently returned idle connection first
    pub lifo: bool,

    /// Max connections (idle + checked out) per server, negative = unbounded
    pub max_active: i32,

    /// Max idle connections kept per server, negative = unbounded
    pub max_idle: i32,

    /// Idle connections opened when a server's sub-pool is prepared
    pub min_idle: usize,

    /// Max time a borrow blocks with `ExhaustedAction::Wait` (None = forever)
    pub max_wait: Option<Duration>,

    /// Ask the connection factory to validate idle connections on borrow
    pub test_on_borrow: bool,

    /// Ask the connection factory to validate connections on return
    pub test_on_return: bool,

    /// Idle time after which `evict_idle` may close a connection
    pub min_evictable_idle_time: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            exhausted_action: ExhaustedAction::Wait,
            lifo: true,
            max_active: -1,
            max_idle: -1,
            min_idle: 1,
            max_wait: None,
            test_on_borrow: false,
            test_on_return: false,
            min_evictable_idle_time: Duration::from_secs(30 * 60),
        }
    }
}

impl PoolConfig {
    pub(crate) fn max_active_limit(&self) -> Option<usize> {
        usize::try_from(self.max_active).ok()
    }

    pub(crate) fn max_idle_limit(&self) -> Option<usize> {
        usize::try_from(self.max_idle).ok()
    }
}

/// SSL settings; only surfaced to callers, the TCP transport is plain text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SslConfig {
    pub enabled: bool,

    /// Directory with CA certificates (PEM) for server verification
    pub server_ca_path: String,

    /// CA certificate file for server verification
    pub server_ca_file: String,

    /// Client certificate file
    pub client_certificate_file: String,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            servers: vec![ServerConfig::new("127.0.0.1", 11222)],
            balancing_strategy: None,
            pool: PoolConfig::default(),
            connect_timeout_ms: 60_000,
            socket_timeout_ms: 60_000,
            tcp_no_delay: true,
            max_retries: 10,
            ssl: SslConfig::default(),
        }
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("servers", &self.servers)
            .field("balancing_strategy", &self.balancing_strategy.is_some())
            .field("pool", &self.pool)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("socket_timeout_ms", &self.socket_timeout_ms)
            .field("tcp_no_delay", &self.tcp_no_delay)
            .field("max_retries", &self.max_retries)
            .field("ssl", &self.ssl)
            .finish()
    }
}

impl Configuration {
    /// Create a new config builder
    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::default()
    }
}

/// Builder for Configuration
///
/// The first call to `add_server` replaces the default server list.
#[derive(Default)]
pub struct ConfigurationBuilder {
    config: Configuration,
    servers_set: bool,
}

impl ConfigurationBuilder {
    /// Add an initial server
    pub fn add_server(mut self, host: impl Into<String>, port: u16) -> Self {
        if !self.servers_set {
            self.config.servers.clear();
            self.servers_set = true;
        }
        self.config.servers.push(ServerConfig::new(host, port));
        self
    }

    /// Replace the balancing strategy
    pub fn balancing_strategy(mut self, producer: BalancingStrategyProducer) -> Self {
        self.config.balancing_strategy = Some(producer);
        self
    }

    /// Set the connection pool policy
    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.config.pool = pool;
        self
    }

    /// Set the connect timeout (in milliseconds)
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    /// Set the socket timeout (in milliseconds)
    pub fn socket_timeout_ms(mut self, ms: u64) -> Self {
        self.config.socket_timeout_ms = ms;
        self
    }

    pub fn tcp_no_delay(mut self, enabled: bool) -> Self {
        self.config.tcp_no_delay = enabled;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn ssl(mut self, ssl: SslConfig) -> Self {
        self.config.ssl = ssl;
        self
    }

    pub fn build(self) -> Configuration {
        self.config
    }
}
