//! Transport Factory Module
//!
//! The single entry point that ties routing, balancing and pooling
//! together for one client instance.
//!
//! ## Responsibilities
//! - Build the topology view, balancer and pool from the configuration
//! - Resolve a (key, cache) pair to a server and borrow a connection
//! - Reconcile the pool, balancer and router with server-list changes
//! - Install and drop per-cache hash tables

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::balancer::{BalancingStrategy, RoundRobinBalancingStrategy};
use crate::config::Configuration;
use crate::error::{HotRodError, Result};
use crate::operations::{OperationContext, PingOperation};
use crate::pool::{ConnectionPool, PooledConnection};
use crate::protocol::{Codec, ResponseTopology};
use crate::topology::{
    ConsistentHash, ConsistentHashFactory, ServerAddress, ServerDiff, ServerIdentity,
    TopologyInfo,
};
use crate::transport::{ConnectionFactory, TcpConnectionFactory, Transport};

/// Everything that describes which servers exist and how keys reach them
struct RoutingState {
    topology: TopologyInfo,

    /// Balancer identities back to addresses
    identities: HashMap<ServerIdentity, ServerAddress>,
}

/// Topology-aware source of pooled transports
///
/// ## Concurrency Model: two-tier locking
///
/// - **Routing** (topology, identity map, balancer swaps, sub-pool
///   membership): serialized by `state`
/// - **Connections** (borrow/return/invalidate): no factory lock; each
///   sub-pool synchronizes itself
///
/// Topology changes are rare and short, checkouts are frequent, so only
/// the resolution step ever waits on the factory lock.
pub struct TransportFactory<F: ConnectionFactory = TcpConnectionFactory> {
    /// Client configuration (read only)
    config: Configuration,

    /// Codec handed to operations
    codec: Arc<dyn Codec>,

    /// Server selection when there is no hash-aware answer
    balancer: Box<dyn BalancingStrategy>,

    /// Per-server connection pools
    pool: ConnectionPool<F>,

    /// Factory lock
    state: Mutex<RoutingState>,
}

impl TransportFactory<TcpConnectionFactory> {
    /// Start a factory that opens plain TCP connections
    pub fn start(
        config: Configuration,
        codec: Arc<dyn Codec>,
        default_topology_id: u32,
    ) -> Result<Self> {
        let connection_factory = TcpConnectionFactory::new(&config);
        Self::start_with(config, codec, connection_factory, default_topology_id)
    }
}

impl<F: ConnectionFactory> TransportFactory<F> {
    /// Start a factory on top of a custom connection factory
    ///
    /// On startup:
    /// 1. Build the topology view from the configured servers
    /// 2. Pick the balancing strategy
    /// 3. Prepare one sub-pool per server
    /// 4. Fill the identity map and the balancer
    /// 5. Ping every server once to learn the live topology
    pub fn start_with(
        config: Configuration,
        codec: Arc<dyn Codec>,
        connection_factory: F,
        default_topology_id: u32,
    ) -> Result<Self> {
        // Step 1: Initial servers
        let initial_servers: Vec<ServerAddress> = config
            .servers
            .iter()
            .map(|s| ServerAddress::new(s.host.clone(), s.port))
            .collect();
        let topology = TopologyInfo::new(default_topology_id, initial_servers.clone());

        // Step 2: Balancer (configured override or round robin)
        let balancer: Box<dyn BalancingStrategy> = match &config.balancing_strategy {
            Some(producer) => producer(),
            None => Box::new(RoundRobinBalancingStrategy::new()),
        };

        // Step 3: Pool
        let pool = ConnectionPool::new(Arc::new(connection_factory), config.pool.clone());
        for server in &initial_servers {
            pool.prepare_pool(server)?;
        }

        // Step 4: Identity map and balancer list
        let mut identities = HashMap::new();
        let mut names = Vec::with_capacity(initial_servers.len());
        for server in &initial_servers {
            let identity = server.identity();
            identities.insert(identity.clone(), server.clone());
            names.push(identity);
        }
        balancer.set_servers(&names);

        tracing::info!(
            "Transport factory started with {} servers: {:?}",
            initial_servers.len(),
            names
        );

        let factory = Self {
            config,
            codec,
            balancer,
            pool,
            state: Mutex::new(RoutingState {
                topology,
                identities,
            }),
        };

        // Step 5: Best-effort topology discovery
        factory.ping_servers();
        Ok(factory)
    }

    // =========================================================================
    // Transport API
    // =========================================================================

    /// Borrow a connection to the next server chosen by the balancer
    pub fn get_transport(&self, cache_name: &[u8]) -> Result<PooledConnection<F>> {
        let server = {
            let state = self.state.lock();
            let identity = self.balancer.next_server()?;
            state
                .identities
                .get(&identity)
                .cloned()
                .ok_or_else(|| HotRodError::ServerNotFound(identity.to_string()))?
        };

        tracing::trace!(
            "Balanced transport for cache {:?} -> {}",
            String::from_utf8_lossy(cache_name),
            server
        );
        self.pool.borrow_object(&server)
    }

    /// Borrow a connection to the owner of `key`, or a balanced one when the
    /// cache has no hash-aware routing
    pub fn get_transport_for_key(
        &self,
        key: &[u8],
        cache_name: &[u8],
    ) -> Result<PooledConnection<F>> {
        let owner = self
            .state
            .lock()
            .topology
            .get_hash_aware_server(key, cache_name);

        match owner {
            Some(server) => self.pool.borrow_object(&server),
            None => self.get_transport(cache_name),
        }
    }

    /// Hand a connection back; broken ones are destroyed instead
    pub fn release_transport(&self, transport: PooledConnection<F>) {
        if transport.is_valid() {
            self.pool.return_object(transport);
        } else {
            self.pool.invalidate_object(transport);
        }
    }

    /// Destroy a connection an operation found broken
    pub fn invalidate_transport(&self, transport: PooledConnection<F>) {
        self.pool.invalidate_object(transport);
    }

    /// Header context for operations against `cache_name`
    pub fn operation_context(&self, cache_name: &[u8]) -> OperationContext {
        OperationContext::new(Arc::clone(&self.codec), cache_name, self.topology_id())
    }

    // =========================================================================
    // Topology updates
    // =========================================================================

    /// Reconcile pool, balancer and router with a new server list
    ///
    /// Order:
    /// 1. Add new servers to the pool (failover needs targets)
    /// 2. Map their identities
    /// 3. Swap the router's and the balancer's server lists
    /// 4. Clear the pools of removed servers, nothing routes to them now
    pub fn update_servers(&self, new_servers: Vec<ServerAddress>) -> ServerDiff {
        let mut state = self.state.lock();
        self.update_servers_locked(&mut state, new_servers)
    }

    /// Apply a server list pushed in a response header
    ///
    /// Returns false when the push is not newer than the last server list
    /// applied. Hash tables installed at the same id do not count.
    pub fn apply_topology(&self, topology: ResponseTopology) -> bool {
        let mut state = self.state.lock();
        if !state.topology.accept_servers_topology(topology.topology_id) {
            tracing::trace!(
                "Ignoring server list for topology {} (applied {})",
                topology.topology_id,
                state.topology.servers_topology_id()
            );
            return false;
        }
        self.update_servers_locked(&mut state, topology.servers);
        true
    }

    /// Install a legacy (ring based) hash table for `cache_name`
    pub fn update_hash_function_legacy(
        &self,
        servers_to_hash: &BTreeMap<ServerAddress, BTreeSet<i32>>,
        num_key_owners: i32,
        hash_function_version: u8,
        hash_space: i32,
        cache_name: &[u8],
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.topology.update_topology_legacy(
            servers_to_hash,
            num_key_owners,
            hash_function_version,
            hash_space,
            cache_name,
        )
    }

    /// Install a segment table for `cache_name`
    ///
    /// Returns `Ok(false)` when `topology_id` is not newer than the table
    /// already installed for the cache.
    pub fn update_hash_function(
        &self,
        segment_owners: Vec<Vec<ServerAddress>>,
        num_segments: u32,
        hash_function_version: u8,
        cache_name: &[u8],
        topology_id: u32,
    ) -> Result<bool> {
        let mut state = self.state.lock();
        tracing::trace!(
            "update_hash_function: version={} topology_id={}",
            hash_function_version,
            topology_id
        );
        state.topology.update_topology(
            segment_owners,
            num_segments,
            hash_function_version,
            cache_name,
            topology_id,
        )
    }

    /// Stop hash-aware routing for `cache_name`
    pub fn clear_hash_function(&self, cache_name: &[u8]) -> bool {
        self.state.lock().topology.consistent_hash_erase(cache_name)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Close every pooled connection and release the topology view
    pub fn destroy(self) {
        let state = self.state.into_inner();
        self.pool.clear();
        self.pool.close();
        tracing::info!(
            "Transport factory destroyed at topology {}",
            state.topology.topology_id()
        );
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn hash_factory(&self) -> ConsistentHashFactory {
        self.state.lock().topology.hash_factory()
    }

    /// Newest topology id seen
    pub fn topology_id(&self) -> u32 {
        self.state.lock().topology.topology_id()
    }

    /// Currently known servers
    pub fn servers(&self) -> Vec<ServerAddress> {
        self.state.lock().topology.servers().to_vec()
    }

    /// Hash table installed for `cache_name`
    pub fn consistent_hash(&self, cache_name: &[u8]) -> Option<Arc<ConsistentHash>> {
        self.state.lock().topology.consistent_hash(cache_name)
    }

    pub fn pool(&self) -> &ConnectionPool<F> {
        &self.pool
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    pub fn is_tcp_no_delay(&self) -> bool {
        self.config.tcp_no_delay
    }

    /// Socket timeout (milliseconds)
    pub fn so_timeout(&self) -> u64 {
        self.config.socket_timeout_ms
    }

    /// Connect timeout (milliseconds)
    pub fn connect_timeout(&self) -> u64 {
        self.config.connect_timeout_ms
    }

    pub fn is_ssl_enabled(&self) -> bool {
        self.config.ssl.enabled
    }

    pub fn ssl_server_ca_path(&self) -> &str {
        &self.config.ssl.server_ca_path
    }

    pub fn ssl_server_ca_file(&self) -> &str {
        &self.config.ssl.server_ca_file
    }

    pub fn ssl_client_certificate_file(&self) -> &str {
        &self.config.ssl.client_certificate_file
    }

    // =========================================================================
    // Internal
    // =========================================================================

    fn update_servers_locked(
        &self,
        state: &mut RoutingState,
        new_servers: Vec<ServerAddress>,
    ) -> ServerDiff {
        let diff = state.topology.diff_servers(&new_servers);
        if diff.is_empty() {
            return diff;
        }

        // Step 1: New servers first; a dead one still gets its sub-pool
        for server in &diff.added {
            if let Err(e) = self.pool.add_object(server) {
                tracing::warn!("Could not prime connection to new server {}: {}", server, e);
            }
        }

        // Step 2: Identity map
        let mut names = Vec::with_capacity(new_servers.len());
        for server in &new_servers {
            let identity = server.identity();
            state.identities.insert(identity.clone(), server.clone());
            names.push(identity);
        }

        // Step 3: Router and balancer switch to the new list
        state.topology.update_servers(new_servers);
        self.balancer.set_servers(&names);

        // Step 4: Removed servers
        for server in &diff.removed {
            self.pool.clear_server(server);
            let identity = server.identity();
            if !names.contains(&identity) {
                state.identities.remove(&identity);
            }
        }

        tracing::info!(
            "Servers updated: added {:?}, removed {:?}",
            diff.added,
            diff.removed
        );
        diff
    }

    /// Ping every known server once
    ///
    /// Failures are only traced: a server that is down now may come up
    /// later or disappear with the next topology update.
    fn ping_servers(&self) {
        for server in self.servers() {
            let mut transport = match self.pool.borrow_object(&server) {
                Ok(transport) => transport,
                Err(e) => {
                    tracing::trace!("Initial ping of {} failed: {}", server, e);
                    continue;
                }
            };

            let ping = PingOperation::new(self.operation_context(&[]));
            match ping.execute(&mut *transport) {
                Ok(pushed) => {
                    self.release_transport(transport);
                    if let Some(topology) = pushed {
                        self.apply_topology(topology);
                    }
                }
                Err(e) => {
                    tracing::trace!("Initial ping of {} failed: {}", server, e);
                    self.invalidate_transport(transport);
                }
            }
        }
    }
}
