//! Balancer Module
//!
//! Picks a server when there is no hash-aware routing answer: initial
//! connections, caches without a segment table, fallbacks.

mod round_robin;

pub use round_robin::RoundRobinBalancingStrategy;

use std::sync::Arc;

use crate::error::Result;
use crate::topology::ServerIdentity;

/// Server selection policy
///
/// Implementations are shared between threads. `set_servers` must take
/// effect atomically: once it returns, `next_server` only yields servers
/// from the new list.
pub trait BalancingStrategy: Send + Sync {
    /// Replace the candidate list
    fn set_servers(&self, servers: &[ServerIdentity]);

    /// Next server to contact; `NoServers` when the list is empty
    fn next_server(&self) -> Result<ServerIdentity>;
}

/// Constructor for a custom strategy, supplied through the configuration
pub type BalancingStrategyProducer = Arc<dyn Fn() -> Box<dyn BalancingStrategy> + Send + Sync>;
