//! Round robin balancing
//!
//! The default strategy.

use parking_lot::Mutex;

use crate::error::{HotRodError, Result};
use crate::topology::ServerIdentity;

use super::BalancingStrategy;

#[derive(Debug, Default)]
struct RoundRobinState {
    servers: Vec<ServerIdentity>,
    index: usize,
}

/// Cycles through the server list in order, wrapping at the end
///
/// List and index live under one mutex so a swap and a selection never
/// interleave.
#[derive(Debug, Default)]
pub struct RoundRobinBalancingStrategy {
    state: Mutex<RoundRobinState>,
}

impl RoundRobinBalancingStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current candidate list
    pub fn servers(&self) -> Vec<ServerIdentity> {
        self.state.lock().servers.clone()
    }
}

impl BalancingStrategy for RoundRobinBalancingStrategy {
    fn set_servers(&self, servers: &[ServerIdentity]) {
        let mut state = self.state.lock();
        state.servers = servers.to_vec();
        if state.index >= state.servers.len() {
            state.index = 0;
        }
        tracing::debug!("Balancer servers set to {:?}", state.servers);
    }

    fn next_server(&self) -> Result<ServerIdentity> {
        let mut state = self.state.lock();
        if state.servers.is_empty() {
            return Err(HotRodError::NoServers);
        }

        let server = state.servers[state.index].clone();
        state.index = (state.index + 1) % state.servers.len();
        Ok(server)
    }
}
