//! Topology state
//!
//! The known server list, the topology id and one ownership table per
//! hash-aware cache. Not synchronized itself: the transport factory owns
//! it and only touches it under its lock.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use crate::error::Result;

use super::{ConsistentHash, ConsistentHashFactory, ServerAddress};

/// Result of comparing a new server list with the known one
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerDiff {
    /// In the new list only (sorted)
    pub added: Vec<ServerAddress>,

    /// In the old list only (sorted)
    pub removed: Vec<ServerAddress>,
}

impl ServerDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Clone)]
struct CacheTopology {
    /// Id of the push that installed the table (None for legacy pushes)
    topology_id: Option<u32>,
    hash: Arc<ConsistentHash>,
}

/// Per-client topology view
#[derive(Debug)]
pub struct TopologyInfo {
    servers: Vec<ServerAddress>,

    /// Newest id seen from any push
    topology_id: u32,

    /// Id of the last applied server list
    servers_topology_id: u32,

    caches: HashMap<Vec<u8>, CacheTopology>,
    hash_factory: ConsistentHashFactory,
}

impl TopologyInfo {
    pub fn new(default_topology_id: u32, servers: Vec<ServerAddress>) -> Self {
        Self {
            servers,
            topology_id: default_topology_id,
            servers_topology_id: default_topology_id,
            caches: HashMap::new(),
            hash_factory: ConsistentHashFactory,
        }
    }

    // =========================================================================
    // Servers
    // =========================================================================

    pub fn servers(&self) -> &[ServerAddress] {
        &self.servers
    }

    /// Compare `new_servers` with the known list
    pub fn diff_servers(&self, new_servers: &[ServerAddress]) -> ServerDiff {
        let old: BTreeSet<&ServerAddress> = self.servers.iter().collect();
        let new: BTreeSet<&ServerAddress> = new_servers.iter().collect();

        ServerDiff {
            added: new.difference(&old).map(|s| (*s).clone()).collect(),
            removed: old.difference(&new).map(|s| (*s).clone()).collect(),
        }
    }

    /// Replace the known server list, returning what changed
    pub fn update_servers(&mut self, new_servers: Vec<ServerAddress>) -> ServerDiff {
        let diff = self.diff_servers(&new_servers);
        self.servers = new_servers;
        diff
    }

    // =========================================================================
    // Topology id
    // =========================================================================

    /// Newest topology id applied so far
    pub fn topology_id(&self) -> u32 {
        self.topology_id
    }

    /// Advance the topology id; older or equal ids are ignored
    pub fn advance_topology_id(&mut self, topology_id: u32) -> bool {
        if topology_id > self.topology_id {
            self.topology_id = topology_id;
            true
        } else {
            false
        }
    }

    /// Id of the last applied server list
    pub fn servers_topology_id(&self) -> u32 {
        self.servers_topology_id
    }

    /// Accept a server list pushed at `topology_id`
    ///
    /// Gated only on earlier server lists, so a hash table installed first
    /// for the same id does not hide it.
    pub fn accept_servers_topology(&mut self, topology_id: u32) -> bool {
        if topology_id <= self.servers_topology_id {
            return false;
        }
        self.servers_topology_id = topology_id;
        self.advance_topology_id(topology_id);
        true
    }

    /// Topology id of the table installed for `cache_name`
    pub fn cache_topology_id(&self, cache_name: &[u8]) -> Option<u32> {
        self.caches.get(cache_name).and_then(|c| c.topology_id)
    }

    // =========================================================================
    // Hash-aware routing
    // =========================================================================

    pub fn hash_factory(&self) -> ConsistentHashFactory {
        self.hash_factory
    }

    pub fn consistent_hash(&self, cache_name: &[u8]) -> Option<Arc<ConsistentHash>> {
        self.caches.get(cache_name).map(|c| Arc::clone(&c.hash))
    }

    /// Primary owner of `key` in `cache_name`
    ///
    /// `None` means "no hash-aware answer, use the balancer".
    pub fn get_hash_aware_server(&self, key: &[u8], cache_name: &[u8]) -> Option<ServerAddress> {
        self.caches
            .get(cache_name)
            .and_then(|c| c.hash.primary_owner(key))
            .cloned()
    }

    /// Install a segment table for `cache_name`
    ///
    /// Returns `Ok(false)` when the push is not newer than the installed
    /// table and was dropped.
    pub fn update_topology(
        &mut self,
        segment_owners: Vec<Vec<ServerAddress>>,
        num_segments: u32,
        hash_function_version: u8,
        cache_name: &[u8],
        topology_id: u32,
    ) -> Result<bool> {
        if let Some(applied) = self.cache_topology_id(cache_name) {
            if topology_id <= applied {
                tracing::trace!(
                    "Dropping stale topology {} for cache {:?} (applied {})",
                    topology_id,
                    String::from_utf8_lossy(cache_name),
                    applied
                );
                return Ok(false);
            }
        }

        let hash = self.hash_factory.new_segmented(
            hash_function_version,
            segment_owners,
            num_segments,
        )?;

        self.caches.insert(
            cache_name.to_vec(),
            CacheTopology {
                topology_id: Some(topology_id),
                hash: Arc::new(hash),
            },
        );
        self.advance_topology_id(topology_id);

        tracing::debug!(
            "Installed {} segments (hash v{}) for cache {:?} at topology {}",
            num_segments,
            hash_function_version,
            String::from_utf8_lossy(cache_name),
            topology_id
        );
        Ok(true)
    }

    /// Install a table from a legacy server-to-hash map
    pub fn update_topology_legacy(
        &mut self,
        servers_to_hash: &BTreeMap<ServerAddress, BTreeSet<i32>>,
        num_key_owners: i32,
        hash_function_version: u8,
        hash_space: i32,
        cache_name: &[u8],
    ) -> Result<()> {
        let hash = self.hash_factory.new_legacy(
            hash_function_version,
            servers_to_hash,
            num_key_owners,
            hash_space,
        )?;

        tracing::debug!(
            "Installed legacy ring of {} positions (hash v{}) for cache {:?}",
            hash.num_segments(),
            hash_function_version,
            String::from_utf8_lossy(cache_name)
        );
        self.caches.insert(
            cache_name.to_vec(),
            CacheTopology {
                topology_id: None,
                hash: Arc::new(hash),
            },
        );
        Ok(())
    }

    /// Stop hash-aware routing for `cache_name`
    pub fn consistent_hash_erase(&mut self, cache_name: &[u8]) -> bool {
        self.caches.remove(cache_name).is_some()
    }
}
