//! Topology Module
//!
//! Server addresses, key hashing and per-cache segment ownership.
//!
//! ## Responsibilities
//! - Canonical server identities for the balancer and identity map
//! - Hash functions shared with the servers, one per version
//! - Ownership tables replaced whole on every topology push
//! - Server-list diffs that drive pool membership changes

mod address;
mod hash;
mod consistent_hash;
mod info;

pub use address::{ServerAddress, ServerIdentity};
pub use hash::{murmur2, murmur3_x64_128, HashFunction};
pub use consistent_hash::{ConsistentHash, ConsistentHashFactory};
pub use info::{ServerDiff, TopologyInfo};
