//! Segment ownership tables
//!
//! Every hash function version ends up in the same shape: a list of
//! segments, each with an ordered owner list (primary first). Only the
//! way a key is mapped to a segment differs.
//!
//! ## Versions
//! - 1: MurmurHash2, hash ring (legacy)
//! - 2: MurmurHash3, hash ring (legacy)
//! - 3: MurmurHash3, fixed-size segments

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{HotRodError, Result};

use super::{HashFunction, ServerAddress};

/// How a normalized key hash is mapped to a segment
#[derive(Debug, Clone, PartialEq, Eq)]
enum SegmentLocator {
    /// `segment = hash / segment_size`
    Uniform { segment_size: u32 },

    /// Segment `i` covers `(positions[i - 1], positions[i]]`, wrapping
    Ring { positions: Vec<u32>, hash_space: u32 },
}

/// Immutable ownership table for one cache under one hash function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistentHash {
    version: u8,
    hash: HashFunction,
    locator: SegmentLocator,
    owners: Vec<Vec<ServerAddress>>,
}

impl ConsistentHash {
    /// Hash function version the table was built for
    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn hash_function(&self) -> HashFunction {
        self.hash
    }

    pub fn num_segments(&self) -> usize {
        self.owners.len()
    }

    /// Owners of `segment`, primary first
    pub fn segment_owners(&self, segment: usize) -> &[ServerAddress] {
        self.owners.get(segment).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Segment `key` belongs to, `None` for an empty table
    pub fn segment_of(&self, key: &[u8]) -> Option<usize> {
        if self.owners.is_empty() {
            return None;
        }
        let hash = self.hash.normalized_hash(key);

        let segment = match &self.locator {
            SegmentLocator::Uniform { segment_size } => (hash / segment_size) as usize,
            SegmentLocator::Ring {
                positions,
                hash_space,
            } => {
                let point = if *hash_space > 0 { hash % hash_space } else { hash };
                let idx = positions.partition_point(|p| *p < point);
                if idx == positions.len() {
                    0
                } else {
                    idx
                }
            }
        };

        Some(segment.min(self.owners.len() - 1))
    }

    /// Primary owner of `key`
    pub fn primary_owner(&self, key: &[u8]) -> Option<&ServerAddress> {
        let segment = self.segment_of(key)?;
        self.segment_owners(segment).first()
    }

    /// Every server that owns at least one segment
    pub fn servers(&self) -> BTreeSet<&ServerAddress> {
        self.owners.iter().flatten().collect()
    }
}

/// Builds `ConsistentHash` tables for the supported hash function versions
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsistentHashFactory;

impl ConsistentHashFactory {
    /// Highest hash function version understood by this client
    pub const MAX_VERSION: u8 = 3;

    /// Hash algorithm for a version
    pub fn hash_function(&self, version: u8) -> Result<HashFunction> {
        match version {
            1 => Ok(HashFunction::Murmur2),
            2 | 3 => Ok(HashFunction::Murmur3),
            other => Err(HotRodError::UnsupportedHashVersion(other)),
        }
    }

    /// Table from explicit per-segment owners
    pub fn new_segmented(
        &self,
        version: u8,
        segment_owners: Vec<Vec<ServerAddress>>,
        num_segments: u32,
    ) -> Result<ConsistentHash> {
        if version < Self::MAX_VERSION {
            return Err(HotRodError::UnsupportedHashVersion(version));
        }
        let hash = self.hash_function(version)?;

        if segment_owners.len() != num_segments as usize {
            return Err(HotRodError::Protocol(format!(
                "Segment owner table has {} entries, expected {}",
                segment_owners.len(),
                num_segments
            )));
        }

        let segment_size = if num_segments == 0 {
            1
        } else {
            (i32::MAX as u32).div_ceil(num_segments)
        };

        Ok(ConsistentHash {
            version,
            hash,
            locator: SegmentLocator::Uniform { segment_size },
            owners: segment_owners,
        })
    }

    /// Table from a legacy server-to-ring-positions map
    ///
    /// Each distinct ring position becomes one segment. Its owners are the
    /// server at that position followed by the next distinct servers
    /// clockwise, up to `num_key_owners`.
    pub fn new_legacy(
        &self,
        version: u8,
        servers_to_hash: &BTreeMap<ServerAddress, BTreeSet<i32>>,
        num_key_owners: i32,
        hash_space: i32,
    ) -> Result<ConsistentHash> {
        if version >= Self::MAX_VERSION {
            return Err(HotRodError::UnsupportedHashVersion(version));
        }
        let hash = self.hash_function(version)?;
        let hash_space = u32::try_from(hash_space).unwrap_or(0);

        let mut ring: Vec<(u32, &ServerAddress)> = servers_to_hash
            .iter()
            .flat_map(|(server, positions)| {
                positions.iter().map(move |p| {
                    let pos = (*p as u32) & 0x7fff_ffff;
                    let pos = if hash_space > 0 { pos % hash_space } else { pos };
                    (pos, server)
                })
            })
            .collect();
        ring.sort();
        ring.dedup_by_key(|(pos, _)| *pos);

        let replicas = usize::try_from(num_key_owners).unwrap_or(1).max(1);
        let owners = (0..ring.len())
            .map(|start| {
                let mut owners: Vec<ServerAddress> = Vec::with_capacity(replicas);
                for offset in 0..ring.len() {
                    if owners.len() == replicas {
                        break;
                    }
                    let server = ring[(start + offset) % ring.len()].1;
                    if !owners.contains(server) {
                        owners.push(server.clone());
                    }
                }
                owners
            })
            .collect();

        Ok(ConsistentHash {
            version,
            hash,
            locator: SegmentLocator::Ring {
                positions: ring.iter().map(|(pos, _)| *pos).collect(),
                hash_space,
            },
            owners,
        })
    }
}
