//! Topology Tests
//!
//! Tests verify:
//! - Segment lookup for hash function version 3
//! - Legacy ring tables (versions 1 and 2)
//! - Stale topology pushes are dropped
//! - Server list diffs

use std::collections::{BTreeMap, BTreeSet};

use hotrod_transport::topology::{ConsistentHashFactory, HashFunction, TopologyInfo};
use hotrod_transport::{HotRodError, ServerAddress};

fn addr(host: &str) -> ServerAddress {
    ServerAddress::new(host, 11222)
}

/// First generated key whose segment satisfies `pred`
fn find_key(pred: impl Fn(&[u8]) -> bool) -> Vec<u8> {
    (0..10_000)
        .map(|i| format!("key-{}", i).into_bytes())
        .find(|k| pred(k.as_slice()))
        .expect("no key found")
}

// =============================================================================
// Segment Table Tests
// =============================================================================

#[test]
fn test_key_routes_to_segment_owner() {
    let (a, b) = (addr("a"), addr("b"));
    let mut topology = TopologyInfo::new(0, vec![a.clone(), b.clone()]);

    let applied = topology
        .update_topology(vec![vec![a.clone()], vec![b.clone()]], 2, 3, b"default", 1)
        .unwrap();
    assert!(applied);

    let hash = topology.consistent_hash(b"default").unwrap();
    let key_in_1 = find_key(|k| hash.segment_of(k) == Some(1));
    let key_in_0 = find_key(|k| hash.segment_of(k) == Some(0));

    assert_eq!(topology.get_hash_aware_server(&key_in_1, b"default"), Some(b));
    assert_eq!(topology.get_hash_aware_server(&key_in_0, b"default"), Some(a));
}

#[test]
fn test_uniform_segment_size() {
    let factory = ConsistentHashFactory;
    let owners: Vec<_> = (0..7).map(|i| vec![addr(&format!("s{}", i))]).collect();
    let hash = factory.new_segmented(3, owners, 7).unwrap();

    let segment_size = (i32::MAX as u32).div_ceil(7);
    for i in 0..200 {
        let key = format!("user:{}", i).into_bytes();
        let expected = (HashFunction::Murmur3.normalized_hash(&key) / segment_size) as usize;
        assert_eq!(hash.segment_of(&key), Some(expected));
        assert!(expected < 7);
    }
}

#[test]
fn test_routing_is_deterministic() {
    let owners: Vec<_> = (0..16).map(|i| vec![addr(&format!("s{}", i % 3))]).collect();
    let mut first = TopologyInfo::new(0, vec![]);
    let mut second = TopologyInfo::new(0, vec![]);
    first.update_topology(owners.clone(), 16, 3, b"c", 1).unwrap();
    second.update_topology(owners, 16, 3, b"c", 1).unwrap();

    for i in 0..100 {
        let key = format!("k{}", i).into_bytes();
        assert_eq!(
            first.get_hash_aware_server(&key, b"c"),
            second.get_hash_aware_server(&key, b"c")
        );
        assert_eq!(
            first.get_hash_aware_server(&key, b"c"),
            first.get_hash_aware_server(&key, b"c")
        );
    }
}

#[test]
fn test_primary_owner_is_first_in_list() {
    let factory = ConsistentHashFactory;
    let hash = factory
        .new_segmented(3, vec![vec![addr("a"), addr("b")]], 1)
        .unwrap();

    assert_eq!(hash.primary_owner(b"anything"), Some(&addr("a")));
    assert_eq!(hash.segment_owners(0), &[addr("a"), addr("b")]);
    assert_eq!(hash.servers().len(), 2);
}

#[test]
fn test_no_owners_means_no_hash_aware_server() {
    let mut topology = TopologyInfo::new(0, vec![addr("a")]);

    topology.update_topology(vec![], 0, 3, b"empty", 1).unwrap();
    assert!(topology.consistent_hash(b"empty").is_some());
    assert_eq!(topology.get_hash_aware_server(b"k", b"empty"), None);

    topology
        .update_topology(vec![vec![], vec![]], 2, 3, b"orphans", 2)
        .unwrap();
    assert_eq!(topology.get_hash_aware_server(b"k", b"orphans"), None);
}

#[test]
fn test_unknown_cache_has_no_hash_aware_server() {
    let topology = TopologyInfo::new(0, vec![addr("a")]);
    assert_eq!(topology.get_hash_aware_server(b"k", b"default"), None);
}

#[test]
fn test_owner_count_mismatch_is_rejected() {
    let mut topology = TopologyInfo::new(0, vec![]);
    let result = topology.update_topology(vec![vec![addr("a")]], 4, 3, b"c", 1);

    assert!(matches!(result, Err(HotRodError::Protocol(_))));
    assert!(topology.consistent_hash(b"c").is_none());
}

#[test]
fn test_unsupported_hash_versions_are_rejected() {
    let mut topology = TopologyInfo::new(0, vec![]);

    for version in [0u8, 4, 255] {
        let result = topology.update_topology(vec![vec![addr("a")]], 1, version, b"c", 1);
        assert!(matches!(result, Err(HotRodError::UnsupportedHashVersion(v)) if v == version));
    }

    // Versions 1 and 2 only come as legacy rings
    let result = topology.update_topology(vec![vec![addr("a")]], 1, 2, b"c", 1);
    assert!(matches!(result, Err(HotRodError::UnsupportedHashVersion(2))));
}

#[test]
fn test_hash_function_per_version() {
    let factory = ConsistentHashFactory;
    assert_eq!(factory.hash_function(1).unwrap(), HashFunction::Murmur2);
    assert_eq!(factory.hash_function(2).unwrap(), HashFunction::Murmur3);
    assert_eq!(factory.hash_function(3).unwrap(), HashFunction::Murmur3);
    assert!(factory.hash_function(4).is_err());
    assert_eq!(ConsistentHashFactory::MAX_VERSION, 3);
}

// =============================================================================
// Topology Id Tests
// =============================================================================

#[test]
fn test_stale_push_leaves_table_unchanged() {
    let (a, b) = (addr("a"), addr("b"));
    let mut topology = TopologyInfo::new(0, vec![a.clone(), b.clone()]);

    assert!(topology.update_topology(vec![vec![a.clone()]], 1, 3, b"c", 5).unwrap());
    let installed = topology.consistent_hash(b"c").unwrap();

    assert!(!topology.update_topology(vec![vec![b.clone()]], 1, 3, b"c", 5).unwrap());
    assert!(!topology.update_topology(vec![vec![b.clone()]], 1, 3, b"c", 3).unwrap());
    assert_eq!(*topology.consistent_hash(b"c").unwrap(), *installed);
    assert_eq!(topology.get_hash_aware_server(b"k", b"c"), Some(a));

    assert!(topology.update_topology(vec![vec![b.clone()]], 1, 3, b"c", 6).unwrap());
    assert_eq!(topology.get_hash_aware_server(b"k", b"c"), Some(b));
    assert_eq!(topology.cache_topology_id(b"c"), Some(6));
    assert_eq!(topology.topology_id(), 6);
}

#[test]
fn test_topology_ids_are_tracked_per_cache() {
    let mut topology = TopologyInfo::new(0, vec![addr("a")]);

    topology.update_topology(vec![vec![addr("a")]], 1, 3, b"one", 9).unwrap();
    assert!(topology.update_topology(vec![vec![addr("a")]], 1, 3, b"two", 4).unwrap());

    assert_eq!(topology.cache_topology_id(b"one"), Some(9));
    assert_eq!(topology.cache_topology_id(b"two"), Some(4));
    assert_eq!(topology.topology_id(), 9);
}

#[test]
fn test_advance_topology_id_only_moves_forward() {
    let mut topology = TopologyInfo::new(10, vec![]);

    assert!(!topology.advance_topology_id(10));
    assert!(!topology.advance_topology_id(3));
    assert!(topology.advance_topology_id(11));
    assert_eq!(topology.topology_id(), 11);
}

#[test]
fn test_server_list_id_is_separate_from_hash_ids() {
    let mut topology = TopologyInfo::new(0, vec![addr("a")]);

    topology
        .update_topology(vec![vec![addr("a")], vec![addr("b")]], 2, 3, b"c", 1)
        .unwrap();
    assert_eq!(topology.topology_id(), 1);
    assert_eq!(topology.servers_topology_id(), 0);

    assert!(topology.accept_servers_topology(1));
    assert!(!topology.accept_servers_topology(1));
    assert!(!topology.accept_servers_topology(0));
    assert_eq!(topology.servers_topology_id(), 1);

    assert!(topology.accept_servers_topology(4));
    assert_eq!(topology.topology_id(), 4);
}

#[test]
fn test_erase_disables_hash_aware_routing() {
    let mut topology = TopologyInfo::new(0, vec![addr("a")]);
    topology.update_topology(vec![vec![addr("a")]], 1, 3, b"c", 1).unwrap();

    assert!(topology.consistent_hash_erase(b"c"));
    assert!(!topology.consistent_hash_erase(b"c"));
    assert_eq!(topology.get_hash_aware_server(b"k", b"c"), None);

    // Erased table no longer blocks older ids
    assert!(topology.update_topology(vec![vec![addr("a")]], 1, 3, b"c", 1).unwrap());
}

// =============================================================================
// Legacy Ring Tests
// =============================================================================

fn ring(entries: &[(&str, &[i32])]) -> BTreeMap<ServerAddress, BTreeSet<i32>> {
    entries
        .iter()
        .map(|(host, positions)| (addr(host), positions.iter().copied().collect()))
        .collect()
}

#[test]
fn test_legacy_ring_owner_is_next_position_clockwise() {
    let (a, b) = (addr("a"), addr("b"));
    let mut topology = TopologyInfo::new(0, vec![a.clone(), b.clone()]);
    topology
        .update_topology_legacy(&ring(&[("a", &[100]), ("b", &[200])]), 1, 1, 1000, b"c")
        .unwrap();

    for i in 0..200 {
        let key = format!("k{}", i).into_bytes();
        let point = HashFunction::Murmur2.normalized_hash(&key) % 1000;
        let expected = if point > 100 && point <= 200 { &b } else { &a };
        assert_eq!(
            topology.get_hash_aware_server(&key, b"c").as_ref(),
            Some(expected),
            "key {:?} at point {}",
            String::from_utf8_lossy(&key),
            point
        );
    }
}

#[test]
fn test_legacy_segments_carry_backup_owners() {
    let factory = ConsistentHashFactory;
    let servers = ring(&[("a", &[10, 500]), ("b", &[20]), ("c", &[30])]);
    let hash = factory.new_legacy(2, &servers, 2, 1000).unwrap();

    assert_eq!(hash.version(), 2);
    assert_eq!(hash.hash_function(), HashFunction::Murmur3);
    assert_eq!(hash.num_segments(), 4);
    assert_eq!(hash.segment_owners(0), &[addr("a"), addr("b")]);
    assert_eq!(hash.segment_owners(2), &[addr("c"), addr("a")]);
    // Position 500 wraps around to 10, which is `a` again
    assert_eq!(hash.segment_owners(3), &[addr("a"), addr("b")]);
}

#[test]
fn test_legacy_rejects_segmented_version() {
    let factory = ConsistentHashFactory;
    let result = factory.new_legacy(3, &ring(&[("a", &[1])]), 1, 100);
    assert!(matches!(result, Err(HotRodError::UnsupportedHashVersion(3))));
}

#[test]
fn test_legacy_push_replaces_segment_table() {
    let mut topology = TopologyInfo::new(0, vec![addr("a"), addr("b")]);
    topology.update_topology(vec![vec![addr("a")]], 1, 3, b"c", 4).unwrap();

    topology
        .update_topology_legacy(&ring(&[("b", &[5])]), 1, 2, 100, b"c")
        .unwrap();

    assert_eq!(topology.consistent_hash(b"c").unwrap().version(), 2);
    assert_eq!(topology.cache_topology_id(b"c"), None);
    assert_eq!(topology.get_hash_aware_server(b"k", b"c"), Some(addr("b")));
}

// =============================================================================
// Server List Tests
// =============================================================================

#[test]
fn test_server_diff() {
    let mut topology = TopologyInfo::new(0, vec![addr("a"), addr("b")]);

    let diff = topology.update_servers(vec![addr("c"), addr("b")]);
    assert_eq!(diff.added, vec![addr("c")]);
    assert_eq!(diff.removed, vec![addr("a")]);
    assert_eq!(topology.servers(), &[addr("c"), addr("b")]);

    assert!(topology.diff_servers(&[addr("b"), addr("c")]).is_empty());
}
