//! Connection Pool Tests
//!
//! Tests verify:
//! - The max_active limit and the exhausted actions
//! - Idle reuse, LIFO/FIFO order and the max_idle cap
//! - Validation on borrow and return
//! - Clearing a server, stale connections and closing the pool
//! - Eviction of old idle connections

#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::{addr, MemoryConnectionFactory};
use hotrod_transport::config::{ExhaustedAction, PoolConfig};
use hotrod_transport::pool::ConnectionPool;
use hotrod_transport::transport::Transport;
use hotrod_transport::{HotRodError, ServerAddress};

fn pool_with(config: PoolConfig) -> (ConnectionPool<MemoryConnectionFactory>, ServerAddress) {
    let server = addr("node1", 11222);
    let pool = ConnectionPool::new(Arc::new(MemoryConnectionFactory::new()), config);
    pool.prepare_pool(&server).unwrap();
    (pool, server)
}

fn empty_config() -> PoolConfig {
    PoolConfig {
        min_idle: 0,
        ..PoolConfig::default()
    }
}

// =============================================================================
// Borrow / Return Tests
// =============================================================================

#[test]
fn test_prepare_pool_opens_min_idle() {
    let (pool, server) = pool_with(PoolConfig {
        min_idle: 3,
        ..PoolConfig::default()
    });

    assert_eq!(pool.num_idle(&server), 3);
    assert_eq!(pool.num_active(&server), 0);
    assert_eq!(pool.connection_factory().connects(), 3);
}

#[test]
fn test_borrow_reuses_returned_connection() {
    let (pool, server) = pool_with(empty_config());

    let conn = pool.borrow_object(&server).unwrap();
    let id = conn.id;
    assert_eq!(pool.num_active(&server), 1);
    pool.return_object(conn);

    assert_eq!(pool.num_idle(&server), 1);
    assert_eq!(pool.num_active(&server), 0);

    let again = pool.borrow_object(&server).unwrap();
    assert_eq!(again.id, id);
    assert_eq!(pool.connection_factory().connects(), 1);
    pool.return_object(again);
}

#[test]
fn test_borrow_unknown_server_fails() {
    let (pool, _) = pool_with(empty_config());

    let result = pool.borrow_object(&addr("elsewhere", 11222));
    assert!(matches!(result, Err(HotRodError::ServerNotInPool(_))));
}

#[test]
fn test_lifo_returns_most_recent_idle() {
    let (pool, server) = pool_with(empty_config());

    let first = pool.borrow_object(&server).unwrap();
    let second = pool.borrow_object(&server).unwrap();
    let second_id = second.id;
    pool.return_object(first);
    pool.return_object(second);

    assert_eq!(pool.borrow_object(&server).unwrap().id, second_id);
}

#[test]
fn test_fifo_returns_oldest_idle() {
    let (pool, server) = pool_with(PoolConfig {
        lifo: false,
        ..empty_config()
    });

    let first = pool.borrow_object(&server).unwrap();
    let second = pool.borrow_object(&server).unwrap();
    let first_id = first.id;
    pool.return_object(first);
    pool.return_object(second);

    assert_eq!(pool.borrow_object(&server).unwrap().id, first_id);
}

#[test]
fn test_return_over_max_idle_destroys() {
    let (pool, server) = pool_with(PoolConfig {
        max_idle: 1,
        ..empty_config()
    });

    let a = pool.borrow_object(&server).unwrap();
    let b = pool.borrow_object(&server).unwrap();
    pool.return_object(a);
    pool.return_object(b);

    assert_eq!(pool.num_idle(&server), 1);
    assert_eq!(pool.connection_factory().destroyed(), 1);
}

#[test]
fn test_return_invalid_connection_destroys() {
    let (pool, server) = pool_with(empty_config());

    let mut conn = pool.borrow_object(&server).unwrap();
    conn.invalidate();
    pool.return_object(conn);

    assert_eq!(pool.num_idle(&server), 0);
    assert_eq!(pool.num_active(&server), 0);
    assert_eq!(pool.connection_factory().destroyed(), 1);
}

#[test]
fn test_invalidate_frees_slot() {
    let (pool, server) = pool_with(PoolConfig {
        max_active: 1,
        exhausted_action: ExhaustedAction::Fail,
        ..empty_config()
    });

    let conn = pool.borrow_object(&server).unwrap();
    pool.invalidate_object(conn);
    assert_eq!(pool.connection_factory().destroyed(), 1);

    let conn = pool.borrow_object(&server).unwrap();
    assert_eq!(conn.id, 2);
}

#[test]
fn test_connect_failure_releases_slot() {
    let (pool, server) = pool_with(PoolConfig {
        max_active: 1,
        exhausted_action: ExhaustedAction::Fail,
        ..empty_config()
    });

    pool.connection_factory().set_down(&server, true);
    assert!(matches!(pool.borrow_object(&server), Err(HotRodError::Io(_))));
    assert_eq!(pool.num_active(&server), 0);

    pool.connection_factory().set_down(&server, false);
    assert!(pool.borrow_object(&server).is_ok());
}

#[test]
fn test_dropped_connection_frees_slot() {
    let (pool, server) = pool_with(PoolConfig {
        max_active: 1,
        exhausted_action: ExhaustedAction::Fail,
        ..empty_config()
    });

    let conn = pool.borrow_object(&server).unwrap();
    drop(conn);

    assert_eq!(pool.num_active(&server), 0);
    assert_eq!(pool.num_idle(&server), 0);
    assert_eq!(pool.connection_factory().destroyed(), 1);

    let conn = pool.borrow_object(&server).unwrap();
    assert_eq!(conn.id, 2);
}

#[test]
fn test_dropped_connection_wakes_waiter() {
    let (pool, server) = pool_with(PoolConfig {
        max_active: 1,
        exhausted_action: ExhaustedAction::Wait,
        ..empty_config()
    });

    let held = pool.borrow_object(&server).unwrap();

    crossbeam::thread::scope(|s| {
        let waiter = s.spawn(|_| pool.borrow_object(&server));

        thread::sleep(Duration::from_millis(50));
        drop(held);

        let conn = waiter.join().unwrap().unwrap();
        assert_eq!(conn.id, 2);
        pool.return_object(conn);
    })
    .unwrap();

    assert_eq!(pool.num_active(&server), 0);
    assert_eq!(pool.num_idle(&server), 1);
}

#[test]
fn test_dropped_connection_from_cleared_pool_leaves_new_pool_alone() {
    let (pool, server) = pool_with(empty_config());

    let stale = pool.borrow_object(&server).unwrap();
    pool.clear_server(&server);
    pool.add_object(&server).unwrap();

    drop(stale);

    assert_eq!(pool.num_idle(&server), 1);
    assert_eq!(pool.num_active(&server), 0);
    assert_eq!(pool.connection_factory().destroyed(), 1);
}

// =============================================================================
// Exhaustion Tests
// =============================================================================

#[test]
fn test_never_exceeds_max_active_with_fail() {
    let (pool, server) = pool_with(PoolConfig {
        max_active: 2,
        exhausted_action: ExhaustedAction::Fail,
        ..empty_config()
    });

    let _a = pool.borrow_object(&server).unwrap();
    let _b = pool.borrow_object(&server).unwrap();

    match pool.borrow_object(&server) {
        Err(e @ HotRodError::PoolExhausted { .. }) => assert!(e.is_transient()),
        Err(other) => panic!("Expected PoolExhausted, got {:?}", other),
        Ok(_) => panic!("Expected PoolExhausted, got a connection"),
    }
    assert_eq!(pool.num_active(&server), 2);
}

#[test]
fn test_wait_times_out_after_max_wait() {
    let (pool, server) = pool_with(PoolConfig {
        max_active: 1,
        exhausted_action: ExhaustedAction::Wait,
        max_wait: Some(Duration::from_millis(50)),
        ..empty_config()
    });

    let _held = pool.borrow_object(&server).unwrap();

    match pool.borrow_object(&server) {
        Err(HotRodError::PoolExhausted { waited_ms, .. }) => assert!(waited_ms >= 40),
        Err(other) => panic!("Expected PoolExhausted, got {:?}", other),
        Ok(_) => panic!("Expected PoolExhausted, got a connection"),
    }
}

#[test]
fn test_waiter_wakes_when_connection_returned() {
    let (pool, server) = pool_with(PoolConfig {
        max_active: 1,
        exhausted_action: ExhaustedAction::Wait,
        ..empty_config()
    });

    let held = pool.borrow_object(&server).unwrap();
    let held_id = held.id;

    crossbeam::thread::scope(|s| {
        let waiter = s.spawn(|_| pool.borrow_object(&server));

        thread::sleep(Duration::from_millis(50));
        pool.return_object(held);

        let conn = waiter.join().unwrap().unwrap();
        assert_eq!(conn.id, held_id);
        pool.return_object(conn);
    })
    .unwrap();

    assert_eq!(pool.connection_factory().connects(), 1);
}

#[test]
fn test_grow_ignores_max_active() {
    let (pool, server) = pool_with(PoolConfig {
        max_active: 1,
        exhausted_action: ExhaustedAction::Grow,
        ..empty_config()
    });

    let _a = pool.borrow_object(&server).unwrap();
    let _b = pool.borrow_object(&server).unwrap();
    assert_eq!(pool.num_active(&server), 2);
}

#[test]
fn test_concurrent_borrowers_respect_max_active() {
    let (pool, server) = pool_with(PoolConfig {
        max_active: 3,
        exhausted_action: ExhaustedAction::Wait,
        ..empty_config()
    });

    crossbeam::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|_| {
                for _ in 0..50 {
                    let conn = pool.borrow_object(&server).unwrap();
                    assert!(pool.num_active(&server) <= 3);
                    pool.return_object(conn);
                }
            });
        }
    })
    .unwrap();

    assert!(pool.connection_factory().connects() <= 3);
    assert_eq!(pool.num_active(&server), 0);
}

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn test_borrow_discards_idle_failing_validation() {
    let (pool, server) = pool_with(PoolConfig {
        min_idle: 1,
        test_on_borrow: true,
        ..PoolConfig::default()
    });
    assert_eq!(pool.num_idle(&server), 1);

    pool.connection_factory().reject_on_validate(true);
    let conn = pool.borrow_object(&server).unwrap();

    assert_eq!(conn.id, 2);
    assert_eq!(pool.connection_factory().destroyed(), 1);
}

#[test]
fn test_return_failing_validation_destroys() {
    let (pool, server) = pool_with(PoolConfig {
        test_on_return: true,
        ..empty_config()
    });

    let conn = pool.borrow_object(&server).unwrap();
    pool.connection_factory().reject_on_validate(true);
    pool.return_object(conn);

    assert_eq!(pool.num_idle(&server), 0);
    assert_eq!(pool.connection_factory().destroyed(), 1);
}

// =============================================================================
// Membership Tests
// =============================================================================

#[test]
fn test_prepare_pool_tolerates_down_server() {
    let server = addr("node1", 11222);
    let factory = MemoryConnectionFactory::new();
    factory.set_down(&server, true);
    let pool = ConnectionPool::new(Arc::new(factory), PoolConfig::default());

    pool.prepare_pool(&server).unwrap();
    assert_eq!(pool.servers(), vec![server.clone()]);
    assert_eq!(pool.num_idle(&server), 0);

    pool.connection_factory().set_down(&server, false);
    assert!(pool.borrow_object(&server).is_ok());
}

#[test]
fn test_clear_server_blocks_borrows_until_added() {
    let (pool, server) = pool_with(PoolConfig::default());
    assert_eq!(pool.num_idle(&server), 1);

    pool.clear_server(&server);
    assert_eq!(pool.connection_factory().destroyed(), 1);
    assert!(pool.servers().is_empty());
    assert!(matches!(
        pool.borrow_object(&server),
        Err(HotRodError::ServerNotInPool(_))
    ));

    pool.add_object(&server).unwrap();
    assert_eq!(pool.num_idle(&server), 1);
    assert!(pool.borrow_object(&server).is_ok());
}

#[test]
fn test_add_object_reports_connect_failure() {
    let server = addr("node2", 11222);
    let (pool, _) = pool_with(empty_config());
    pool.connection_factory().set_down(&server, true);

    assert!(pool.add_object(&server).is_err());
    assert!(pool.servers().contains(&server));
    assert_eq!(pool.num_active(&server), 0);
}

#[test]
fn test_connection_from_cleared_pool_destroyed_on_return() {
    let (pool, server) = pool_with(empty_config());

    let stale = pool.borrow_object(&server).unwrap();
    pool.clear_server(&server);
    pool.add_object(&server).unwrap();
    assert_eq!(pool.num_idle(&server), 1);

    pool.return_object(stale);

    assert_eq!(pool.num_idle(&server), 1);
    assert_eq!(pool.num_active(&server), 0);
    assert_eq!(pool.connection_factory().destroyed(), 1);
}

#[test]
fn test_clear_wakes_waiters() {
    let (pool, server) = pool_with(PoolConfig {
        max_active: 1,
        exhausted_action: ExhaustedAction::Wait,
        ..empty_config()
    });
    let held = pool.borrow_object(&server).unwrap();

    crossbeam::thread::scope(|s| {
        let waiter = s.spawn(|_| pool.borrow_object(&server));

        thread::sleep(Duration::from_millis(50));
        pool.clear_server(&server);

        let result = waiter.join().unwrap();
        assert!(matches!(result, Err(HotRodError::ServerNotInPool(_))));
    })
    .unwrap();

    pool.return_object(held);
    assert_eq!(pool.connection_factory().destroyed(), 1);
}

#[test]
fn test_close_refuses_new_pools() {
    let (pool, server) = pool_with(PoolConfig::default());

    pool.close();
    assert!(pool.is_closed());
    assert_eq!(pool.connection_factory().destroyed(), 1);
    assert!(matches!(pool.borrow_object(&server), Err(HotRodError::PoolClosed)));
    assert!(matches!(pool.prepare_pool(&server), Err(HotRodError::PoolClosed)));
}

// =============================================================================
// Eviction Tests
// =============================================================================

#[test]
fn test_evict_idle_keeps_min_idle() {
    let (pool, server) = pool_with(PoolConfig {
        min_idle: 1,
        min_evictable_idle_time: Duration::ZERO,
        ..PoolConfig::default()
    });

    let conns: Vec<_> = (0..3).map(|_| pool.borrow_object(&server).unwrap()).collect();
    for conn in conns {
        pool.return_object(conn);
    }
    assert_eq!(pool.num_idle(&server), 3);

    assert_eq!(pool.evict_idle(), 2);
    assert_eq!(pool.num_idle(&server), 1);
    assert_eq!(pool.connection_factory().destroyed(), 2);
}

#[test]
fn test_evict_idle_skips_recent_connections() {
    let (pool, server) = pool_with(empty_config());

    let conn = pool.borrow_object(&server).unwrap();
    pool.return_object(conn);

    assert_eq!(pool.evict_idle(), 0);
    assert_eq!(pool.num_idle(&server), 1);
}
