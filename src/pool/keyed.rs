//! Keyed connection pool
//!
//! A connection is always in exactly one place: idle in its sub-pool,
//! checked out by one caller, or destroyed.

use std::collections::{HashMap, VecDeque};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex, RwLock};

use crate::config::{ExhaustedAction, PoolConfig};
use crate::error::{HotRodError, Result};
use crate::topology::ServerAddress;
use crate::transport::{ConnectionFactory, Transport};

/// A checked-out connection
///
/// Hand it back through `return_object` or `invalidate_object`. Dropping it
/// instead destroys the connection and frees its slot.
pub struct PooledConnection<F: ConnectionFactory> {
    /// `None` only while being handed back
    conn: Option<F::Connection>,

    /// Sub-pool the connection was borrowed from
    sub: Arc<SubPool<F::Connection>>,

    factory: Arc<F>,
}

impl<F: ConnectionFactory> PooledConnection<F> {
    fn into_parts(mut self) -> (F::Connection, Arc<SubPool<F::Connection>>) {
        let conn = self.conn.take().expect("pooled connection already released");
        (conn, Arc::clone(&self.sub))
    }
}

impl<F: ConnectionFactory> Deref for PooledConnection<F> {
    type Target = F::Connection;

    fn deref(&self) -> &F::Connection {
        self.conn.as_ref().expect("pooled connection already released")
    }
}

impl<F: ConnectionFactory> DerefMut for PooledConnection<F> {
    fn deref_mut(&mut self) -> &mut F::Connection {
        self.conn.as_mut().expect("pooled connection already released")
    }
}

impl<F: ConnectionFactory> Drop for PooledConnection<F> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::debug!("Connection to {} dropped while checked out", conn.server());
            self.sub.release_slot();
            self.factory.destroy(conn);
        }
    }
}

struct IdleConnection<C> {
    conn: C,
    since: Instant,
}

struct SubPoolState<C> {
    idle: VecDeque<IdleConnection<C>>,

    /// Checked out plus reserved for a connect in progress
    active: usize,

    /// Set when the sub-pool is cleared; it is never reopened
    closed: bool,
}

impl<C> SubPoolState<C> {
    fn total(&self) -> usize {
        self.active + self.idle.len()
    }
}

struct SubPool<C> {
    state: Mutex<SubPoolState<C>>,
    available: Condvar,
}

impl<C> SubPool<C> {
    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn release_slot(&self) {
        let mut state = self.state.lock();
        state.active = state.active.saturating_sub(1);
        drop(state);
        self.available.notify_one();
    }
}

/// Per-server pools of live connections
pub struct ConnectionPool<F: ConnectionFactory> {
    factory: Arc<F>,
    config: PoolConfig,
    pools: RwLock<HashMap<ServerAddress, Arc<SubPool<F::Connection>>>>,
    closed: AtomicBool,
}

impl<F: ConnectionFactory> ConnectionPool<F> {
    pub fn new(factory: Arc<F>, config: PoolConfig) -> Self {
        Self {
            factory,
            config,
            pools: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn connection_factory(&self) -> &Arc<F> {
        &self.factory
    }

    // =========================================================================
    // Sub-pool membership
    // =========================================================================

    /// Create the sub-pool for `server` and open up to `min_idle` connections
    ///
    /// Connect failures are tolerated: the server may come up later.
    pub fn prepare_pool(&self, server: &ServerAddress) -> Result<()> {
        let sub = self.get_or_create(server)?;

        while self.reserve_below(&sub, self.config.min_idle) {
            match self.factory.connect(server) {
                Ok(conn) => self.push_idle(&sub, conn),
                Err(e) => {
                    sub.release_slot();
                    tracing::debug!("Could not pre-open connection to {}: {}", server, e);
                    break;
                }
            }
        }
        Ok(())
    }

    /// Create the sub-pool for a newly observed server and prime it with one
    /// idle connection
    pub fn add_object(&self, server: &ServerAddress) -> Result<()> {
        let sub = self.get_or_create(server)?;

        let limit = self.config.max_active_limit().unwrap_or(usize::MAX);
        if !self.reserve_below(&sub, limit) {
            return Ok(());
        }
        match self.factory.connect(server) {
            Ok(conn) => {
                self.push_idle(&sub, conn);
                Ok(())
            }
            Err(e) => {
                sub.release_slot();
                Err(e)
            }
        }
    }

    /// Drop the sub-pool of `server` and close its idle connections
    ///
    /// Connections checked out at this point are destroyed when they come
    /// back. Borrows fail until the server is added again.
    pub fn clear_server(&self, server: &ServerAddress) {
        let removed = self.pools.write().remove(server);
        if let Some(sub) = removed {
            let drained = Self::close_sub_pool(&sub);
            tracing::debug!(
                "Cleared pool for {} ({} idle connections closed)",
                server,
                drained.len()
            );
            self.destroy_all(drained);
        }
    }

    /// Drop every sub-pool
    pub fn clear(&self) {
        let removed: Vec<_> = self.pools.write().drain().collect();
        for (server, sub) in removed {
            let drained = Self::close_sub_pool(&sub);
            tracing::debug!("Cleared pool for {}", server);
            self.destroy_all(drained);
        }
    }

    /// Clear the pool and refuse new sub-pools from now on
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Servers that currently have a sub-pool
    pub fn servers(&self) -> Vec<ServerAddress> {
        let mut servers: Vec<_> = self.pools.read().keys().cloned().collect();
        servers.sort();
        servers
    }

    // =========================================================================
    // Borrow / Return
    // =========================================================================

    /// Check out a validated connection to `server`
    ///
    /// Reuses an idle connection when one passes validation, otherwise opens
    /// a new one if the sub-pool is below `max_active`. At the limit the
    /// configured `ExhaustedAction` decides.
    pub fn borrow_object(&self, server: &ServerAddress) -> Result<PooledConnection<F>> {
        let sub = self.sub_pool(server)?;
        let started = Instant::now();

        loop {
            let mut state = sub.state.lock();
            if state.closed {
                return Err(self.missing_pool_error(server));
            }

            // Idle connection available: validate it outside the lock
            if let Some(idle) = self.pop_idle(&mut state) {
                state.active += 1;
                drop(state);

                let mut conn = idle.conn;
                if self.is_usable(&mut conn, self.config.test_on_borrow) {
                    return Ok(self.checked_out(&sub, conn));
                }
                tracing::debug!("Discarding invalid idle connection to {}", server);
                sub.release_slot();
                self.factory.destroy(conn);
                continue;
            }

            let below_limit = match self.config.max_active_limit() {
                Some(max) => state.total() < max,
                None => true,
            };
            if below_limit || self.config.exhausted_action == ExhaustedAction::Grow {
                state.active += 1;
                drop(state);

                return match self.factory.connect(server) {
                    Ok(conn) => Ok(self.checked_out(&sub, conn)),
                    Err(e) => {
                        sub.release_slot();
                        Err(e)
                    }
                };
            }

            if self.config.exhausted_action == ExhaustedAction::Fail {
                return Err(Self::exhausted(server, started));
            }

            match self.config.max_wait {
                None => sub.available.wait(&mut state),
                Some(max_wait) => {
                    if sub
                        .available
                        .wait_until(&mut state, started + max_wait)
                        .timed_out()
                    {
                        return Err(Self::exhausted(server, started));
                    }
                }
            }
        }
    }

    /// Give a checked-out connection back
    ///
    /// It becomes idle unless it is invalid, its sub-pool has been cleared,
    /// or the sub-pool already holds `max_idle` idle connections.
    pub fn return_object(&self, conn: PooledConnection<F>) {
        let (mut conn, sub) = conn.into_parts();
        let usable = !sub.is_closed() && self.is_usable(&mut conn, self.config.test_on_return);

        let mut state = sub.state.lock();
        state.active = state.active.saturating_sub(1);

        let idle_room = match self.config.max_idle_limit() {
            Some(max) => state.idle.len() < max,
            None => true,
        };
        if usable && idle_room && !state.closed {
            state.idle.push_back(IdleConnection {
                conn,
                since: Instant::now(),
            });
            drop(state);
            sub.available.notify_one();
            return;
        }

        let stale = state.closed;
        drop(state);
        sub.available.notify_one();
        if stale {
            tracing::debug!("Destroying connection to {} from a cleared pool", conn.server());
        }
        self.factory.destroy(conn);
    }

    /// Destroy a checked-out connection and free its slot
    pub fn invalidate_object(&self, conn: PooledConnection<F>) {
        let (conn, sub) = conn.into_parts();

        sub.release_slot();
        tracing::debug!("Invalidated connection to {}", conn.server());
        self.factory.destroy(conn);
    }

    // =========================================================================
    // Eviction
    // =========================================================================

    /// Close idle connections older than `min_evictable_idle_time`, keeping
    /// `min_idle` per server. Returns the number closed.
    pub fn evict_idle(&self) -> usize {
        let subs: Vec<_> = self.pools.read().values().cloned().collect();
        let mut evicted = Vec::new();

        for sub in subs {
            let mut state = sub.state.lock();
            while state.idle.len() > self.config.min_idle {
                let expired = state
                    .idle
                    .front()
                    .is_some_and(|c| c.since.elapsed() >= self.config.min_evictable_idle_time);
                if !expired {
                    break;
                }
                if let Some(idle) = state.idle.pop_front() {
                    evicted.push(idle.conn);
                }
            }
        }

        let count = evicted.len();
        self.destroy_all(evicted);
        count
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    pub fn num_idle(&self, server: &ServerAddress) -> usize {
        self.pools
            .read()
            .get(server)
            .map(|sub| sub.state.lock().idle.len())
            .unwrap_or(0)
    }

    pub fn num_active(&self, server: &ServerAddress) -> usize {
        self.pools
            .read()
            .get(server)
            .map(|sub| sub.state.lock().active)
            .unwrap_or(0)
    }

    // =========================================================================
    // Internal
    // =========================================================================

    fn get_or_create(&self, server: &ServerAddress) -> Result<Arc<SubPool<F::Connection>>> {
        if self.is_closed() {
            return Err(HotRodError::PoolClosed);
        }

        let mut pools = self.pools.write();
        let sub = pools.entry(server.clone()).or_insert_with(|| {
            tracing::debug!("Created pool for {}", server);
            Arc::new(SubPool {
                state: Mutex::new(SubPoolState {
                    idle: VecDeque::new(),
                    active: 0,
                    closed: false,
                }),
                available: Condvar::new(),
            })
        });
        Ok(Arc::clone(sub))
    }

    fn sub_pool(&self, server: &ServerAddress) -> Result<Arc<SubPool<F::Connection>>> {
        self.pools
            .read()
            .get(server)
            .cloned()
            .ok_or_else(|| self.missing_pool_error(server))
    }

    fn missing_pool_error(&self, server: &ServerAddress) -> HotRodError {
        if self.is_closed() {
            HotRodError::PoolClosed
        } else {
            HotRodError::ServerNotInPool(server.to_string())
        }
    }

    fn exhausted(server: &ServerAddress, started: Instant) -> HotRodError {
        HotRodError::PoolExhausted {
            server: server.to_string(),
            waited_ms: started.elapsed().as_millis() as u64,
        }
    }

    fn pop_idle(
        &self,
        state: &mut SubPoolState<F::Connection>,
    ) -> Option<IdleConnection<F::Connection>> {
        if self.config.lifo {
            state.idle.pop_back()
        } else {
            state.idle.pop_front()
        }
    }

    fn checked_out(
        &self,
        sub: &Arc<SubPool<F::Connection>>,
        conn: F::Connection,
    ) -> PooledConnection<F> {
        PooledConnection {
            conn: Some(conn),
            sub: Arc::clone(sub),
            factory: Arc::clone(&self.factory),
        }
    }

    fn is_usable(&self, conn: &mut F::Connection, run_factory_check: bool) -> bool {
        conn.is_valid() && (!run_factory_check || self.factory.validate(conn))
    }

    /// Reserve a slot if the sub-pool holds fewer than `limit` connections
    fn reserve_below(&self, sub: &SubPool<F::Connection>, limit: usize) -> bool {
        let mut state = sub.state.lock();
        if state.closed || state.total() >= limit {
            return false;
        }
        state.active += 1;
        true
    }

    /// Move a freshly opened connection from a reserved slot to idle
    fn push_idle(&self, sub: &SubPool<F::Connection>, conn: F::Connection) {
        let mut state = sub.state.lock();
        state.active = state.active.saturating_sub(1);
        if state.closed {
            drop(state);
            self.factory.destroy(conn);
            return;
        }
        state.idle.push_back(IdleConnection {
            conn,
            since: Instant::now(),
        });
        drop(state);
        sub.available.notify_one();
    }

    fn close_sub_pool(sub: &SubPool<F::Connection>) -> Vec<F::Connection> {
        let mut state = sub.state.lock();
        state.closed = true;
        let drained = state.idle.drain(..).map(|idle| idle.conn).collect();
        drop(state);
        sub.available.notify_all();
        drained
    }

    fn destroy_all(&self, conns: Vec<F::Connection>) {
        for conn in conns {
            self.factory.destroy(conn);
        }
    }
}
