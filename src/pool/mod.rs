//! Pool Module
//!
//! Keyed connection pool: one bounded sub-pool of reusable connections per
//! server.
//!
//! ## Concurrency Model
//! - The sub-pool map sits behind an `RwLock`; borrows only take the read
//!   side to find their sub-pool
//! - Each sub-pool has its own `Mutex` + `Condvar`, so traffic to different
//!   servers never contends
//! - Connections are opened and destroyed outside every lock

mod keyed;

pub use keyed::{ConnectionPool, PooledConnection};
