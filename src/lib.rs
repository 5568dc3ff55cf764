//! # hotrod-transport
//!
//! Client-side transport layer for a Hot Rod style key-value cluster:
//! - Consistent-hash routing with several hash function versions
//! - Pluggable load balancing (round robin by default)
//! - Per-server connection pools with validation and invalidation
//! - Varint based binary framing and the shared request header
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Operation layer                            │
//! │          (get / put / remove ... outside this crate)         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ key + cache name
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                  Transport Factory                           │
//! │        (factory lock: topology, identities, balancer)        │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │  Topology   │ fallback │  Balancer   │
//!   │ (segments)  │ ───────▶ │(round robin)│
//!   └──────┬──────┘          └──────┬──────┘
//!          └────────────┬────────────┘
//!                       ▼
//!               ┌───────────────┐
//!               │ Connection    │
//!               │ Pool (per     │
//!               │ server)       │
//!               └───────┬───────┘
//!                       ▼
//!               ┌───────────────┐
//!               │ Transport +   │
//!               │ Codec         │
//!               └───────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod transport;
pub mod pool;
pub mod balancer;
pub mod topology;
pub mod operations;
pub mod factory;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{HotRodError, Result};
pub use config::Configuration;
pub use factory::TransportFactory;
pub use topology::{ServerAddress, ServerIdentity};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
