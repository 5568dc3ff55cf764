//! Error types for the Hot Rod transport layer
//!
//! Provides a unified error type for routing, pooling and framing.

use thiserror::Error;

/// Result type alias using HotRodError
pub type Result<T> = std::result::Result<T, HotRodError>;

/// Unified error type for transport operations
#[derive(Debug, Error)]
pub enum HotRodError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Protocol Errors
    // -------------------------------------------------------------------------
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The server answered with an error response
    #[error("Server error (status 0x{status:02x}): {message}")]
    Server { status: u8, message: String },

    // -------------------------------------------------------------------------
    // Routing Errors
    // -------------------------------------------------------------------------
    /// The balancer has no server to route to
    #[error("No servers available for routing")]
    NoServers,

    /// The balancer selected an identity that is no longer known
    #[error("Server not found: {0}")]
    ServerNotFound(String),

    #[error("Unsupported hash function version: {0}")]
    UnsupportedHashVersion(u8),

    // -------------------------------------------------------------------------
    // Pool Errors
    // -------------------------------------------------------------------------
    #[error("Connection pool exhausted for {server} after waiting {waited_ms} ms")]
    PoolExhausted { server: String, waited_ms: u64 },

    #[error("No connection pool for server {0}")]
    ServerNotInPool(String),

    #[error("Connection pool is closed")]
    PoolClosed,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl HotRodError {
    /// Whether the error came from the network rather than from routing,
    /// pooling or configuration
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HotRodError::Io(_) | HotRodError::PoolExhausted { .. }
        )
    }
}
