//! Server addresses
//!
//! `ServerAddress` is what connections are opened to; `ServerIdentity` is
//! the canonical key the balancer and the identity map use.

use std::fmt;

/// Host and port of a cluster node
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServerAddress {
    host: String,
    port: u16,
}

impl ServerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Canonical identity of this address
    pub fn identity(&self) -> ServerIdentity {
        ServerIdentity::from(self)
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Comparable `host:port` key with the host lower-cased
///
/// Two addresses naming the same node compare equal as identities even if
/// the address values were built separately.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServerIdentity(String);

impl ServerIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&ServerAddress> for ServerIdentity {
    fn from(address: &ServerAddress) -> Self {
        ServerIdentity(format!(
            "{}:{}",
            address.host.to_ascii_lowercase(),
            address.port
        ))
    }
}

impl fmt::Display for ServerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
