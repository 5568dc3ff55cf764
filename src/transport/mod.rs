//! Transport Module
//!
//! Connection-level framed I/O and the factory that opens connections.
//!
//! ## Architecture
//! - `Transport`: one live channel bound to one server
//! - `ConnectionFactory`: opens, validates and destroys transports for
//!   the connection pool
//! - `TcpTransport` / `TcpConnectionFactory`: the plain TCP defaults

mod tcp;

pub use tcp::{TcpConnectionFactory, TcpTransport};

use crate::error::Result;
use crate::protocol::varint;
use crate::topology::ServerAddress;

/// A framed binary channel to one server
///
/// Implementations mark themselves invalid when an I/O error occurs so the
/// pool destroys them instead of handing them out again.
pub trait Transport: Send {
    /// Server this transport is bound to
    fn server(&self) -> &ServerAddress;

    /// Queue raw bytes for sending
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()>;

    /// Fill `buf` completely from the channel
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Send everything queued so far
    fn flush(&mut self) -> Result<()>;

    /// False once an I/O error has been observed
    fn is_valid(&self) -> bool;

    /// Mark the transport as broken
    fn invalidate(&mut self);

    /// Release the underlying channel
    fn close(&mut self) {}

    // -------------------------------------------------------------------------
    // Write path
    // -------------------------------------------------------------------------

    fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.write_bytes(&[byte])
    }

    fn write_varint(&mut self, value: u32) -> Result<()> {
        let mut buf = Vec::with_capacity(varint::MAX_VARINT_BYTES);
        varint::put_varint(&mut buf, value);
        self.write_bytes(&buf)
    }

    fn write_varlong(&mut self, value: u64) -> Result<()> {
        let mut buf = Vec::with_capacity(varint::MAX_VARLONG_BYTES);
        varint::put_varlong(&mut buf, value);
        self.write_bytes(&buf)
    }

    /// Write a varint length followed by the bytes
    fn write_array(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_varint(bytes.len() as u32)?;
        self.write_bytes(bytes)
    }

    // -------------------------------------------------------------------------
    // Read path
    // -------------------------------------------------------------------------

    fn read_byte(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.read_bytes(&mut byte)?;
        Ok(byte[0])
    }

    fn read_varint(&mut self) -> Result<u32> {
        varint::decode_varint(|| self.read_byte())
    }

    fn read_varlong(&mut self) -> Result<u64> {
        varint::decode_varlong(|| self.read_byte())
    }

    fn read_array(&mut self) -> Result<Vec<u8>> {
        let len = varint::check_array_len(self.read_varint()?)?;
        let mut bytes = vec![0u8; len];
        if len > 0 {
            self.read_bytes(&mut bytes)?;
        }
        Ok(bytes)
    }
}

/// Opens and disposes of connections on behalf of the pool
///
/// Handshakes and pings are not part of `connect`; the transport factory
/// runs them once a connection has been borrowed.
pub trait ConnectionFactory: Send + Sync + 'static {
    type Connection: Transport + 'static;

    /// Open a new connection to `server`
    fn connect(&self, server: &ServerAddress) -> Result<Self::Connection>;

    /// Check an idle connection before it is handed out or taken back
    fn validate(&self, connection: &mut Self::Connection) -> bool {
        connection.is_valid()
    }

    /// Close a connection that leaves the pool for good
    fn destroy(&self, mut connection: Self::Connection) {
        connection.close();
    }
}
