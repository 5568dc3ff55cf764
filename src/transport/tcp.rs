//! TCP transport
//!
//! Plain TCP connections with buffered reads and a per-connection write
//! buffer that is sent on `flush`.

use std::io::{BufReader, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use bytes::BytesMut;

use crate::config::Configuration;
use crate::error::{HotRodError, Result};
use crate::topology::ServerAddress;

use super::{ConnectionFactory, Transport};

/// Initial capacity of the write buffer
const WRITE_BUFFER_SIZE: usize = 1024;

/// A single TCP connection to one server
pub struct TcpTransport {
    /// Server this connection was opened to
    server: ServerAddress,

    /// Write half; requests are assembled in `write_buf` first
    stream: TcpStream,

    /// Read half (buffered for efficiency)
    reader: BufReader<TcpStream>,

    /// Pending request bytes
    write_buf: BytesMut,

    /// Cleared on the first I/O error
    valid: bool,
}

impl TcpTransport {
    /// Wrap a connected stream
    ///
    /// Applies the no-delay flag and timeouts.
    pub fn new(
        server: ServerAddress,
        stream: TcpStream,
        tcp_no_delay: bool,
        so_timeout_ms: u64,
    ) -> Result<Self> {
        stream.set_nodelay(tcp_no_delay)?;

        if so_timeout_ms > 0 {
            let timeout = Some(Duration::from_millis(so_timeout_ms));
            stream.set_read_timeout(timeout)?;
            stream.set_write_timeout(timeout)?;
        }

        // Clone stream for separate read/write handles
        let read_stream = stream.try_clone()?;

        Ok(Self {
            server,
            stream,
            reader: BufReader::new(read_stream),
            write_buf: BytesMut::with_capacity(WRITE_BUFFER_SIZE),
            valid: true,
        })
    }

    fn io_failed(&mut self, err: std::io::Error) -> HotRodError {
        tracing::debug!("I/O error on connection to {}: {}", self.server, err);
        self.valid = false;
        HotRodError::Io(err)
    }
}

impl Transport for TcpTransport {
    fn server(&self) -> &ServerAddress {
        &self.server
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_buf.extend_from_slice(bytes);
        Ok(())
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        if let Err(e) = self.reader.read_exact(buf) {
            return Err(self.io_failed(e));
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let pending = self.write_buf.split();
        let result = self
            .stream
            .write_all(&pending)
            .and_then(|_| self.stream.flush());
        if let Err(e) = result {
            return Err(self.io_failed(e));
        }
        Ok(())
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn invalidate(&mut self) {
        self.valid = false;
    }

    fn close(&mut self) {
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            tracing::trace!("Error closing connection to {}: {}", self.server, e);
        }
    }
}

/// Opens `TcpTransport`s using the configured timeouts
#[derive(Debug, Clone)]
pub struct TcpConnectionFactory {
    connect_timeout_ms: u64,
    so_timeout_ms: u64,
    tcp_no_delay: bool,
    ssl_enabled: bool,
}

impl TcpConnectionFactory {
    pub fn new(config: &Configuration) -> Self {
        Self {
            connect_timeout_ms: config.connect_timeout_ms,
            so_timeout_ms: config.socket_timeout_ms,
            tcp_no_delay: config.tcp_no_delay,
            ssl_enabled: config.ssl.enabled,
        }
    }

    fn open_stream(&self, server: &ServerAddress) -> Result<TcpStream> {
        let addrs = (server.host(), server.port()).to_socket_addrs()?;

        let mut last_err = None;
        for addr in addrs {
            let attempt = if self.connect_timeout_ms > 0 {
                TcpStream::connect_timeout(&addr, Duration::from_millis(self.connect_timeout_ms))
            } else {
                TcpStream::connect(addr)
            };
            match attempt {
                Ok(stream) => return Ok(stream),
                Err(e) => last_err = Some(e),
            }
        }

        Err(match last_err {
            Some(e) => HotRodError::Io(e),
            None => HotRodError::Config(format!("Could not resolve {}", server)),
        })
    }
}

impl ConnectionFactory for TcpConnectionFactory {
    type Connection = TcpTransport;

    fn connect(&self, server: &ServerAddress) -> Result<TcpTransport> {
        if self.ssl_enabled {
            return Err(HotRodError::Config(
                "SSL is enabled but the TCP connection factory only opens plain sockets"
                    .to_string(),
            ));
        }

        let stream = self.open_stream(server)?;
        tracing::debug!("Opened connection to {}", server);
        TcpTransport::new(server.clone(), stream, self.tcp_no_delay, self.so_timeout_ms)
    }
}
