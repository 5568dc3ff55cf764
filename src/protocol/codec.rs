//! Protocol codec
//!
//! Header encoding and decoding shared by every operation.
//!
//! ## Wire Format
//!
//! ### Request Header
//! ```text
//! ┌──────────┬───────────────┬────────────┬──────────┬──────────────┬────────┐
//! │ Op (1)   │ Cache (array) │ Flags (vi) │ Intel(1) │ Topo id (vi) │ Tx (1) │
//! └──────────┴───────────────┴────────────┴──────────┴──────────────┴────────┘
//! ```
//!
//! ### Response Header
//! ```text
//! ┌──────────┬───────────┬────────────┬──────────────────────────────────┐
//! │ Op (1)   │ Status(1) │ Topo? (1)  │ [topo id (vi), n (vi), servers]  │
//! └──────────┴───────────┴────────────┴──────────────────────────────────┘
//! ```
//! Each pushed server is `host (array) + port (2, big endian)`.

use crate::error::{HotRodError, Result};
use crate::topology::ServerAddress;
use crate::transport::Transport;

use super::{
    HeaderParams, ResponseHeader, ResponseTopology, Status, ERROR_RESPONSE, NO_TOPOLOGY_CHANGE,
    TOPOLOGY_CHANGED,
};

/// Header writer/reader used by operations
///
/// Operation-specific payloads are encoded by the operations themselves.
pub trait Codec: Send + Sync {
    /// Write a request header; returns the params for the matching read
    fn write_header(
        &self,
        transport: &mut dyn Transport,
        params: HeaderParams,
    ) -> Result<HeaderParams>;

    /// Read a response header and check it answers `params`
    ///
    /// Application statuses are returned, only framing problems and error
    /// responses fail.
    fn read_header(
        &self,
        transport: &mut dyn Transport,
        params: &HeaderParams,
    ) -> Result<ResponseHeader>;
}

/// The default binary codec
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

impl Codec for BinaryCodec {
    fn write_header(
        &self,
        transport: &mut dyn Transport,
        params: HeaderParams,
    ) -> Result<HeaderParams> {
        transport.write_byte(params.op_code as u8)?;
        transport.write_array(&params.cache_name)?;
        transport.write_varint(params.flags.bits())?;
        transport.write_byte(params.client_intelligence())?;
        transport.write_varint(params.topology_id)?;
        transport.write_byte(params.tx_marker())?;

        tracing::trace!(
            "Wrote header op=0x{:02x} topology_id={} to {}",
            params.op_code as u8,
            params.topology_id,
            transport.server()
        );
        Ok(params)
    }

    fn read_header(
        &self,
        transport: &mut dyn Transport,
        params: &HeaderParams,
    ) -> Result<ResponseHeader> {
        let op_code = transport.read_byte()?;
        let status_byte = transport.read_byte()?;

        if op_code == ERROR_RESPONSE {
            let message = transport.read_array()?;
            return Err(HotRodError::Server {
                status: status_byte,
                message: String::from_utf8_lossy(&message).into_owned(),
            });
        }

        if op_code != params.expected_response() {
            return Err(HotRodError::Protocol(format!(
                "Invalid response operation: expected 0x{:02x}, got 0x{:02x}",
                params.expected_response(),
                op_code
            )));
        }

        let status = Status::try_from(status_byte)?;

        let topology = match transport.read_byte()? {
            NO_TOPOLOGY_CHANGE => None,
            TOPOLOGY_CHANGED => Some(read_topology(transport)?),
            marker => {
                return Err(HotRodError::Protocol(format!(
                    "Unknown topology change marker: 0x{:02x}",
                    marker
                )))
            }
        };

        tracing::trace!(
            "Read header op=0x{:02x} status={:?} from {}",
            op_code,
            status,
            transport.server()
        );
        Ok(ResponseHeader { status, topology })
    }
}

fn read_topology(transport: &mut dyn Transport) -> Result<ResponseTopology> {
    let topology_id = transport.read_varint()?;
    let count = transport.read_varint()?;

    let mut servers = Vec::with_capacity(count.min(1024) as usize);
    for _ in 0..count {
        let host = transport.read_array()?;
        let port = u16::from_be_bytes([transport.read_byte()?, transport.read_byte()?]);
        let host = String::from_utf8(host)
            .map_err(|_| HotRodError::Protocol("Server host is not valid UTF-8".to_string()))?;
        servers.push(ServerAddress::new(host, port));
    }

    Ok(ResponseTopology {
        topology_id,
        servers,
    })
}
