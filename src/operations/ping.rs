//! Ping operation
//!
//! Header-only request; the response header may carry a new server list.

use crate::error::{HotRodError, Result};
use crate::protocol::{OpCode, ResponseTopology, Status};
use crate::transport::Transport;

use super::OperationContext;

/// Pings one server over an already borrowed transport
pub struct PingOperation {
    context: OperationContext,
}

impl PingOperation {
    pub fn new(context: OperationContext) -> Self {
        Self { context }
    }

    /// Send the ping and wait for the answer
    ///
    /// Returns the topology pushed with the response, if any.
    pub fn execute(&self, transport: &mut dyn Transport) -> Result<Option<ResponseTopology>> {
        let params = self.context.write_header(transport, OpCode::Ping)?;
        transport.flush()?;

        let header = self.context.read_header_and_validate(transport, &params)?;
        if header.status != Status::NoError {
            return Err(HotRodError::Protocol(format!(
                "Unexpected ping status {:?} from {}",
                header.status,
                transport.server()
            )));
        }
        Ok(header.topology)
    }
}
