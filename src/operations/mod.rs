//! Operations Module
//!
//! Header handling shared by all operations, and the ping operation the
//! transport factory uses for topology discovery. Payload encoders of the
//! data operations build on `OperationContext`.

mod ping;

pub use ping::PingOperation;

use std::sync::Arc;

use crate::error::Result;
use crate::protocol::{Codec, Flags, HeaderParams, OpCode, ResponseHeader};
use crate::transport::Transport;

/// Per-operation header state: codec, flags, cache name and topology id
#[derive(Clone)]
pub struct OperationContext {
    codec: Arc<dyn Codec>,
    flags: Flags,
    cache_name: Vec<u8>,
    topology_id: u32,
}

impl OperationContext {
    pub fn new(codec: Arc<dyn Codec>, cache_name: impl Into<Vec<u8>>, topology_id: u32) -> Self {
        Self {
            codec,
            flags: Flags::new(),
            cache_name: cache_name.into(),
            topology_id,
        }
    }

    pub fn with_flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    pub fn cache_name(&self) -> &[u8] {
        &self.cache_name
    }

    /// Write the request header for `op_code`
    ///
    /// Always advertises basic client intelligence and no transaction.
    pub fn write_header(
        &self,
        transport: &mut dyn Transport,
        op_code: OpCode,
    ) -> Result<HeaderParams> {
        let params = HeaderParams::new(op_code)
            .cache_name(self.cache_name.clone())
            .flags(self.flags.clone())
            .topology_id(self.topology_id);
        self.codec.write_header(transport, params)
    }

    /// Read the response header matching `params`
    pub fn read_header_and_validate(
        &self,
        transport: &mut dyn Transport,
        params: &HeaderParams,
    ) -> Result<ResponseHeader> {
        self.codec.read_header(transport, params)
    }
}
