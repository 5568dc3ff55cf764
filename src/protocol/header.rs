//! Header definitions
//!
//! Request header parameters, flags, opcodes and response statuses.

use std::collections::BTreeSet;

use crate::error::{HotRodError, Result};
use crate::topology::ServerAddress;

/// Client intelligence advertised in every request
pub const CLIENT_INTELLIGENCE_BASIC: u8 = 0x01;

/// Transaction marker for non-transactional requests
pub const NO_TX: u8 = 0x00;

/// Response opcode the server uses for error responses
pub const ERROR_RESPONSE: u8 = 0x50;

/// Response marker: no topology follows
pub const NO_TOPOLOGY_CHANGE: u8 = 0x00;

/// Response marker: a server list follows
pub const TOPOLOGY_CHANGED: u8 = 0x01;

// =============================================================================
// Opcodes
// =============================================================================

/// Request opcodes; the response opcode is always `request + 1`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    Put = 0x01,
    Get = 0x03,
    PutIfAbsent = 0x05,
    Replace = 0x07,
    ReplaceIfUnmodified = 0x09,
    Remove = 0x0B,
    RemoveIfUnmodified = 0x0D,
    ContainsKey = 0x0F,
    GetWithVersion = 0x11,
    Clear = 0x13,
    Stats = 0x15,
    Ping = 0x17,
    BulkGet = 0x19,
    GetWithMetadata = 0x1B,
    BulkGetKeys = 0x1D,
}

impl OpCode {
    /// The opcode a successful response to this request carries
    pub fn response(self) -> u8 {
        self as u8 + 1
    }
}

// =============================================================================
// Status
// =============================================================================

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    NoError = 0x00,
    NotPutRemovedReplaced = 0x01,
    KeyDoesNotExist = 0x02,
    InvalidMagicOrMessageId = 0x81,
    UnknownCommand = 0x82,
    UnknownVersion = 0x83,
    RequestParsingError = 0x84,
    ServerError = 0x85,
    CommandTimeout = 0x86,
}

impl Status {
    /// Statuses reported by the server as failures
    pub fn is_error(self) -> bool {
        (self as u8) & 0x80 != 0
    }
}

impl TryFrom<u8> for Status {
    type Error = HotRodError;

    fn try_from(byte: u8) -> Result<Self> {
        Ok(match byte {
            0x00 => Status::NoError,
            0x01 => Status::NotPutRemovedReplaced,
            0x02 => Status::KeyDoesNotExist,
            0x81 => Status::InvalidMagicOrMessageId,
            0x82 => Status::UnknownCommand,
            0x83 => Status::UnknownVersion,
            0x84 => Status::RequestParsingError,
            0x85 => Status::ServerError,
            0x86 => Status::CommandTimeout,
            _ => {
                return Err(HotRodError::Protocol(format!(
                    "Unknown response status: 0x{:02x}",
                    byte
                )))
            }
        })
    }
}

// =============================================================================
// Flags
// =============================================================================

/// Per-request flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum Flag {
    ForceReturnValue = 0x0001,
    DefaultLifespan = 0x0002,
    DefaultMaxIdle = 0x0004,
    SkipCacheLoad = 0x0008,
    SkipIndexing = 0x0010,
}

/// A set of flags
///
/// Stored ordered so that equal sets always serialize to equal bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Flags(BTreeSet<Flag>);

impl Flags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, flag: Flag) -> bool {
        self.0.insert(flag)
    }

    pub fn contains(&self, flag: Flag) -> bool {
        self.0.contains(&flag)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Bit-packed wire form
    pub fn bits(&self) -> u32 {
        self.0.iter().fold(0, |acc, flag| acc | *flag as u32)
    }
}

impl FromIterator<Flag> for Flags {
    fn from_iter<I: IntoIterator<Item = Flag>>(iter: I) -> Self {
        Flags(iter.into_iter().collect())
    }
}

// =============================================================================
// Header Params
// =============================================================================

/// Fields of one request header
///
/// Built per operation, consumed by `Codec::write_header` and handed back
/// for the matching `Codec::read_header`. Client intelligence is always
/// basic and requests are never transactional.
#[derive(Debug, Clone)]
pub struct HeaderParams {
    pub op_code: OpCode,
    pub cache_name: Vec<u8>,
    pub flags: Flags,
    client_intelligence: u8,
    pub topology_id: u32,
    tx_marker: u8,
}

impl HeaderParams {
    /// Header for `op_code` with an empty (default) cache name
    pub fn new(op_code: OpCode) -> Self {
        Self {
            op_code,
            cache_name: Vec::new(),
            flags: Flags::new(),
            client_intelligence: CLIENT_INTELLIGENCE_BASIC,
            topology_id: 0,
            tx_marker: NO_TX,
        }
    }

    pub fn cache_name(mut self, cache_name: impl Into<Vec<u8>>) -> Self {
        self.cache_name = cache_name.into();
        self
    }

    pub fn flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    pub fn topology_id(mut self, topology_id: u32) -> Self {
        self.topology_id = topology_id;
        self
    }

    pub fn client_intelligence(&self) -> u8 {
        self.client_intelligence
    }

    pub fn tx_marker(&self) -> u8 {
        self.tx_marker
    }

    /// The response opcode a valid answer must carry
    pub fn expected_response(&self) -> u8 {
        self.op_code.response()
    }
}

// =============================================================================
// Response Header
// =============================================================================

/// Server list pushed in a response header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseTopology {
    pub topology_id: u32,
    pub servers: Vec<ServerAddress>,
}

/// Decoded response header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHeader {
    pub status: Status,

    /// Present when the server reported a topology change
    pub topology: Option<ResponseTopology>,
}
