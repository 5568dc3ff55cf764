//! Protocol Module
//!
//! Binary framing primitives and the request/response header shared by
//! every operation.
//!
//! ## Primitives
//! - varint / varlong: unsigned, 7 bits per byte, low group first,
//!   high bit set on every byte but the last
//! - byte array: varint length + raw bytes
//!
//! ## Request Header
//! ```text
//! ┌──────────┬───────────────┬────────────┬──────────┬──────────────┬────────┐
//! │ Op (1)   │ Cache (array) │ Flags (vi) │ Intel(1) │ Topo id (vi) │ Tx (1) │
//! └──────────┴───────────────┴────────────┴──────────┴──────────────┴────────┘
//! ```
//!
//! ### Status Codes
//! - 0x00: NO_ERROR
//! - 0x01: NOT_PUT_REMOVED_REPLACED
//! - 0x02: KEY_DOES_NOT_EXIST
//! - 0x81..0x86: server-side failures

mod header;
mod codec;
pub mod varint;

pub use header::{
    Flag, Flags, HeaderParams, OpCode, ResponseHeader, ResponseTopology, Status,
    CLIENT_INTELLIGENCE_BASIC, ERROR_RESPONSE, NO_TOPOLOGY_CHANGE, NO_TX, TOPOLOGY_CHANGED,
};
pub use codec::{BinaryCodec, Codec};
