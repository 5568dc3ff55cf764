//! Variable-length integers and byte arrays
//!
//! Unsigned, 7 bits per byte, low group first; the high bit of a byte
//! means another byte follows. Byte arrays are a varint length followed
//! by the raw bytes.

use bytes::{Buf, BufMut};

use crate::error::{HotRodError, Result};

/// Longest encoding of a u32
pub const MAX_VARINT_BYTES: usize = 5;

/// Longest encoding of a u64
pub const MAX_VARLONG_BYTES: usize = 10;

/// Maximum byte-array length accepted on the read path (16 MB)
pub const MAX_ARRAY_SIZE: u32 = 16 * 1024 * 1024;

// =============================================================================
// Encoding
// =============================================================================

/// Append a varint
pub fn put_varint<B: BufMut>(buf: &mut B, value: u32) {
    put_varlong(buf, u64::from(value));
}

/// Append a varlong
pub fn put_varlong<B: BufMut>(buf: &mut B, mut value: u64) {
    while value >= 0x80 {
        buf.put_u8((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Append a length-prefixed byte array
pub fn put_array<B: BufMut>(buf: &mut B, bytes: &[u8]) {
    put_varint(buf, bytes.len() as u32);
    buf.put_slice(bytes);
}

/// Number of bytes `value` occupies as a varlong
pub fn varlong_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.max(1).div_ceil(7)
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode a varint from a byte source
///
/// Shared by the buffer and the transport read paths.
pub(crate) fn decode_varint<F>(next: F) -> Result<u32>
where
    F: FnMut() -> Result<u8>,
{
    let value = decode(next, MAX_VARINT_BYTES)?;
    u32::try_from(value)
        .map_err(|_| HotRodError::Protocol(format!("Varint overflows 32 bits: {}", value)))
}

/// Decode a varlong from a byte source
pub(crate) fn decode_varlong<F>(next: F) -> Result<u64>
where
    F: FnMut() -> Result<u8>,
{
    decode(next, MAX_VARLONG_BYTES)
}

fn decode<F>(mut next: F, max_bytes: usize) -> Result<u64>
where
    F: FnMut() -> Result<u8>,
{
    let mut value: u64 = 0;
    for i in 0..max_bytes {
        let byte = next()?;
        let group = u64::from(byte & 0x7f);
        let shift = 7 * i as u32;

        // The last group of a u64 only has room for one bit
        if shift == 63 && group > 1 {
            return Err(HotRodError::Protocol(
                "Varlong overflows 64 bits".to_string(),
            ));
        }
        value |= group << shift;

        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }

    Err(HotRodError::Protocol(format!(
        "Variable-length integer longer than {} bytes",
        max_bytes
    )))
}

/// Check a decoded array length against the read limit
pub(crate) fn check_array_len(len: u32) -> Result<usize> {
    if len > MAX_ARRAY_SIZE {
        return Err(HotRodError::Protocol(format!(
            "Byte array too large: {} bytes (max {})",
            len, MAX_ARRAY_SIZE
        )));
    }
    Ok(len as usize)
}

fn next_byte<B: Buf>(buf: &mut B) -> Result<u8> {
    if !buf.has_remaining() {
        return Err(HotRodError::Protocol(
            "Unexpected end of buffer".to_string(),
        ));
    }
    Ok(buf.get_u8())
}

/// Read a varint from a buffer
pub fn get_varint<B: Buf>(buf: &mut B) -> Result<u32> {
    decode_varint(|| next_byte(buf))
}

/// Read a varlong from a buffer
pub fn get_varlong<B: Buf>(buf: &mut B) -> Result<u64> {
    decode_varlong(|| next_byte(buf))
}

/// Read a length-prefixed byte array from a buffer
pub fn get_array<B: Buf>(buf: &mut B) -> Result<Vec<u8>> {
    let len = check_array_len(get_varint(buf)?)?;
    if buf.remaining() < len {
        return Err(HotRodError::Protocol(format!(
            "Incomplete byte array: expected {} bytes, got {}",
            len,
            buf.remaining()
        )));
    }
    let mut bytes = vec![0u8; len];
    buf.copy_to_slice(&mut bytes);
    Ok(bytes)
}
