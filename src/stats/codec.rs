//! Token wire codec.
//!
//! Serializes a token sequence to the compact binary form the store scripts
//! expect: a 1-byte array marker, a 4-byte big-endian count, then one 1-byte
//! element marker plus an 8-byte big-endian identifier per token. The format
//! is persisted behavior; the markers must not change. Encode-only here,
//! decoding happens on the store side.

use super::runtime::Token;

pub const ARRAY_MARKER: u8 = 0xdd;
pub const ELEMENT_MARKER: u8 = 0xd3;

const HEADER_LEN: usize = 5;
const ENTRY_LEN: usize = 9;

/// Serialize `tokens` into an exactly-sized buffer of `5 + 9N` bytes.
pub fn serialize_tokens(tokens: &[Token]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + ENTRY_LEN * tokens.len());

    buf.push(ARRAY_MARKER);
    buf.extend_from_slice(&(tokens.len() as u32).to_be_bytes());

    for tok in tokens {
        buf.push(ELEMENT_MARKER);
        buf.extend_from_slice(&tok.data.to_be_bytes());
    }

    buf
}
