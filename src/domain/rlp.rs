//! # RLP Helpers
//!
//! Recursive-length-prefix encoding and a strict decoder for the handful of
//! payloads the engine is responsible for: header hashing, seal hashing,
//! legacy transactions and governance proposals.

use crate::domain::value_objects::{Hash, U256};
use crate::errors::RlpError;
use sha3::{Digest, Keccak256};

// =============================================================================
// ENCODING
// =============================================================================

/// RLP-encodes a byte string.
pub fn encode_bytes(data: &[u8]) -> Vec<u8> {
    if data.len() == 1 && data[0] < 0x80 {
        vec![data[0]]
    } else if data.len() < 56 {
        let mut out = vec![0x80 + data.len() as u8];
        out.extend_from_slice(data);
        out
    } else {
        let len_bytes = encode_length(data.len());
        let mut out = vec![0xb7 + len_bytes.len() as u8];
        out.extend_from_slice(&len_bytes);
        out.extend_from_slice(data);
        out
    }
}

/// RLP-encodes an unsigned integer as a minimal big-endian byte string.
pub fn encode_uint(value: U256) -> Vec<u8> {
    if value.is_zero() {
        return vec![0x80];
    }
    let mut word = [0u8; 32];
    value.to_big_endian(&mut word);
    let start = word.iter().position(|&b| b != 0).unwrap_or(31);
    encode_bytes(&word[start..])
}

/// RLP-encodes a `u64` as a minimal big-endian byte string.
pub fn encode_u64(value: u64) -> Vec<u8> {
    encode_uint(U256::from(value))
}

/// Wraps pre-encoded items into an RLP list.
pub fn encode_list(encoded_items: &[Vec<u8>]) -> Vec<u8> {
    let total_len: usize = encoded_items.iter().map(Vec::len).sum();

    let mut out = Vec::with_capacity(total_len + 9);
    if total_len < 56 {
        out.push(0xc0 + total_len as u8);
    } else {
        let len_bytes = encode_length(total_len);
        out.push(0xf7 + len_bytes.len() as u8);
        out.extend_from_slice(&len_bytes);
    }
    for item in encoded_items {
        out.extend_from_slice(item);
    }
    out
}

/// Encodes a length as minimal big-endian bytes.
fn encode_length(len: usize) -> Vec<u8> {
    let bytes = len.to_be_bytes();
    let start = bytes
        .iter()
        .position(|&b| b != 0)
        .unwrap_or(bytes.len() - 1);
    bytes[start..].to_vec()
}

/// Computes the Keccak-256 digest of `data`.
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    Hash(hasher.finalize().into())
}

// =============================================================================
// DECODING
// =============================================================================

/// A decoded RLP item borrowing from the input buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Item<'a> {
    /// A byte string; the slice is the payload.
    Str(&'a [u8]),
    /// A list; the slice is the concatenated payload of its items.
    List(&'a [u8]),
}

impl<'a> Item<'a> {
    /// Returns the payload of a string item.
    pub fn as_bytes(&self) -> Result<&'a [u8], RlpError> {
        match self {
            Item::Str(bytes) => Ok(bytes),
            Item::List(_) => Err(RlpError::UnexpectedKind),
        }
    }

    /// Decodes a string item as a minimal big-endian `U256`.
    pub fn as_uint(&self) -> Result<U256, RlpError> {
        let bytes = self.as_bytes()?;
        if bytes.len() > 32 {
            return Err(RlpError::Overflow);
        }
        if bytes.first() == Some(&0) {
            return Err(RlpError::LeadingZeros);
        }
        Ok(U256::from_big_endian(bytes))
    }

    /// Decodes a string item as a minimal big-endian `u64`.
    pub fn as_u64(&self) -> Result<u64, RlpError> {
        let value = self.as_uint()?;
        if value > U256::from(u64::MAX) {
            return Err(RlpError::Overflow);
        }
        Ok(value.as_u64())
    }
}

/// Splits the next item off the front of `buf`, returning it and the rest.
pub fn split_item(buf: &[u8]) -> Result<(Item<'_>, &[u8]), RlpError> {
    let first = *buf.first().ok_or(RlpError::UnexpectedEof)?;
    match first {
        0x00..=0x7f => Ok((Item::Str(&buf[..1]), &buf[1..])),
        0x80..=0xb7 => {
            let len = usize::from(first - 0x80);
            read_payload(&buf[1..], len).map(|(payload, rest)| (Item::Str(payload), rest))
        }
        0xb8..=0xbf => {
            let (len, rest) = read_length(&buf[1..], usize::from(first - 0xb7))?;
            read_payload(rest, len).map(|(payload, rest)| (Item::Str(payload), rest))
        }
        0xc0..=0xf7 => {
            let len = usize::from(first - 0xc0);
            read_payload(&buf[1..], len).map(|(payload, rest)| (Item::List(payload), rest))
        }
        0xf8..=0xff => {
            let (len, rest) = read_length(&buf[1..], usize::from(first - 0xf7))?;
            read_payload(rest, len).map(|(payload, rest)| (Item::List(payload), rest))
        }
    }
}

fn read_length(buf: &[u8], width: usize) -> Result<(usize, &[u8]), RlpError> {
    if buf.len() < width {
        return Err(RlpError::UnexpectedEof);
    }
    if buf[0] == 0 {
        return Err(RlpError::LeadingZeros);
    }
    let mut len = 0usize;
    for &byte in &buf[..width] {
        len = len.checked_mul(256).ok_or(RlpError::Overflow)? + usize::from(byte);
    }
    Ok((len, &buf[width..]))
}

fn read_payload(buf: &[u8], len: usize) -> Result<(&[u8], &[u8]), RlpError> {
    if buf.len() < len {
        return Err(RlpError::UnexpectedEof);
    }
    Ok(buf.split_at(len))
}

/// Decodes the outermost item as a list and returns its items in order.
///
/// Trailing bytes after the list are rejected.
pub fn decode_list(buf: &[u8]) -> Result<Vec<Item<'_>>, RlpError> {
    let (item, rest) = split_item(buf)?;
    if !rest.is_empty() {
        return Err(RlpError::TrailingBytes);
    }
    let mut payload = match item {
        Item::List(payload) => payload,
        Item::Str(_) => return Err(RlpError::UnexpectedKind),
    };
    let mut items = Vec::new();
    while !payload.is_empty() {
        let (next, rest) = split_item(payload)?;
        items.push(next);
        payload = rest;
    }
    Ok(items)
}

/// Decodes a list and checks its exact item count.
pub fn decode_list_exact(buf: &[u8], expected: usize) -> Result<Vec<Item<'_>>, RlpError> {
    let items = decode_list(buf)?;
    if items.len() != expected {
        return Err(RlpError::ItemCount {
            expected,
            got: items.len(),
        });
    }
    Ok(items)
}
