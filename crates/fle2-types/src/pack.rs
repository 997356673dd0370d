//! Fixed-width integer payloads.
//!
//! State-collection payloads are one or two `u64`s, little-endian, packed with
//! no framing. Decoding rejects any other width.

use fle2_error::{CollectionKind, FleError, Result};

use crate::crypto::{decrypt_payload, encrypt_payload};
use crate::token::{Token, TokenKind};

/// Width of a single-integer payload.
pub const U64_PAYLOAD_LEN: usize = 8;
/// Width of a two-integer payload.
pub const PAIR_PAYLOAD_LEN: usize = 16;

/// Pack one integer.
#[must_use]
pub const fn pack_u64(value: u64) -> [u8; U64_PAYLOAD_LEN] {
    value.to_le_bytes()
}

/// Pack two integers in order.
#[must_use]
pub fn pack_pair(first: u64, second: u64) -> [u8; PAIR_PAYLOAD_LEN] {
    let mut out = [0_u8; PAIR_PAYLOAD_LEN];
    out[..8].copy_from_slice(&first.to_le_bytes());
    out[8..].copy_from_slice(&second.to_le_bytes());
    out
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut word = [0_u8; 8];
    word.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(word)
}

/// Unpack a single-integer payload.
///
/// # Errors
///
/// Returns [`FleError::MalformedPayload`] unless `bytes` is exactly 8 bytes.
pub fn unpack_u64(collection: CollectionKind, bytes: &[u8]) -> Result<u64> {
    if bytes.len() != U64_PAYLOAD_LEN {
        return Err(FleError::MalformedPayload {
            collection,
            expected: U64_PAYLOAD_LEN,
            actual: bytes.len(),
        });
    }
    Ok(read_u64(bytes))
}

/// Unpack a two-integer payload.
///
/// # Errors
///
/// Returns [`FleError::MalformedPayload`] unless `bytes` is exactly 16 bytes.
pub fn unpack_pair(collection: CollectionKind, bytes: &[u8]) -> Result<(u64, u64)> {
    if bytes.len() != PAIR_PAYLOAD_LEN {
        return Err(FleError::MalformedPayload {
            collection,
            expected: PAIR_PAYLOAD_LEN,
            actual: bytes.len(),
        });
    }
    Ok((read_u64(&bytes[..8]), read_u64(&bytes[8..])))
}

/// Encrypt a single integer under `token`.
///
/// # Errors
///
/// Propagates encryption failure.
pub fn encrypt_u64<K: TokenKind>(token: &Token<K>, value: u64) -> Result<Vec<u8>> {
    encrypt_payload(token.as_bytes(), &pack_u64(value))
}

/// Encrypt an integer pair under `token`.
///
/// # Errors
///
/// Propagates encryption failure.
pub fn encrypt_pair<K: TokenKind>(token: &Token<K>, first: u64, second: u64) -> Result<Vec<u8>> {
    encrypt_payload(token.as_bytes(), &pack_pair(first, second))
}

/// Decrypt and unpack a single integer.
///
/// # Errors
///
/// Returns a decryption or width error.
pub fn decrypt_u64<K: TokenKind>(
    collection: CollectionKind,
    token: &Token<K>,
    ciphertext: &[u8],
) -> Result<u64> {
    let plain = decrypt_payload(collection, token.as_bytes(), ciphertext)?;
    unpack_u64(collection, &plain)
}

/// Decrypt and unpack an integer pair.
///
/// # Errors
///
/// Returns a decryption or width error.
pub fn decrypt_pair<K: TokenKind>(
    collection: CollectionKind,
    token: &Token<K>,
    ciphertext: &[u8],
) -> Result<(u64, u64)> {
    let plain = decrypt_payload(collection, token.as_bytes(), ciphertext)?;
    unpack_pair(collection, &plain)
}
