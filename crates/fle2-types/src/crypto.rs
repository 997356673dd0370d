//! Authenticated encryption of state-collection payloads.
//!
//! Payloads are sealed with XChaCha20-Poly1305 keyed directly by a 32-byte
//! value token. The wire form is `nonce(24) || ciphertext || tag(16)`; the
//! nonce is random per call, so two encryptions of the same payload differ.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use fle2_error::{CollectionKind, FleError, Result};
use rand::RngCore;
use rand::rngs::OsRng;

use crate::PrfBlock;

/// Nonce length prefixed to every ciphertext.
pub const NONCE_LEN: usize = 24;
/// Poly1305 authentication tag length.
pub const AEAD_TAG_LEN: usize = 16;
/// Bytes added to a plaintext by [`encrypt_payload`].
pub const AEAD_OVERHEAD: usize = NONCE_LEN + AEAD_TAG_LEN;

/// Ciphertext length for a plaintext of `plaintext_len` bytes.
#[must_use]
pub const fn ciphertext_len(plaintext_len: usize) -> usize {
    plaintext_len + AEAD_OVERHEAD
}

/// Encrypt `plaintext` under `key`.
///
/// # Errors
///
/// Returns [`FleError::Encryption`] if the AEAD backend rejects the input.
pub fn encrypt_payload(key: &PrfBlock, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    let mut nonce_bytes = [0_u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let sealed = cipher
        .encrypt(XNonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|_| FleError::Encryption("payload seal failed".to_owned()))?;

    let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Decrypt a payload produced by [`encrypt_payload`].
///
/// # Errors
///
/// Returns [`FleError::Decryption`] when the input is truncated or does not
/// authenticate under `key`.
pub fn decrypt_payload(
    collection: CollectionKind,
    key: &PrfBlock,
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    if ciphertext.len() < AEAD_OVERHEAD {
        return Err(FleError::Decryption {
            collection,
            detail: format!(
                "ciphertext of {} bytes is shorter than the {AEAD_OVERHEAD}-byte envelope",
                ciphertext.len()
            ),
        });
    }
    let (nonce, sealed) = ciphertext.split_at(NONCE_LEN);
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(XNonce::from_slice(nonce), sealed)
        .map_err(|_| FleError::Decryption {
            collection,
            detail: "authentication failed".to_owned(),
        })
}
