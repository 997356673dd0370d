//! Core value types for the FLE2 index engine: the 32-byte PRF block, the
//! nominally typed token hierarchy, and the primitives (PRF, AEAD, fixed-width
//! packing) that every state-collection codec is built from.

pub mod crypto;
pub mod derivation;
pub mod ecoc;
pub mod pack;
pub mod prf;
pub mod token;

pub use derivation::{ContentionTokens, EqualityFindTokens, IndexKey};
pub use ecoc::{EcocCompactionRecord, EncryptedStateCollectionTokens};
pub use token::*;

/// Width of every PRF output and every token, in bytes.
pub const PRF_BLOCK_LEN: usize = 32;

/// Raw HMAC-SHA-256 output. Record ids and EDC tags are bare blocks.
pub type PrfBlock = [u8; PRF_BLOCK_LEN];
