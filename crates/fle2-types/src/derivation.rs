//! The fixed token derivation chain.
//!
//! ```text
//! IndexKey
//!  └─ CollectionsLevel1            PRF(key, 1)
//!      ├─ Edc / Esc / Ecc / Ecoc   PRF(L1, 1..=4)
//!      │   └─ *DerivedFromData     PRF(token, value)
//!      │       └─ *AndContentionFactor  PRF(derived, cf)
//!      │           └─ twice-derived tag / value  PRF(.., 1) / PRF(.., 2)
//! ```
//!
//! The constants are persisted implicitly in every record id and ciphertext
//! and must never change.

use std::fmt;

use crate::prf::{prf, prf_u64};
use crate::token::{
    ClientUserDataEncryptionLevel1Token, CollectionsLevel1Token, EccDerivedFromDataToken,
    EccDerivedFromDataTokenAndContentionFactorToken, EccToken, EccTwiceDerivedTagToken,
    EccTwiceDerivedValueToken, EcocToken, EdcDerivedFromDataToken,
    EdcDerivedFromDataTokenAndContentionFactorToken, EdcToken, EdcTwiceDerivedToken,
    EscDerivedFromDataToken, EscDerivedFromDataTokenAndContentionFactorToken, EscToken,
    EscTwiceDerivedTagToken, EscTwiceDerivedValueToken, ServerDataEncryptionLevel1Token,
};
use crate::PrfBlock;

pub const LEVEL1_COLLECTION: u64 = 1;
pub const LEVEL1_CLIENT_USER_DATA_ENCRYPTION: u64 = 2;
pub const LEVEL1_SERVER_DATA_ENCRYPTION: u64 = 3;

pub const EDC: u64 = 1;
pub const ESC: u64 = 2;
pub const ECC: u64 = 3;
pub const ECOC: u64 = 4;

pub const TWICE_DERIVED_FROM_EDC: u64 = 1;
pub const TWICE_DERIVED_TAG: u64 = 1;
pub const TWICE_DERIVED_VALUE: u64 = 2;

/// Root secret for one encrypted field.
#[derive(Clone, PartialEq, Eq)]
pub struct IndexKey {
    bytes: Vec<u8>,
}

impl IndexKey {
    /// Wrap raw key material.
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IndexKey(<{} bytes redacted>)", self.bytes.len())
    }
}

impl CollectionsLevel1Token {
    #[must_use]
    pub fn derive(key: &IndexKey) -> Self {
        Self::from_bytes(prf_u64(key.as_bytes(), LEVEL1_COLLECTION))
    }
}

impl ClientUserDataEncryptionLevel1Token {
    #[must_use]
    pub fn derive(key: &IndexKey) -> Self {
        Self::from_bytes(prf_u64(key.as_bytes(), LEVEL1_CLIENT_USER_DATA_ENCRYPTION))
    }
}

impl ServerDataEncryptionLevel1Token {
    #[must_use]
    pub fn derive(key: &IndexKey) -> Self {
        Self::from_bytes(prf_u64(key.as_bytes(), LEVEL1_SERVER_DATA_ENCRYPTION))
    }
}

impl EdcToken {
    #[must_use]
    pub fn derive(level1: &CollectionsLevel1Token) -> Self {
        Self::from_bytes(prf_u64(level1.as_bytes(), EDC))
    }
}

impl EscToken {
    #[must_use]
    pub fn derive(level1: &CollectionsLevel1Token) -> Self {
        Self::from_bytes(prf_u64(level1.as_bytes(), ESC))
    }
}

impl EccToken {
    #[must_use]
    pub fn derive(level1: &CollectionsLevel1Token) -> Self {
        Self::from_bytes(prf_u64(level1.as_bytes(), ECC))
    }
}

impl EcocToken {
    #[must_use]
    pub fn derive(level1: &CollectionsLevel1Token) -> Self {
        Self::from_bytes(prf_u64(level1.as_bytes(), ECOC))
    }
}

impl EdcDerivedFromDataToken {
    /// `value` is the serialized field value, type byte included.
    #[must_use]
    pub fn derive(edc: &EdcToken, value: &[u8]) -> Self {
        Self::from_bytes(prf(edc.as_bytes(), value))
    }
}

impl EscDerivedFromDataToken {
    #[must_use]
    pub fn derive(esc: &EscToken, value: &[u8]) -> Self {
        Self::from_bytes(prf(esc.as_bytes(), value))
    }
}

impl EccDerivedFromDataToken {
    #[must_use]
    pub fn derive(ecc: &EccToken, value: &[u8]) -> Self {
        Self::from_bytes(prf(ecc.as_bytes(), value))
    }
}

impl EdcDerivedFromDataTokenAndContentionFactorToken {
    #[must_use]
    pub fn derive(token: &EdcDerivedFromDataToken, contention_factor: u64) -> Self {
        Self::from_bytes(prf_u64(token.as_bytes(), contention_factor))
    }
}

impl EscDerivedFromDataTokenAndContentionFactorToken {
    #[must_use]
    pub fn derive(token: &EscDerivedFromDataToken, contention_factor: u64) -> Self {
        Self::from_bytes(prf_u64(token.as_bytes(), contention_factor))
    }
}

impl EccDerivedFromDataTokenAndContentionFactorToken {
    #[must_use]
    pub fn derive(token: &EccDerivedFromDataToken, contention_factor: u64) -> Self {
        Self::from_bytes(prf_u64(token.as_bytes(), contention_factor))
    }
}

impl EdcTwiceDerivedToken {
    #[must_use]
    pub fn derive(token: &EdcDerivedFromDataTokenAndContentionFactorToken) -> Self {
        Self::from_bytes(prf_u64(token.as_bytes(), TWICE_DERIVED_FROM_EDC))
    }

    /// Server-side tag for the `count`-th insert of this value.
    #[must_use]
    pub fn generate_tag(&self, count: u64) -> PrfBlock {
        prf_u64(self.as_bytes(), count)
    }
}

impl EscTwiceDerivedTagToken {
    #[must_use]
    pub fn derive(token: &EscDerivedFromDataTokenAndContentionFactorToken) -> Self {
        Self::from_bytes(prf_u64(token.as_bytes(), TWICE_DERIVED_TAG))
    }
}

impl EscTwiceDerivedValueToken {
    #[must_use]
    pub fn derive(token: &EscDerivedFromDataTokenAndContentionFactorToken) -> Self {
        Self::from_bytes(prf_u64(token.as_bytes(), TWICE_DERIVED_VALUE))
    }
}

impl EccTwiceDerivedTagToken {
    #[must_use]
    pub fn derive(token: &EccDerivedFromDataTokenAndContentionFactorToken) -> Self {
        Self::from_bytes(prf_u64(token.as_bytes(), TWICE_DERIVED_TAG))
    }
}

impl EccTwiceDerivedValueToken {
    #[must_use]
    pub fn derive(token: &EccDerivedFromDataTokenAndContentionFactorToken) -> Self {
        Self::from_bytes(prf_u64(token.as_bytes(), TWICE_DERIVED_VALUE))
    }
}

/// Everything a query needs for one equality predicate, before fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EqualityFindTokens {
    pub edc: EdcDerivedFromDataToken,
    pub esc: EscDerivedFromDataToken,
    pub ecc: EccDerivedFromDataToken,
    pub server_encryption: ServerDataEncryptionLevel1Token,
    /// Highest contention factor the field was written with.
    pub max_contention: u64,
}

impl EqualityFindTokens {
    /// Derive the find tokens for `value` under `key`.
    #[must_use]
    pub fn derive(key: &IndexKey, value: &[u8], max_contention: u64) -> Self {
        let level1 = CollectionsLevel1Token::derive(key);
        Self {
            edc: EdcDerivedFromDataToken::derive(&EdcToken::derive(&level1), value),
            esc: EscDerivedFromDataToken::derive(&EscToken::derive(&level1), value),
            ecc: EccDerivedFromDataToken::derive(&EccToken::derive(&level1), value),
            server_encryption: ServerDataEncryptionLevel1Token::derive(key),
            max_contention,
        }
    }

    /// Leaf tokens for one contention factor.
    #[must_use]
    pub fn for_contention(&self, contention_factor: u64) -> ContentionTokens {
        ContentionTokens::derive(&self.esc, &self.ecc, &self.edc, contention_factor)
    }
}

/// Leaf tokens for one `(value, cf)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentionTokens {
    pub contention_factor: u64,
    pub esc: EscDerivedFromDataTokenAndContentionFactorToken,
    pub ecc: EccDerivedFromDataTokenAndContentionFactorToken,
    pub edc: EdcDerivedFromDataTokenAndContentionFactorToken,
    pub esc_tag: EscTwiceDerivedTagToken,
    pub esc_value: EscTwiceDerivedValueToken,
    pub ecc_tag: EccTwiceDerivedTagToken,
    pub ecc_value: EccTwiceDerivedValueToken,
    pub edc_twice: EdcTwiceDerivedToken,
}

impl ContentionTokens {
    #[must_use]
    pub fn derive(
        esc: &EscDerivedFromDataToken,
        ecc: &EccDerivedFromDataToken,
        edc: &EdcDerivedFromDataToken,
        contention_factor: u64,
    ) -> Self {
        let esc_cf = EscDerivedFromDataTokenAndContentionFactorToken::derive(esc, contention_factor);
        let ecc_cf = EccDerivedFromDataTokenAndContentionFactorToken::derive(ecc, contention_factor);
        let edc_cf = EdcDerivedFromDataTokenAndContentionFactorToken::derive(edc, contention_factor);
        Self {
            contention_factor,
            esc: esc_cf,
            ecc: ecc_cf,
            edc: edc_cf,
            esc_tag: EscTwiceDerivedTagToken::derive(&esc_cf),
            esc_value: EscTwiceDerivedValueToken::derive(&esc_cf),
            ecc_tag: EccTwiceDerivedTagToken::derive(&ecc_cf),
            ecc_value: EccTwiceDerivedValueToken::derive(&ecc_cf),
            edc_twice: EdcTwiceDerivedToken::derive(&edc_cf),
        }
    }
}
