//! ECOC payloads: the per-write token pair staged for compaction.

use fle2_error::{CollectionKind, FleError, Result};

use crate::crypto::{decrypt_payload, encrypt_payload};
use crate::token::{
    EccDerivedFromDataTokenAndContentionFactorToken, EcocToken,
    EscDerivedFromDataTokenAndContentionFactorToken,
};
use crate::{PRF_BLOCK_LEN, PrfBlock};

/// Plaintext width of a serialized token pair.
pub const STATE_TOKENS_LEN: usize = 2 * PRF_BLOCK_LEN;

/// ESC and ECC contention tokens recorded for one indexed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptedStateCollectionTokens {
    pub esc: EscDerivedFromDataTokenAndContentionFactorToken,
    pub ecc: EccDerivedFromDataTokenAndContentionFactorToken,
}

impl EncryptedStateCollectionTokens {
    #[must_use]
    pub const fn new(
        esc: EscDerivedFromDataTokenAndContentionFactorToken,
        ecc: EccDerivedFromDataTokenAndContentionFactorToken,
    ) -> Self {
        Self { esc, ecc }
    }

    /// Encrypt `esc || ecc` under the ECOC token.
    ///
    /// # Errors
    ///
    /// Propagates encryption failure.
    pub fn serialize(&self, ecoc: &EcocToken) -> Result<Vec<u8>> {
        let mut plain = [0_u8; STATE_TOKENS_LEN];
        plain[..PRF_BLOCK_LEN].copy_from_slice(self.esc.as_bytes());
        plain[PRF_BLOCK_LEN..].copy_from_slice(self.ecc.as_bytes());
        encrypt_payload(ecoc.as_bytes(), &plain)
    }

    /// Decrypt a value produced by [`Self::serialize`].
    ///
    /// # Errors
    ///
    /// Returns a decryption error, or [`FleError::MalformedPayload`] when the
    /// plaintext is not exactly two blocks.
    pub fn decrypt(ecoc: &EcocToken, ciphertext: &[u8]) -> Result<Self> {
        let plain = decrypt_payload(CollectionKind::Ecoc, ecoc.as_bytes(), ciphertext)?;
        if plain.len() != STATE_TOKENS_LEN {
            return Err(FleError::MalformedPayload {
                collection: CollectionKind::Ecoc,
                expected: STATE_TOKENS_LEN,
                actual: plain.len(),
            });
        }
        let mut esc = PrfBlock::default();
        let mut ecc = PrfBlock::default();
        esc.copy_from_slice(&plain[..PRF_BLOCK_LEN]);
        ecc.copy_from_slice(&plain[PRF_BLOCK_LEN..]);
        Ok(Self {
            esc: EscDerivedFromDataTokenAndContentionFactorToken::from_bytes(esc),
            ecc: EccDerivedFromDataTokenAndContentionFactorToken::from_bytes(ecc),
        })
    }
}

/// One ECOC document: the field it belongs to and its sealed token pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcocCompactionRecord {
    pub field_name: String,
    pub encrypted_tokens: Vec<u8>,
}

impl EcocCompactionRecord {
    /// Seal `tokens` for `field_name`.
    ///
    /// # Errors
    ///
    /// Propagates encryption failure.
    pub fn generate(
        field_name: impl Into<String>,
        tokens: &EncryptedStateCollectionTokens,
        ecoc: &EcocToken,
    ) -> Result<Self> {
        Ok(Self {
            field_name: field_name.into(),
            encrypted_tokens: tokens.serialize(ecoc)?,
        })
    }

    /// Recover the token pair.
    ///
    /// # Errors
    ///
    /// See [`EncryptedStateCollectionTokens::decrypt`].
    pub fn tokens(&self, ecoc: &EcocToken) -> Result<EncryptedStateCollectionTokens> {
        EncryptedStateCollectionTokens::decrypt(ecoc, &self.encrypted_tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::encrypt_payload;
    use crate::derivation::{EqualityFindTokens, IndexKey};
    use crate::token::CollectionsLevel1Token;

    fn fixture() -> (EcocToken, EncryptedStateCollectionTokens) {
        let key = IndexKey::new(vec![9; 96]);
        let ecoc = EcocToken::derive(&CollectionsLevel1Token::derive(&key));
        let leaf = EqualityFindTokens::derive(&key, b"\x02abc", 2).for_contention(1);
        (ecoc, EncryptedStateCollectionTokens::new(leaf.esc, leaf.ecc))
    }

    #[test]
    fn test_round_trip_through_record() {
        let (ecoc, tokens) = fixture();
        let record = EcocCompactionRecord::generate("ssn", &tokens, &ecoc).expect("seal");
        assert_eq!(record.field_name, "ssn");
        assert_eq!(record.tokens(&ecoc).expect("open"), tokens);
    }

    #[test]
    fn test_wrong_width_rejected() {
        let (ecoc, _) = fixture();
        let ct = encrypt_payload(ecoc.as_bytes(), &[0; 32]).expect("seal");
        let err = EncryptedStateCollectionTokens::decrypt(&ecoc, &ct).expect_err("32 bytes");
        assert!(matches!(
            err,
            FleError::MalformedPayload {
                collection: CollectionKind::Ecoc,
                expected: 64,
                actual: 32
            }
        ));
    }
}
