use fle2_error::{CollectionKind, FleError, Result};
use fle2_types::PrfBlock;

/// One document in a state collection: `{_id, value?}`.
///
/// `id` is a raw PRF output. `value` is an AEAD ciphertext; v2 non-anchor
/// ESC records carry no value at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateRecord {
    pub id: PrfBlock,
    pub value: Option<Vec<u8>>,
}

impl StateRecord {
    #[must_use]
    pub fn new(id: PrfBlock, value: Vec<u8>) -> Self {
        Self {
            id,
            value: Some(value),
        }
    }

    /// A record that is nothing but its id.
    #[must_use]
    pub const fn id_only(id: PrfBlock) -> Self {
        Self { id, value: None }
    }

    /// Borrow the ciphertext.
    ///
    /// # Errors
    ///
    /// Returns [`FleError::MissingValue`] for an id-only record.
    pub fn ciphertext(&self, collection: CollectionKind) -> Result<&[u8]> {
        self.value
            .as_deref()
            .ok_or(FleError::MissingValue { collection })
    }
}
