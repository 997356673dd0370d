//! ESC (Encrypted State Collection) v1 records.
//!
//! | record      | `_id`                | plaintext `(u64, u64)`      |
//! |-------------|----------------------|-----------------------------|
//! | null        | `PRF(tag, 0, 0)`     | `(pos, count)`              |
//! | insert      | `PRF(tag, 1, index)` | `(0, count)`                |
//! | positional  | `PRF(tag, 1, index)` | `(pos, count)`              |
//! | placeholder | `PRF(tag, 1, index)` | `(u64::MAX, count)`         |
//!
//! The first word alone selects the variant; a placeholder's count is kept
//! as written (0 from this crate's writer).

use fle2_error::{CollectionKind, FleError, Result};
use fle2_types::pack::{decrypt_pair, encrypt_pair};
use fle2_types::prf::prf2;
use fle2_types::{EscTwiceDerivedTagToken, EscTwiceDerivedValueToken, PrfBlock};

use crate::emu_binary::{CounterCollection, EmuBinaryResult, emu_binary};
use crate::reader::StateCollectionReader;
use crate::record::StateRecord;

pub const ESC_NULL_ID: u64 = 0;
pub const ESC_NON_NULL_ID: u64 = 1;
/// First word of an insert record.
pub const ESC_INSERT_RECORD_VALUE: u64 = 0;
/// First word of a compaction placeholder.
pub const ESC_COMPACTION_RECORD_VALUE: u64 = u64::MAX;
/// Second word of a compaction placeholder written by this crate.
pub const ESC_COMPACTION_RECORD_COUNT_PLACEHOLDER: u64 = 0;

/// Decrypted null record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscNullDocument {
    pub position: u64,
    pub count: u64,
}

/// Decrypted non-null record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscDocument {
    Insert { count: u64 },
    Positional { position: u64, count: u64 },
    CompactionPlaceholder { count: u64 },
}

impl EscDocument {
    #[must_use]
    pub const fn is_compaction_placeholder(&self) -> bool {
        matches!(self, Self::CompactionPlaceholder { .. })
    }

    /// The stored count-type word.
    #[must_use]
    pub const fn position(&self) -> u64 {
        match self {
            Self::Insert { .. } => ESC_INSERT_RECORD_VALUE,
            Self::Positional { position, .. } => *position,
            Self::CompactionPlaceholder { .. } => ESC_COMPACTION_RECORD_VALUE,
        }
    }

    #[must_use]
    pub const fn count(&self) -> u64 {
        match self {
            Self::Insert { count }
            | Self::Positional { count, .. }
            | Self::CompactionPlaceholder { count } => *count,
        }
    }
}

/// ESC v1 codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct EscCollection;

impl EscCollection {
    /// `None` is the null record id.
    #[must_use]
    pub fn generate_id(tag: &EscTwiceDerivedTagToken, index: Option<u64>) -> PrfBlock {
        match index {
            Some(index) => prf2(tag.as_bytes(), ESC_NON_NULL_ID, index),
            None => prf2(tag.as_bytes(), ESC_NULL_ID, 0),
        }
    }

    /// # Errors
    ///
    /// Propagates encryption failure.
    pub fn generate_null_document(
        tag: &EscTwiceDerivedTagToken,
        value: &EscTwiceDerivedValueToken,
        position: u64,
        count: u64,
    ) -> Result<StateRecord> {
        Ok(StateRecord::new(
            Self::generate_id(tag, None),
            encrypt_pair(value, position, count)?,
        ))
    }

    /// # Errors
    ///
    /// Propagates encryption failure.
    pub fn generate_insert_document(
        tag: &EscTwiceDerivedTagToken,
        value: &EscTwiceDerivedValueToken,
        index: u64,
        count: u64,
    ) -> Result<StateRecord> {
        Ok(StateRecord::new(
            Self::generate_id(tag, Some(index)),
            encrypt_pair(value, ESC_INSERT_RECORD_VALUE, count)?,
        ))
    }

    /// # Errors
    ///
    /// Propagates encryption failure.
    pub fn generate_positional_document(
        tag: &EscTwiceDerivedTagToken,
        value: &EscTwiceDerivedValueToken,
        index: u64,
        position: u64,
        count: u64,
    ) -> Result<StateRecord> {
        Ok(StateRecord::new(
            Self::generate_id(tag, Some(index)),
            encrypt_pair(value, position, count)?,
        ))
    }

    /// # Errors
    ///
    /// Propagates encryption failure.
    pub fn generate_compaction_placeholder_document(
        tag: &EscTwiceDerivedTagToken,
        value: &EscTwiceDerivedValueToken,
        index: u64,
    ) -> Result<StateRecord> {
        Ok(StateRecord::new(
            Self::generate_id(tag, Some(index)),
            encrypt_pair(
                value,
                ESC_COMPACTION_RECORD_VALUE,
                ESC_COMPACTION_RECORD_COUNT_PLACEHOLDER,
            )?,
        ))
    }

    /// # Errors
    ///
    /// Returns a decryption or width error.
    pub fn decrypt_null_document(
        value: &EscTwiceDerivedValueToken,
        record: &StateRecord,
    ) -> Result<EscNullDocument> {
        let (position, count) =
            decrypt_pair(CollectionKind::Esc, value, record.ciphertext(CollectionKind::Esc)?)?;
        Ok(EscNullDocument { position, count })
    }

    /// # Errors
    ///
    /// Returns a decryption or width error.
    pub fn decrypt_document(
        value: &EscTwiceDerivedValueToken,
        record: &StateRecord,
    ) -> Result<EscDocument> {
        let (position, count) =
            decrypt_pair(CollectionKind::Esc, value, record.ciphertext(CollectionKind::Esc)?)?;
        match position {
            ESC_INSERT_RECORD_VALUE => Ok(EscDocument::Insert { count }),
            ESC_COMPACTION_RECORD_VALUE => Ok(EscDocument::CompactionPlaceholder { count }),
            position => Ok(EscDocument::Positional { position, count }),
        }
    }

    /// Highest ESC position for one `(value, cf)`.
    ///
    /// # Errors
    ///
    /// Propagates reader and null-record decode failures.
    pub fn emu_binary<R: StateCollectionReader + ?Sized>(
        reader: &R,
        tag: &EscTwiceDerivedTagToken,
        value: &EscTwiceDerivedValueToken,
    ) -> Result<EmuBinaryResult> {
        emu_binary::<Self, R>(reader, tag, value)
    }
}

impl CounterCollection for EscCollection {
    const KIND: CollectionKind = CollectionKind::Esc;
    type TagToken = EscTwiceDerivedTagToken;
    type ValueToken = EscTwiceDerivedValueToken;

    fn null_id(tag: &Self::TagToken) -> PrfBlock {
        Self::generate_id(tag, None)
    }

    fn position_id(tag: &Self::TagToken, position: u64) -> PrfBlock {
        Self::generate_id(tag, Some(position))
    }

    fn search_offset(value: &Self::ValueToken, record: &StateRecord) -> Result<u64> {
        Self::decrypt_null_document(value, record)?
            .position
            .checked_add(1)
            .ok_or_else(|| FleError::counter_overflow("null record position is u64::MAX"))
    }
}

#[cfg(test)]
mod tests {
    use fle2_types::{EqualityFindTokens, IndexKey};
    use proptest::prelude::*;

    use super::*;
    use crate::reader::{CountingReader, InMemoryStateCollection};

    fn tokens() -> (EscTwiceDerivedTagToken, EscTwiceDerivedValueToken) {
        let leaf = EqualityFindTokens::derive(&IndexKey::new(vec![1; 96]), b"\x02value", 0)
            .for_contention(0);
        (leaf.esc_tag, leaf.esc_value)
    }

    fn with_inserts(n: u64) -> InMemoryStateCollection {
        let (tag, value) = tokens();
        (1..=n)
            .map(|i| EscCollection::generate_insert_document(&tag, &value, i, i).expect("insert"))
            .collect()
    }

    #[test]
    fn test_null_and_non_null_ids_differ() {
        let (tag, _) = tokens();
        assert_ne!(
            EscCollection::generate_id(&tag, None),
            EscCollection::generate_id(&tag, Some(0))
        );
        assert_eq!(
            EscCollection::generate_id(&tag, Some(3)),
            prf2(tag.as_bytes(), 1, 3)
        );
    }

    #[test]
    fn test_null_document_round_trip() {
        let (tag, value) = tokens();
        let record = EscCollection::generate_null_document(&tag, &value, 5, 5).expect("null");
        assert_eq!(record.id, EscCollection::generate_id(&tag, None));
        assert_eq!(
            EscCollection::decrypt_null_document(&value, &record).expect("decrypt"),
            EscNullDocument {
                position: 5,
                count: 5
            }
        );
    }

    #[test]
    fn test_placeholder_round_trip() {
        let (tag, value) = tokens();
        let record =
            EscCollection::generate_compaction_placeholder_document(&tag, &value, 9).expect("ph");
        let doc = EscCollection::decrypt_document(&value, &record).expect("decrypt");
        assert!(doc.is_compaction_placeholder());
        assert_eq!(doc.position(), u64::MAX);
        assert_eq!(doc.count(), 0);
    }

    #[test]
    fn test_positional_round_trip() {
        let (tag, value) = tokens();
        let record =
            EscCollection::generate_positional_document(&tag, &value, 8, 6, 7).expect("pos");
        assert_eq!(
            EscCollection::decrypt_document(&value, &record).expect("decrypt"),
            EscDocument::Positional {
                position: 6,
                count: 7
            }
        );
    }

    #[test]
    fn test_placeholder_word_keeps_its_count() {
        let (tag, value) = tokens();
        let record = StateRecord::new(
            EscCollection::generate_id(&tag, Some(1)),
            encrypt_pair(&value, u64::MAX, 456_789).expect("seal"),
        );
        let doc = EscCollection::decrypt_document(&value, &record).expect("decrypt");
        assert_eq!(doc, EscDocument::CompactionPlaceholder { count: 456_789 });
        assert!(doc.is_compaction_placeholder());
        assert_eq!(doc.position(), ESC_COMPACTION_RECORD_VALUE);
        assert_eq!(doc.count(), 456_789);
    }

    #[test]
    fn test_wrong_value_token_fails_decryption() {
        let (tag, value) = tokens();
        let record = EscCollection::generate_insert_document(&tag, &value, 1, 1).expect("insert");
        let other = EscTwiceDerivedValueToken::from_bytes([0; 32]);
        assert!(matches!(
            EscCollection::decrypt_document(&other, &record),
            Err(FleError::Decryption { .. })
        ));
    }

    #[test]
    fn test_missing_value_is_reported() {
        let (_, value) = tokens();
        let record = StateRecord::id_only([0; 32]);
        assert!(matches!(
            EscCollection::decrypt_null_document(&value, &record),
            Err(FleError::MissingValue { .. })
        ));
    }

    #[test]
    fn test_emu_binary_empty_uses_one_lookup() {
        let (tag, value) = tokens();
        let collection = InMemoryStateCollection::new();
        let reader = CountingReader::new(&collection);
        let result = EscCollection::emu_binary(&reader, &tag, &value).expect("search");
        assert_eq!(result, EmuBinaryResult::Position(0));
        assert_eq!(reader.stats().reads, 1);
    }

    #[test]
    fn test_emu_binary_absent_value_in_shared_collection_costs_two_lookups() {
        let (tag, value) = tokens();
        let other = EqualityFindTokens::derive(&IndexKey::new(vec![1; 96]), b"\x02other", 0)
            .for_contention(0);
        let collection: InMemoryStateCollection = (1..=20)
            .map(|i| {
                EscCollection::generate_insert_document(&other.esc_tag, &other.esc_value, i, i)
                    .expect("insert")
            })
            .collect();
        let reader = CountingReader::new(&collection);
        let result = EscCollection::emu_binary(&reader, &tag, &value).expect("search");
        assert_eq!(result, EmuBinaryResult::Position(0));
        // null record, then position 1
        assert_eq!(reader.stats().reads, 2);
    }

    #[test]
    fn test_emu_binary_post_compaction_consults_null() {
        let (tag, value) = tokens();
        let mut collection = InMemoryStateCollection::new();
        collection.insert(EscCollection::generate_null_document(&tag, &value, 5, 5).expect("null"));
        let result = EscCollection::emu_binary(&collection, &tag, &value).expect("search");
        assert_eq!(result, EmuBinaryResult::ConsultNull);

        let null = collection
            .get_by_id(&EscCollection::generate_id(&tag, None))
            .expect("read")
            .expect("present");
        assert_eq!(
            EscCollection::decrypt_null_document(&value, &null).expect("decrypt"),
            EscNullDocument {
                position: 5,
                count: 5
            }
        );
    }

    #[test]
    fn test_emu_binary_resumes_above_null_record() {
        let (tag, value) = tokens();
        let mut collection = InMemoryStateCollection::new();
        collection.insert(EscCollection::generate_null_document(&tag, &value, 5, 5).expect("null"));
        for index in 7..=9 {
            collection.insert(
                EscCollection::generate_positional_document(&tag, &value, index, 5, index - 1)
                    .expect("positional"),
            );
        }
        let result = EscCollection::emu_binary(&collection, &tag, &value).expect("search");
        assert_eq!(result, EmuBinaryResult::Position(9));
    }

    #[test]
    fn test_emu_binary_is_idempotent() {
        let (tag, value) = tokens();
        let collection = with_inserts(37);
        let reader = CountingReader::new(&collection);
        let first = EscCollection::emu_binary(&reader, &tag, &value).expect("search");
        let first_stats = reader.take_stats();
        let second = EscCollection::emu_binary(&reader, &tag, &value).expect("search");
        assert_eq!(first, second);
        assert_eq!(first_stats, reader.stats());
        assert_eq!(collection.len(), 37);
    }

    #[test]
    fn test_emu_binary_ignores_other_values_sharing_the_collection() {
        let (tag, value) = tokens();
        let mut collection = with_inserts(10);
        let other = EqualityFindTokens::derive(&IndexKey::new(vec![1; 96]), b"\x02other", 0)
            .for_contention(0);
        for i in 1..=50 {
            collection.insert(
                EscCollection::generate_insert_document(&other.esc_tag, &other.esc_value, i, i)
                    .expect("insert"),
            );
        }
        assert_eq!(
            EscCollection::emu_binary(&collection, &tag, &value).expect("search"),
            EmuBinaryResult::Position(10)
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_emu_binary_finds_n_in_log_lookups(n in 1_u64..200) {
            let (tag, value) = tokens();
            let collection = with_inserts(n);
            let reader = CountingReader::new(&collection);
            let result = EscCollection::emu_binary(&reader, &tag, &value).expect("search");
            prop_assert_eq!(result, EmuBinaryResult::Position(n));
            let log = u64::from(64 - (n + 1).leading_zeros());
            prop_assert!(reader.stats().reads <= 2 * log + 3);
        }

        #[test]
        fn prop_insert_round_trip(index in 1_u64..u64::MAX, count in 1_u64..u64::MAX) {
            let (tag, value) = tokens();
            let record = EscCollection::generate_insert_document(&tag, &value, index, count).expect("insert");
            prop_assert_eq!(
                EscCollection::decrypt_document(&value, &record).expect("decrypt"),
                EscDocument::Insert { count }
            );
        }
    }
}
