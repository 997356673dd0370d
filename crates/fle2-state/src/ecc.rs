//! ECC (Encrypted Contention Collection) records: deleted-tag ranges.
//!
//! Ids follow the ESC v1 scheme. The null record holds one integer, the last
//! position folded in by compaction; every other record holds an inclusive
//! `(start, end)` range, with `(u64::MAX, u64::MAX)` reserved for the
//! compaction placeholder.

use fle2_error::{CollectionKind, FleError, Result};
use fle2_types::pack::{decrypt_pair, decrypt_u64, encrypt_pair, encrypt_u64};
use fle2_types::prf::prf2;
use fle2_types::{EccTwiceDerivedTagToken, EccTwiceDerivedValueToken, PrfBlock};
use tracing::{debug, warn};

use crate::FLE2_LOGGING_STANDARD;
use crate::emu_binary::{CounterCollection, EmuBinaryResult, emu_binary};
use crate::reader::StateCollectionReader;
use crate::record::StateRecord;

const ECC_BEAD_ID: &str = "bd-fle2.3";

pub const ECC_NULL_ID: u64 = 0;
pub const ECC_NON_NULL_ID: u64 = 1;
/// Both words of a compaction placeholder.
pub const ECC_COMPACTION_RECORD_VALUE: u64 = u64::MAX;

/// Inclusive range of deleted positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EccRange {
    pub start: u64,
    pub end: u64,
}

impl EccRange {
    #[must_use]
    pub const fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub const fn point(position: u64) -> Self {
        Self::new(position, position)
    }

    #[must_use]
    pub const fn contains(&self, position: u64) -> bool {
        self.start <= position && position <= self.end
    }

    /// Number of positions covered; 0 when `start > end`.
    #[must_use]
    pub const fn count(&self) -> u64 {
        match self.end.checked_sub(self.start) {
            Some(span) => span.saturating_add(1),
            None => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EccNullDocument {
    pub position: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EccDocument {
    Regular(EccRange),
    CompactionPlaceholder,
}

impl EccDocument {
    #[must_use]
    pub const fn is_compaction_placeholder(&self) -> bool {
        matches!(self, Self::CompactionPlaceholder)
    }

    #[must_use]
    pub const fn range(&self) -> Option<EccRange> {
        match self {
            Self::Regular(range) => Some(*range),
            Self::CompactionPlaceholder => None,
        }
    }
}

/// Result of walking the delete ranges of one `(value, cf)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EccWalk {
    /// Ranges in the order they were read.
    pub ranges: Vec<EccRange>,
    /// Position of the placeholder that ended the walk, if one did.
    pub placeholder_at: Option<u64>,
    /// Point lookups issued, null record included.
    pub reads: u64,
}

/// ECC codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct EccCollection;

impl EccCollection {
    /// `None` is the null record id.
    #[must_use]
    pub fn generate_id(tag: &EccTwiceDerivedTagToken, index: Option<u64>) -> PrfBlock {
        match index {
            Some(index) => prf2(tag.as_bytes(), ECC_NON_NULL_ID, index),
            None => prf2(tag.as_bytes(), ECC_NULL_ID, 0),
        }
    }

    /// # Errors
    ///
    /// Propagates encryption failure.
    pub fn generate_null_document(
        tag: &EccTwiceDerivedTagToken,
        value: &EccTwiceDerivedValueToken,
        position: u64,
    ) -> Result<StateRecord> {
        Ok(StateRecord::new(
            Self::generate_id(tag, None),
            encrypt_u64(value, position)?,
        ))
    }

    /// Record a single deleted position.
    ///
    /// # Errors
    ///
    /// Same as [`Self::generate_range_document`].
    pub fn generate_document(
        tag: &EccTwiceDerivedTagToken,
        value: &EccTwiceDerivedValueToken,
        index: u64,
        count: u64,
    ) -> Result<StateRecord> {
        Self::generate_range_document(tag, value, index, EccRange::point(count))
    }

    /// # Errors
    ///
    /// Returns [`FleError::Internal`] for an inverted range or one that would
    /// collide with the placeholder encoding.
    pub fn generate_range_document(
        tag: &EccTwiceDerivedTagToken,
        value: &EccTwiceDerivedValueToken,
        index: u64,
        range: EccRange,
    ) -> Result<StateRecord> {
        if range.start > range.end {
            return Err(FleError::internal(format!(
                "inverted ECC range ({}, {})",
                range.start, range.end
            )));
        }
        if range.end == ECC_COMPACTION_RECORD_VALUE {
            return Err(FleError::internal(
                "ECC range may not reach the placeholder value",
            ));
        }
        Ok(StateRecord::new(
            Self::generate_id(tag, Some(index)),
            encrypt_pair(value, range.start, range.end)?,
        ))
    }

    /// # Errors
    ///
    /// Propagates encryption failure.
    pub fn generate_compaction_document(
        tag: &EccTwiceDerivedTagToken,
        value: &EccTwiceDerivedValueToken,
        index: u64,
    ) -> Result<StateRecord> {
        Ok(StateRecord::new(
            Self::generate_id(tag, Some(index)),
            encrypt_pair(
                value,
                ECC_COMPACTION_RECORD_VALUE,
                ECC_COMPACTION_RECORD_VALUE,
            )?,
        ))
    }

    /// # Errors
    ///
    /// Returns a decryption or width error.
    pub fn decrypt_null_document(
        value: &EccTwiceDerivedValueToken,
        record: &StateRecord,
    ) -> Result<EccNullDocument> {
        let position =
            decrypt_u64(CollectionKind::Ecc, value, record.ciphertext(CollectionKind::Ecc)?)?;
        Ok(EccNullDocument { position })
    }

    /// # Errors
    ///
    /// Returns a decryption or width error, or
    /// [`FleError::UnknownRecordVariant`] for an inverted range or a
    /// half-placeholder.
    pub fn decrypt_document(
        value: &EccTwiceDerivedValueToken,
        record: &StateRecord,
    ) -> Result<EccDocument> {
        let (start, end) =
            decrypt_pair(CollectionKind::Ecc, value, record.ciphertext(CollectionKind::Ecc)?)?;
        match (
            start == ECC_COMPACTION_RECORD_VALUE,
            end == ECC_COMPACTION_RECORD_VALUE,
        ) {
            (true, true) => Ok(EccDocument::CompactionPlaceholder),
            (false, false) if start <= end => Ok(EccDocument::Regular(EccRange::new(start, end))),
            _ => Err(FleError::UnknownRecordVariant {
                collection: CollectionKind::Ecc,
                detail: format!("range ({start}, {end})"),
            }),
        }
    }

    /// # Errors
    ///
    /// Propagates reader and null-record decode failures.
    pub fn emu_binary<R: StateCollectionReader + ?Sized>(
        reader: &R,
        tag: &EccTwiceDerivedTagToken,
        value: &EccTwiceDerivedValueToken,
    ) -> Result<EmuBinaryResult> {
        emu_binary::<Self, R>(reader, tag, value)
    }

    /// Read delete ranges sequentially from the first uncompacted position
    /// until a record is absent or a placeholder is reached.
    ///
    /// Placeholders are only written under positive contention, so hitting
    /// one ends the walk rather than failing it.
    ///
    /// # Errors
    ///
    /// Propagates reader failures and any decode failure.
    pub fn walk_deleted_ranges<R: StateCollectionReader + ?Sized>(
        reader: &R,
        tag: &EccTwiceDerivedTagToken,
        value: &EccTwiceDerivedValueToken,
    ) -> Result<EccWalk> {
        let mut walk = EccWalk::default();

        walk.reads += 1;
        let mut position = match reader.get_by_id(&Self::generate_id(tag, None))? {
            Some(record) => Self::decrypt_null_document(value, &record)?
                .position
                .checked_add(2)
                .ok_or_else(|| FleError::counter_overflow("ECC null position is near u64::MAX"))?,
            None => 1,
        };

        loop {
            walk.reads += 1;
            let Some(record) = reader.get_by_id(&Self::generate_id(tag, Some(position)))? else {
                break;
            };
            match Self::decrypt_document(value, &record)? {
                EccDocument::Regular(range) => walk.ranges.push(range),
                EccDocument::CompactionPlaceholder => {
                    warn!(
                        bead_id = ECC_BEAD_ID,
                        logging_standard = FLE2_LOGGING_STANDARD,
                        position,
                        "compaction placeholder ends delete walk"
                    );
                    walk.placeholder_at = Some(position);
                    break;
                }
            }
            position = position.checked_add(1).ok_or_else(|| {
                FleError::counter_overflow("ECC walk passed u64::MAX")
            })?;
        }

        debug!(
            bead_id = ECC_BEAD_ID,
            logging_standard = FLE2_LOGGING_STANDARD,
            ranges = walk.ranges.len(),
            reads = walk.reads,
            "delete walk finished"
        );
        Ok(walk)
    }
}

impl CounterCollection for EccCollection {
    const KIND: CollectionKind = CollectionKind::Ecc;
    type TagToken = EccTwiceDerivedTagToken;
    type ValueToken = EccTwiceDerivedValueToken;

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

/// Sort `ranges` and coalesce any that overlap or touch. Inverted ranges
/// cover nothing and are dropped.
#[must_use]
pub fn merge_ecc_ranges(mut ranges: Vec<EccRange>) -> Vec<EccRange> {
    ranges.retain(|range| range.start <= range.end);
    ranges.sort_unstable();
    let mut merged: Vec<EccRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if range.start <= last.end.saturating_add(1) => {
                last.end = last.end.max(range.end);
            }
            _ => merged.push(range),
        }
    }
    merged
}

/// Total positions covered. Expects non-overlapping input.
#[must_use]
pub fn count_deleted(ranges: &[EccRange]) -> u64 {
    ranges
        .iter()
        .fold(0_u64, |total, range| total.saturating_add(range.count()))
}

#[cfg(test)]
mod tests {
    use fle2_types::{EqualityFindTokens, IndexKey};
    use proptest::prelude::*;

    use super::*;
    use crate::reader::InMemoryStateCollection;

    fn tokens() -> (EccTwiceDerivedTagToken, EccTwiceDerivedValueToken) {
        let leaf = EqualityFindTokens::derive(&IndexKey::new(vec![3; 96]), b"\x02delete", 0)
            .for_contention(0);
        (leaf.ecc_tag, leaf.ecc_value)
    }

    fn ranges(pairs: &[(u64, u64)]) -> Vec<EccRange> {
        pairs.iter().map(|&(s, e)| EccRange::new(s, e)).collect()
    }

    #[test]
    fn test_merge_empty() {
        assert!(merge_ecc_ranges(Vec::new()).is_empty());
    }

    #[test]
    fn test_merge_without_gaps_collapses() {
        let merged = merge_ecc_ranges(ranges(&[(15, 20), (13, 13), (1, 6), (7, 12), (14, 14)]));
        assert_eq!(merged, ranges(&[(1, 20)]));
    }

    #[test]
    fn test_merge_with_gaps_keeps_them() {
        let merged = merge_ecc_ranges(ranges(&[(5, 5), (12, 16), (9, 9), (23, 45)]));
        assert_eq!(merged, ranges(&[(5, 5), (9, 9), (12, 16), (23, 45)]));
    }

    #[test]
    fn test_merge_partial() {
        let merged = merge_ecc_ranges(ranges(&[(5, 5), (12, 16), (6, 9), (17, 23), (45, 45)]));
        assert_eq!(merged, ranges(&[(5, 9), (12, 23), (45, 45)]));
    }

    #[test]
    fn test_merge_overlapping() {
        let merged = merge_ecc_ranges(ranges(&[(1, 10), (3, 4), (8, 12)]));
        assert_eq!(merged, ranges(&[(1, 12)]));
    }

    #[test]
    fn test_count_deleted() {
        assert_eq!(count_deleted(&[]), 0);
        let input = ranges(&[(15, 20), (13, 13), (1, 6), (7, 12), (14, 14)]);
        assert_eq!(count_deleted(&input), 20);
    }

    #[test]
    fn test_inverted_range_covers_nothing() {
        let inverted = EccRange::new(5, 2);
        assert_eq!(inverted.count(), 0);
        assert!(!inverted.contains(3));
        assert_eq!(EccRange::new(0, u64::MAX).count(), u64::MAX);
        assert_eq!(count_deleted(&[inverted, EccRange::point(9)]), 1);
        assert_eq!(
            merge_ecc_ranges(ranges(&[(5, 2), (1, 3)])),
            ranges(&[(1, 3)])
        );
    }

    #[test]
    fn test_document_round_trips() {
        let (tag, value) = tokens();
        let null = EccCollection::generate_null_document(&tag, &value, 7).expect("null");
        assert_eq!(
            EccCollection::decrypt_null_document(&value, &null).expect("decrypt"),
            EccNullDocument { position: 7 }
        );

        let point = EccCollection::generate_document(&tag, &value, 1, 4).expect("point");
        assert_eq!(
            EccCollection::decrypt_document(&value, &point).expect("decrypt"),
            EccDocument::Regular(EccRange::point(4))
        );

        let placeholder = EccCollection::generate_compaction_document(&tag, &value, 2).expect("ph");
        assert!(
            EccCollection::decrypt_document(&value, &placeholder)
                .expect("decrypt")
                .is_compaction_placeholder()
        );
    }

    #[test]
    fn test_invalid_ranges_are_not_generated() {
        let (tag, value) = tokens();
        assert!(EccCollection::generate_range_document(&tag, &value, 1, EccRange::new(5, 4)).is_err());
        assert!(
            EccCollection::generate_range_document(&tag, &value, 1, EccRange::new(u64::MAX, u64::MAX))
                .is_err()
        );
    }

    #[test]
    fn test_half_placeholder_is_unknown_variant() {
        let (tag, value) = tokens();
        for (start, end) in [(u64::MAX, 3), (3, u64::MAX), (9, 2)] {
            let record = StateRecord::new(
                EccCollection::generate_id(&tag, Some(1)),
                encrypt_pair(&value, start, end).expect("seal"),
            );
            assert!(matches!(
                EccCollection::decrypt_document(&value, &record),
                Err(FleError::UnknownRecordVariant { .. })
            ));
        }
    }

    #[test]
    fn test_null_document_rejects_pair_payload() {
        let (tag, value) = tokens();
        let record = StateRecord::new(
            EccCollection::generate_id(&tag, None),
            encrypt_pair(&value, 1, 2).expect("seal"),
        );
        assert!(matches!(
            EccCollection::decrypt_null_document(&value, &record),
            Err(FleError::MalformedPayload { expected: 8, actual: 16, .. })
        ));
    }

    #[test]
    fn test_walk_stops_at_first_gap() {
        let (tag, value) = tokens();
        let mut collection = InMemoryStateCollection::new();
        for (index, deleted) in [(1, 2), (2, 5)] {
            collection.insert(EccCollection::generate_document(&tag, &value, index, deleted).expect("doc"));
        }
        collection.insert(EccCollection::generate_document(&tag, &value, 4, 9).expect("doc"));

        let walk = EccCollection::walk_deleted_ranges(&collection, &tag, &value).expect("walk");
        assert_eq!(walk.ranges, vec![EccRange::point(2), EccRange::point(5)]);
        assert_eq!(walk.placeholder_at, None);
        assert_eq!(walk.reads, 4);
    }

    #[test]
    fn test_walk_starts_above_null_record() {
        let (tag, value) = tokens();
        let mut collection = InMemoryStateCollection::new();
        collection.insert(EccCollection::generate_null_document(&tag, &value, 3).expect("null"));
        collection.insert(
            EccCollection::generate_range_document(&tag, &value, 5, EccRange::new(1, 3)).expect("doc"),
        );
        collection.insert(EccCollection::generate_document(&tag, &value, 6, 8).expect("doc"));

        let walk = EccCollection::walk_deleted_ranges(&collection, &tag, &value).expect("walk");
        assert_eq!(walk.ranges, vec![EccRange::new(1, 3), EccRange::point(8)]);
    }

    #[test]
    fn test_walk_stops_at_placeholder() {
        let (tag, value) = tokens();
        let mut collection = InMemoryStateCollection::new();
        collection.insert(EccCollection::generate_document(&tag, &value, 1, 1).expect("doc"));
        collection.insert(EccCollection::generate_compaction_document(&tag, &value, 2).expect("ph"));
        collection.insert(EccCollection::generate_document(&tag, &value, 3, 7).expect("doc"));

        let walk = EccCollection::walk_deleted_ranges(&collection, &tag, &value).expect("walk");
        assert_eq!(walk.ranges, vec![EccRange::point(1)]);
        assert_eq!(walk.placeholder_at, Some(2));
    }

    #[test]
    fn test_emu_binary_over_ecc() {
        let (tag, value) = tokens();
        let collection: InMemoryStateCollection = (1..=6)
            .map(|i| EccCollection::generate_document(&tag, &value, i, i * 2).expect("doc"))
            .collect();
        assert_eq!(
            EccCollection::emu_binary(&collection, &tag, &value).expect("search"),
            EmuBinaryResult::Position(6)
        );
    }

    proptest! {
        #[test]
        fn prop_merge_preserves_coverage(pairs in prop::collection::vec((1_u64..200, 0_u64..10), 0..20)) {
            let input: Vec<EccRange> = pairs.iter().map(|&(s, len)| EccRange::new(s, s + len)).collect();
            let merged = merge_ecc_ranges(input.clone());
            for window in merged.windows(2) {
                prop_assert!(window[0].end + 1 < window[1].start);
            }
            for position in 0..220 {
                let before = input.iter().any(|r| r.contains(position));
                let after = merged.iter().any(|r| r.contains(position));
                prop_assert_eq!(before, after);
            }
        }

        #[test]
        fn prop_range_round_trip(start in 0_u64..u64::MAX - 1, len in 0_u64..1000) {
            let (tag, value) = tokens();
            let end = start.saturating_add(len).min(u64::MAX - 1);
            let record = EccCollection::generate_range_document(&tag, &value, 1, EccRange::new(start, end)).expect("doc");
            prop_assert_eq!(
                EccCollection::decrypt_document(&value, &record).expect("decrypt"),
                EccDocument::Regular(EccRange::new(start, end))
            );
        }
    }
}
