//! Next free slot for a v1 insert or delete.
//!
//! Only computes the position; persisting the record is the caller's job.

use fle2_error::{CollectionKind, FleError, Result};
use fle2_types::{
    EccTwiceDerivedTagToken, EccTwiceDerivedValueToken, EscTwiceDerivedTagToken,
    EscTwiceDerivedValueToken,
};

use crate::ecc::EccCollection;
use crate::emu_binary::EmuBinaryResult;
use crate::esc::EscCollection;
use crate::reader::StateCollectionReader;

/// Where the next ESC insert record goes and the count it carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscInsertSlot {
    pub position: u64,
    pub count: u64,
}

fn bump(value: u64, what: &str) -> Result<u64> {
    value
        .checked_add(1)
        .ok_or_else(|| FleError::counter_overflow(format!("{what} is u64::MAX")))
}

/// # Errors
///
/// Returns [`FleError::CompactionPlaceholder`] when the top record is a
/// placeholder, [`FleError::RecordNotFound`] when a record the search relied
/// on is gone, and propagates read and decode failures.
pub fn next_esc_insert_slot<R: StateCollectionReader + ?Sized>(
    reader: &R,
    tag: &EscTwiceDerivedTagToken,
    value: &EscTwiceDerivedValueToken,
) -> Result<EscInsertSlot> {
    match EscCollection::emu_binary(reader, tag, value)? {
        EmuBinaryResult::Position(0) => Ok(EscInsertSlot {
            position: 1,
            count: 1,
        }),
        EmuBinaryResult::ConsultNull => {
            let record = reader
                .get_by_id(&EscCollection::generate_id(tag, None))?
                .ok_or_else(|| FleError::not_found(CollectionKind::Esc, "null document"))?;
            let null = EscCollection::decrypt_null_document(value, &record)?;
            Ok(EscInsertSlot {
                position: null
                    .position
                    .checked_add(2)
                    .ok_or_else(|| FleError::counter_overflow("ESC null position is near u64::MAX"))?,
                count: bump(null.count, "ESC null count")?,
            })
        }
        EmuBinaryResult::Position(alpha) => {
            let record = reader
                .get_by_id(&EscCollection::generate_id(tag, Some(alpha)))?
                .ok_or_else(|| {
                    FleError::not_found(CollectionKind::Esc, format!("document at {alpha}"))
                })?;
            let doc = EscCollection::decrypt_document(value, &record)?;
            if doc.is_compaction_placeholder() {
                return Err(FleError::CompactionPlaceholder {
                    collection: CollectionKind::Esc,
                });
            }
            Ok(EscInsertSlot {
                position: bump(alpha, "ESC position")?,
                count: bump(doc.count(), "ESC count")?,
            })
        }
    }
}

/// Index for the next ECC delete record.
///
/// # Errors
///
/// Same conditions as [`next_esc_insert_slot`].
pub fn next_ecc_insert_slot<R: StateCollectionReader + ?Sized>(
    reader: &R,
    tag: &EccTwiceDerivedTagToken,
    value: &EccTwiceDerivedValueToken,
) -> Result<u64> {
    match EccCollection::emu_binary(reader, tag, value)? {
        EmuBinaryResult::Position(0) => Ok(1),
        EmuBinaryResult::ConsultNull => {
            let record = reader
                .get_by_id(&EccCollection::generate_id(tag, None))?
                .ok_or_else(|| FleError::not_found(CollectionKind::Ecc, "null document"))?;
            EccCollection::decrypt_null_document(value, &record)?
                .position
                .checked_add(2)
                .ok_or_else(|| FleError::counter_overflow("ECC null position is near u64::MAX"))
        }
        EmuBinaryResult::Position(alpha) => {
            let record = reader
                .get_by_id(&EccCollection::generate_id(tag, Some(alpha)))?
                .ok_or_else(|| {
                    FleError::not_found(CollectionKind::Ecc, format!("document at {alpha}"))
                })?;
            if EccCollection::decrypt_document(value, &record)?.is_compaction_placeholder() {
                return Err(FleError::CompactionPlaceholder {
                    collection: CollectionKind::Ecc,
                });
            }
            bump(alpha, "ECC position")
        }
    }
}

#[cfg(test)]
mod tests {
    use fle2_types::pack::encrypt_pair;
    use fle2_types::{ContentionTokens, EqualityFindTokens, IndexKey};

    use super::*;
    use crate::reader::InMemoryStateCollection;
    use crate::record::StateRecord;

    fn leaf() -> ContentionTokens {
        EqualityFindTokens::derive(&IndexKey::new(vec![7; 96]), b"\x02slot", 0).for_contention(0)
    }

    #[test]
    fn test_first_insert_goes_to_one() {
        let t = leaf();
        let collection = InMemoryStateCollection::new();
        assert_eq!(
            next_esc_insert_slot(&collection, &t.esc_tag, &t.esc_value).expect("slot"),
            EscInsertSlot {
                position: 1,
                count: 1
            }
        );
        assert_eq!(
            next_ecc_insert_slot(&collection, &t.ecc_tag, &t.ecc_value).expect("slot"),
            1
        );
    }

    #[test]
    fn test_sequential_inserts_fill_slots() {
        let t = leaf();
        let mut collection = InMemoryStateCollection::new();
        for expected in 1..=6 {
            let slot = next_esc_insert_slot(&collection, &t.esc_tag, &t.esc_value).expect("slot");
            assert_eq!(slot.position, expected);
            assert_eq!(slot.count, expected);
            collection.insert(
                EscCollection::generate_insert_document(&t.esc_tag, &t.esc_value, slot.position, slot.count)
                    .expect("insert"),
            );
        }
    }

    #[test]
    fn test_after_compaction_uses_null_document() {
        let t = leaf();
        let mut collection = InMemoryStateCollection::new();
        collection.insert(
            EscCollection::generate_null_document(&t.esc_tag, &t.esc_value, 5, 9).expect("null"),
        );
        assert_eq!(
            next_esc_insert_slot(&collection, &t.esc_tag, &t.esc_value).expect("slot"),
            EscInsertSlot {
                position: 7,
                count: 10
            }
        );

        collection.insert(EccCollection::generate_null_document(&t.ecc_tag, &t.ecc_value, 2).expect("null"));
        assert_eq!(
            next_ecc_insert_slot(&collection, &t.ecc_tag, &t.ecc_value).expect("slot"),
            4
        );
    }

    #[test]
    fn test_placeholder_on_top_is_reported() {
        let t = leaf();
        let mut collection = InMemoryStateCollection::new();
        collection.insert(
            EscCollection::generate_insert_document(&t.esc_tag, &t.esc_value, 1, 1).expect("insert"),
        );
        collection.insert(
            EscCollection::generate_compaction_placeholder_document(&t.esc_tag, &t.esc_value, 2)
                .expect("placeholder"),
        );
        let err = next_esc_insert_slot(&collection, &t.esc_tag, &t.esc_value).expect_err("placeholder");
        assert!(matches!(err, FleError::CompactionPlaceholder { .. }));
        assert!(err.is_transient());

        collection.insert(
            EccCollection::generate_compaction_document(&t.ecc_tag, &t.ecc_value, 1).expect("placeholder"),
        );
        assert!(matches!(
            next_ecc_insert_slot(&collection, &t.ecc_tag, &t.ecc_value),
            Err(FleError::CompactionPlaceholder { .. })
        ));
    }

    #[test]
    fn test_placeholder_with_stored_count_is_retriable() {
        let t = leaf();
        let mut collection: InMemoryStateCollection = (1..=2)
            .map(|i| {
                EscCollection::generate_insert_document(&t.esc_tag, &t.esc_value, i, i)
                    .expect("insert")
            })
            .collect();
        collection.insert(StateRecord::new(
            EscCollection::generate_id(&t.esc_tag, Some(3)),
            encrypt_pair(&t.esc_value, u64::MAX, 456_789).expect("seal"),
        ));
        let err = next_esc_insert_slot(&collection, &t.esc_tag, &t.esc_value)
            .expect_err("placeholder");
        assert!(matches!(
            err,
            FleError::CompactionPlaceholder {
                collection: CollectionKind::Esc
            }
        ));
        assert!(err.is_transient());
    }
}
