//! ESC v2: id-only non-anchor records plus encrypted anchors.
//!
//! | record      | `_id`                | value                      |
//! |-------------|----------------------|----------------------------|
//! | non-anchor  | `PRF(tag, cpos)`     | none                       |
//! | anchor      | `PRF(tag, 0, apos)`  | `(0, cpos)`                |
//! | null anchor | `PRF(tag, 0, 0)`     | `(bottom_apos, cpos)`      |
//!
//! An anchor at `apos` records the insert count `cpos` at the time a
//! compaction wrote it. Non-anchors above that count are inserts since.

use fle2_error::{CollectionKind, FleError, Result};
use fle2_types::pack::{decrypt_pair, encrypt_pair};
use fle2_types::prf::{prf2, prf_u64};
use fle2_types::{EscTwiceDerivedTagToken, EscTwiceDerivedValueToken, PrfBlock};
use tracing::debug;

use crate::FLE2_LOGGING_STANDARD;
use crate::emu_binary::{CounterCollection, EmuBinaryResult, emu_binary, highest_populated};
use crate::reader::StateCollectionReader;
use crate::record::StateRecord;

const ESC_V2_BEAD_ID: &str = "bd-fle2.5";

/// First id word of anchors and the null anchor.
pub const ESC_ANCHOR_ID: u64 = 0;
/// `apos` of the null anchor; never a real anchor position.
pub const ESC_NULL_ANCHOR_POSITION: u64 = 0;
/// First payload word of a (non-null) anchor.
pub const ESC_ANCHOR_RECORD_VALUE: u64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscAnchorDocument {
    pub cpos: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscNullAnchorDocument {
    /// Highest anchor position removed by cleanup.
    pub apos: u64,
    pub cpos: u64,
}

/// Outcome of [`EscCollectionV2::emu_binary_v2`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmuBinaryV2Result {
    /// Highest non-anchor position. `Some(0)` only for an empty history;
    /// `None` when nothing lies above the anchor's count.
    pub cpos: Option<u64>,
    /// Highest anchor position. `None` when only the null anchor applies.
    pub apos: Option<u64>,
    /// Position of the anchor the base count came from (0 with no anchors;
    /// the null anchor's `apos` when it applied).
    pub anchor_apos: u64,
    /// Count stored in that anchor; 0 with no anchors.
    pub anchor_cpos: u64,
}

impl EmuBinaryV2Result {
    /// Live insert count.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.cpos.unwrap_or(self.anchor_cpos)
    }

    /// Position for the next non-anchor insert.
    ///
    /// # Errors
    ///
    /// Returns [`FleError::CounterOverflow`] at `u64::MAX`.
    pub fn next_insert_position(&self) -> Result<u64> {
        self.count()
            .checked_add(1)
            .ok_or_else(|| FleError::counter_overflow("insert count is u64::MAX"))
    }

    /// Position for the next anchor.
    ///
    /// # Errors
    ///
    /// Returns [`FleError::CounterOverflow`] at `u64::MAX`.
    pub fn next_anchor_position(&self) -> Result<u64> {
        self.apos
            .unwrap_or(self.anchor_apos)
            .checked_add(1)
            .ok_or_else(|| FleError::counter_overflow("anchor position is u64::MAX"))
    }
}

/// Anchor id space searched by the first phase of `emu_binary_v2`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EscAnchorCollection;

impl CounterCollection for EscAnchorCollection {
    const KIND: CollectionKind = CollectionKind::Esc;
    type TagToken = EscTwiceDerivedTagToken;
    type ValueToken = EscTwiceDerivedValueToken;

    fn null_id(tag: &Self::TagToken) -> PrfBlock {
        EscCollectionV2::generate_null_anchor_id(tag)
    }

    fn position_id(tag: &Self::TagToken, position: u64) -> PrfBlock {
        EscCollectionV2::generate_anchor_id(tag, position)
    }

    // Anchors resume directly above the cleaned-up position.
    fn search_offset(value: &Self::ValueToken, record: &StateRecord) -> Result<u64> {
        Ok(EscCollectionV2::decrypt_null_anchor_document(value, record)?.apos)
    }
}

/// ESC v2 codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct EscCollectionV2;

impl EscCollectionV2 {
    #[must_use]
    pub fn generate_non_anchor_id(tag: &EscTwiceDerivedTagToken, cpos: u64) -> PrfBlock {
        prf_u64(tag.as_bytes(), cpos)
    }

    #[must_use]
    pub fn generate_anchor_id(tag: &EscTwiceDerivedTagToken, apos: u64) -> PrfBlock {
        prf2(tag.as_bytes(), ESC_ANCHOR_ID, apos)
    }

    #[must_use]
    pub fn generate_null_anchor_id(tag: &EscTwiceDerivedTagToken) -> PrfBlock {
        Self::generate_anchor_id(tag, ESC_NULL_ANCHOR_POSITION)
    }

    #[must_use]
    pub fn generate_non_anchor_document(tag: &EscTwiceDerivedTagToken, cpos: u64) -> StateRecord {
        StateRecord::id_only(Self::generate_non_anchor_id(tag, cpos))
    }

    /// # Errors
    ///
    /// Returns [`FleError::Internal`] for `apos == 0`, which would collide
    /// with the null anchor.
    pub fn generate_anchor_document(
        tag: &EscTwiceDerivedTagToken,
        value: &EscTwiceDerivedValueToken,
        apos: u64,
        cpos: u64,
    ) -> Result<StateRecord> {
        if apos == ESC_NULL_ANCHOR_POSITION {
            return Err(FleError::internal(
                "anchor position 0 is reserved for the null anchor",
            ));
        }
        Ok(StateRecord::new(
            Self::generate_anchor_id(tag, apos),
            encrypt_pair(value, ESC_ANCHOR_RECORD_VALUE, cpos)?,
        ))
    }

    /// # Errors
    ///
    /// Propagates encryption failure.
    pub fn generate_null_anchor_document(
        tag: &EscTwiceDerivedTagToken,
        value: &EscTwiceDerivedValueToken,
        apos: u64,
        cpos: u64,
    ) -> Result<StateRecord> {
        Ok(StateRecord::new(
            Self::generate_null_anchor_id(tag),
            encrypt_pair(value, apos, cpos)?,
        ))
    }

    /// # Errors
    ///
    /// Returns a decryption or width error, or
    /// [`FleError::UnknownRecordVariant`] when the first word is not 0.
    pub fn decrypt_anchor_document(
        value: &EscTwiceDerivedValueToken,
        record: &StateRecord,
    ) -> Result<EscAnchorDocument> {
        let (marker, cpos) =
            decrypt_pair(CollectionKind::Esc, value, record.ciphertext(CollectionKind::Esc)?)?;
        if marker != ESC_ANCHOR_RECORD_VALUE {
            return Err(FleError::UnknownRecordVariant {
                collection: CollectionKind::Esc,
                detail: format!("anchor marker {marker}"),
            });
        }
        Ok(EscAnchorDocument { cpos })
    }

    /// # Errors
    ///
    /// Returns a decryption or width error.
    pub fn decrypt_null_anchor_document(
        value: &EscTwiceDerivedValueToken,
        record: &StateRecord,
    ) -> Result<EscNullAnchorDocument> {
        let (apos, cpos) =
            decrypt_pair(CollectionKind::Esc, value, record.ciphertext(CollectionKind::Esc)?)?;
        Ok(EscNullAnchorDocument { apos, cpos })
    }

    /// Highest anchor position: `ConsultNull` when only the null anchor
    /// applies.
    ///
    /// # Errors
    ///
    /// Propagates reader and null-anchor decode failures.
    pub fn anchor_binary_hops<R: StateCollectionReader + ?Sized>(
        reader: &R,
        tag: &EscTwiceDerivedTagToken,
        value: &EscTwiceDerivedValueToken,
    ) -> Result<EmuBinaryResult> {
        emu_binary::<EscAnchorCollection, R>(reader, tag, value)
    }

    /// Two-phase search: the highest anchor first, then the highest
    /// non-anchor above the count that anchor holds.
    ///
    /// # Errors
    ///
    /// Propagates reader and decode failures. Returns
    /// [`FleError::RecordNotFound`] if an anchor or null anchor the first
    /// phase relied on is no longer readable.
    pub fn emu_binary_v2<R: StateCollectionReader + ?Sized>(
        reader: &R,
        tag: &EscTwiceDerivedTagToken,
        value: &EscTwiceDerivedValueToken,
    ) -> Result<EmuBinaryV2Result> {
        let (apos, anchor_apos, anchor_cpos) =
            match Self::anchor_binary_hops(reader, tag, value)? {
                EmuBinaryResult::ConsultNull => {
                    let record = reader
                        .get_by_id(&Self::generate_null_anchor_id(tag))?
                        .ok_or_else(|| {
                            FleError::not_found(CollectionKind::Esc, "null anchor vanished")
                        })?;
                    let null = Self::decrypt_null_anchor_document(value, &record)?;
                    (None, null.apos, null.cpos)
                }
                EmuBinaryResult::Position(0) => (Some(0), 0, 0),
                EmuBinaryResult::Position(apos) => {
                    let record = reader
                        .get_by_id(&Self::generate_anchor_id(tag, apos))?
                        .ok_or_else(|| {
                            FleError::not_found(
                                CollectionKind::Esc,
                                format!("anchor at {apos} vanished"),
                            )
                        })?;
                    let anchor = Self::decrypt_anchor_document(value, &record)?;
                    (Some(apos), apos, anchor.cpos)
                }
            };

        let rho = reader.document_count()?;
        let found = highest_populated(rho, |relative| {
            let cpos = anchor_cpos.checked_add(relative).ok_or_else(|| {
                FleError::counter_overflow(format!("cpos {anchor_cpos} + {relative} overflowed"))
            })?;
            Ok(reader
                .get_by_id(&Self::generate_non_anchor_id(tag, cpos))?
                .is_some())
        })?;

        let cpos = if found > 0 {
            Some(anchor_cpos + found)
        } else if apos == Some(0) {
            Some(0)
        } else {
            None
        };

        let result = EmuBinaryV2Result {
            cpos,
            apos,
            anchor_apos,
            anchor_cpos,
        };
        debug!(
            bead_id = ESC_V2_BEAD_ID,
            logging_standard = FLE2_LOGGING_STANDARD,
            rho,
            found,
            result = ?result,
            "anchor search finished"
        );
        Ok(result)
    }
}
