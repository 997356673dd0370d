//! Emulated binary search ("emuBinary").
//!
//! Records for one `(field, value, cf)` live at ids `PRF(tag, 1, p)` for
//! `p = λ+1, λ+2, …` with no gaps, where `λ` is 0 or one past the position
//! stored in the null record left by the last compaction. Ids are opaque, so
//! the only way to find the highest `p` is to probe. The search here does
//! it in `O(log p)` point reads:
//!
//! 1. read the null record (sets `λ`, usually its position plus one)
//! 2. read the document count `ρ` once; `ρ == 0` means nothing can exist
//! 3. probe relative positions `1, 2, 4, …` capped at `ρ`, then `ρ + 1` and
//!    onward doubling if the count was an underestimate
//! 4. binary-search strictly between the last present and first absent probe

use fle2_error::{CollectionKind, FleError, Result};
use fle2_types::PrfBlock;
use tracing::{debug, warn};

use crate::FLE2_LOGGING_STANDARD;
use crate::reader::StateCollectionReader;
use crate::record::StateRecord;

const EMU_BINARY_BEAD_ID: &str = "bd-fle2.4";

/// Outcome of a counter search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmuBinaryResult {
    /// Highest populated position, or 0 for an empty history.
    Position(u64),
    /// A null record exists and nothing lies above it; its stored counters
    /// are the ground truth.
    ConsultNull,
}

impl EmuBinaryResult {
    /// The position when determinate.
    #[must_use]
    pub const fn position(self) -> Option<u64> {
        match self {
            Self::Position(position) => Some(position),
            Self::ConsultNull => None,
        }
    }

    /// True for `Position(0)`: no history at all.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        matches!(self, Self::Position(0))
    }
}

/// Id scheme and null-record decoding of one searchable collection.
pub trait CounterCollection {
    const KIND: CollectionKind;
    type TagToken;
    type ValueToken;

    fn null_id(tag: &Self::TagToken) -> PrfBlock;

    fn position_id(tag: &Self::TagToken, position: u64) -> PrfBlock;

    /// Offset `λ` derived from the null record; relative probe `k` reads
    /// position `λ + k`.
    ///
    /// # Errors
    ///
    /// Returns a decryption or format error for a corrupt null record, or
    /// [`FleError::CounterOverflow`] when the offset does not fit.
    fn search_offset(value: &Self::ValueToken, record: &StateRecord) -> Result<u64>;
}

/// Find the highest populated relative position in `1..`, given that
/// positions are populated contiguously from 1.
///
/// `ceiling` is the document-count bound; 0 short-circuits without probing.
/// Probing past the ceiling only happens when the probe at the ceiling is
/// itself present.
///
/// # Errors
///
/// Propagates probe failures, and [`FleError::CounterOverflow`] if positions
/// run off the end of `u64`.
pub fn highest_populated<F>(ceiling: u64, mut present: F) -> Result<u64>
where
    F: FnMut(u64) -> Result<bool>,
{
    if ceiling == 0 {
        return Ok(0);
    }

    let mut low = 0_u64;
    let mut probe = 1_u64;
    let high = loop {
        if !present(probe)? {
            break probe;
        }
        low = probe;
        probe = match probe.cmp(&ceiling) {
            std::cmp::Ordering::Less => probe.saturating_mul(2).min(ceiling),
            std::cmp::Ordering::Equal => {
                warn!(
                    bead_id = EMU_BINARY_BEAD_ID,
                    logging_standard = FLE2_LOGGING_STANDARD,
                    ceiling,
                    "document count underestimated; probing past it"
                );
                ceiling.checked_add(1).ok_or_else(|| {
                    FleError::counter_overflow("probe passed u64::MAX at the count ceiling")
                })?
            }
            std::cmp::Ordering::Greater => probe.checked_mul(2).ok_or_else(|| {
                FleError::counter_overflow(format!("probe doubling overflowed after {probe}"))
            })?,
        };
    };

    let (mut low, mut high) = (low, high);
    while high - low > 1 {
        let median = low + (high - low) / 2;
        if present(median)? {
            low = median;
        } else {
            high = median;
        }
    }
    Ok(low)
}

/// Run the search for collection `C`.
///
/// # Errors
///
/// Propagates reader failures and null-record decode failures.
pub fn emu_binary<C, R>(reader: &R, tag: &C::TagToken, value: &C::ValueToken) -> Result<EmuBinaryResult>
where
    C: CounterCollection,
    R: StateCollectionReader + ?Sized,
{
    let null_record = reader.get_by_id(&C::null_id(tag))?;
    let lambda = match &null_record {
        Some(record) => C::search_offset(value, record)?,
        None => 0,
    };

    let rho = reader.document_count()?;
    let found = highest_populated(rho, |relative| {
        let position = lambda.checked_add(relative).ok_or_else(|| {
            FleError::counter_overflow(format!("position {lambda} + {relative} overflowed"))
        })?;
        Ok(reader.get_by_id(&C::position_id(tag, position))?.is_some())
    })?;

    let result = if found == 0 && null_record.is_some() {
        EmuBinaryResult::ConsultNull
    } else {
        // found <= probe, and every probe was already checked against overflow
        EmuBinaryResult::Position(lambda + found)
    };

    debug!(
        bead_id = EMU_BINARY_BEAD_ID,
        logging_standard = FLE2_LOGGING_STANDARD,
        collection = %C::KIND,
        lambda,
        rho,
        found,
        result = ?result,
        "emulated binary search finished"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::collections::BTreeSet;

    use proptest::prelude::*;

    use super::*;

    fn run(populated: u64, ceiling: u64) -> (u64, u64) {
        let probes = Cell::new(0_u64);
        let found = highest_populated(ceiling, |p| {
            probes.set(probes.get() + 1);
            Ok(p <= populated)
        })
        .expect("search");
        (found, probes.get())
    }

    #[test]
    fn test_zero_ceiling_probes_nothing() {
        assert_eq!(run(5, 0).1, 0);
    }

    #[test]
    fn test_empty_history_single_probe() {
        assert_eq!(run(0, 40), (0, 1));
    }

    #[test]
    fn test_exact_power_of_two_with_exact_count() {
        // 1, 2, 4, 8 present; 9 absent.
        assert_eq!(run(8, 8), (8, 5));
    }

    #[test]
    fn test_underestimated_count_still_finds_top() {
        assert_eq!(run(20, 3).0, 20);
        assert_eq!(run(1000, 1).0, 1000);
    }

    #[test]
    fn test_overestimated_count() {
        assert_eq!(run(13, 1_000_000).0, 13);
    }

    #[test]
    fn test_probe_sequence_is_doubling_then_bisecting() {
        let seen = std::cell::RefCell::new(Vec::new());
        let found = highest_populated(100, |p| {
            seen.borrow_mut().push(p);
            Ok(p <= 5)
        })
        .expect("search");
        assert_eq!(found, 5);
        assert_eq!(seen.into_inner(), vec![1, 2, 4, 8, 6, 5]);
    }

    #[test]
    fn test_probe_error_propagates() {
        let err = highest_populated(10, |_| Err(FleError::store("down"))).expect_err("fails");
        assert!(matches!(err, FleError::Store(_)));
    }

    #[test]
    fn test_overflow_detected_instead_of_looping() {
        let err = highest_populated(u64::MAX, |_| Ok(true)).expect_err("always present");
        assert!(matches!(err, FleError::CounterOverflow { .. }));
    }

    proptest! {
        #[test]
        fn prop_finds_exact_top_within_log_bound(populated in 0_u64..5000, slack in 0_u64..5000) {
            let ceiling = populated + slack;
            let (found, probes) = run(populated, ceiling);
            prop_assert_eq!(found, populated);
            let log = u64::from(64 - (populated + 1).leading_zeros());
            prop_assert!(probes <= 2 * log + 2, "populated={} probes={}", populated, probes);
        }

        #[test]
        fn prop_underestimates_never_change_the_answer(populated in 1_u64..5000, ceiling in 1_u64..64) {
            prop_assert_eq!(run(populated, ceiling).0, populated);
        }

        #[test]
        fn prop_probes_are_distinct(populated in 0_u64..2000, ceiling in 1_u64..4000) {
            let mut seen = BTreeSet::new();
            let mut dup = false;
            let _ = highest_populated(ceiling, |p| {
                dup |= !seen.insert(p);
                Ok(p <= populated)
            });
            prop_assert!(!dup);
        }
    }
}
