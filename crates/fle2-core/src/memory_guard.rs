//! Up-front size check for a serialized tag array.
//!
//! Tag counts grow with contention, which a writer controls, so the whole
//! array is priced before a single tag is derived. Each element is a BSON
//! binData keyed by its decimal array index:
//!
//! ```text
//! type(1) + key(digits) + NUL(1) + length(4) + subtype(1) + PrfBlock(32)
//! ```

use fle2_error::{FleError, Result};
use fle2_types::PRF_BLOCK_LEN;
use tracing::error;

use crate::FLE2_LOGGING_STANDARD;

const MEMORY_GUARD_BEAD_ID: &str = "bd-fle2.7";

const SIZE_OF_TYPE: usize = 1;
const SIZE_OF_BIN_DATA_LENGTH: usize = 4;
const SIZE_OF_NULL_MARKER: usize = 1;
const SIZE_OF_SUB_TYPE: usize = 1;

/// Bytes of one element, excluding its index digits.
pub const ELEMENT_FIXED_OVERHEAD: usize =
    SIZE_OF_TYPE + SIZE_OF_BIN_DATA_LENGTH + SIZE_OF_NULL_MARKER + SIZE_OF_SUB_TYPE + PRF_BLOCK_LEN;

/// Serialized size of `tag_count` array elements with indices `0..tag_count`.
///
/// Summed one decimal decade at a time: indices `0..10` cost one key digit,
/// `10..100` two, and so on.
///
/// # Errors
///
/// Returns [`FleError::TagCountOverflow`] if the count or its size does not
/// fit in `usize`.
pub fn size_array_elements_memory(tag_count: u64) -> Result<usize> {
    let overflow = || FleError::TagCountOverflow { tag_count };
    let count = usize::try_from(tag_count).map_err(|_| overflow())?;

    let mut total = 0_usize;
    let mut digits = 1_usize;
    let mut bucket_start = 0_usize;
    let mut bucket_end = 10_usize;
    while bucket_start < count {
        let in_bucket = count.min(bucket_end) - bucket_start;
        let per_element = ELEMENT_FIXED_OVERHEAD + digits;
        total = in_bucket
            .checked_mul(per_element)
            .and_then(|bytes| total.checked_add(bytes))
            .ok_or_else(overflow)?;

        bucket_start = bucket_end;
        digits += 1;
        bucket_end = bucket_end.saturating_mul(10);
    }
    Ok(total)
}

/// Fail unless `tag_count` tags serialize within `memory_limit` bytes.
///
/// # Errors
///
/// Returns [`FleError::MemoryLimitExceeded`] when the array is larger than
/// the limit, or [`FleError::TagCountOverflow`] when it cannot be sized.
pub fn verify_tags_will_fit(tag_count: u64, memory_limit: usize) -> Result<()> {
    let required = size_array_elements_memory(tag_count)?;
    if required > memory_limit {
        error!(
            bead_id = MEMORY_GUARD_BEAD_ID,
            logging_standard = FLE2_LOGGING_STANDARD,
            tag_count,
            required,
            memory_limit,
            "tag array exceeds rewrite memory limit"
        );
        return Err(FleError::MemoryLimitExceeded {
            required,
            limit: memory_limit,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn brute_force(tag_count: u64) -> usize {
        (0..tag_count)
            .map(|index| ELEMENT_FIXED_OVERHEAD + index.to_string().len())
            .sum()
    }

    #[test]
    fn test_fixed_overhead() {
        assert_eq!(ELEMENT_FIXED_OVERHEAD, 39);
    }

    #[test]
    fn test_zero_tags_cost_nothing() {
        assert_eq!(size_array_elements_memory(0).expect("size"), 0);
    }

    #[test]
    fn test_single_digit_indices() {
        assert_eq!(size_array_elements_memory(9).expect("size"), 9 * 40);
        assert_eq!(size_array_elements_memory(10).expect("size"), 10 * 40);
    }

    #[test]
    fn test_crosses_into_two_digit_indices() {
        assert_eq!(size_array_elements_memory(11).expect("size"), 10 * 40 + 41);
        assert_eq!(size_array_elements_memory(101).expect("size"), 10 * 40 + 90 * 41 + 42);
    }

    #[test]
    fn test_verify_fails_exactly_past_the_limit() {
        let exact = size_array_elements_memory(11).expect("size");
        verify_tags_will_fit(11, exact).expect("equal to the limit fits");
        let err = verify_tags_will_fit(11, exact - 1).expect_err("one byte short");
        match err {
            FleError::MemoryLimitExceeded { required, limit } => {
                assert_eq!(required, 441);
                assert_eq!(limit, 440);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_absurd_count_overflows() {
        let err = size_array_elements_memory(u64::MAX).expect_err("overflow");
        assert!(matches!(err, FleError::TagCountOverflow { tag_count: u64::MAX }));
        assert!(verify_tags_will_fit(u64::MAX, usize::MAX).is_err());
    }

    proptest! {
        #[test]
        fn prop_matches_brute_force(tag_count in 0_u64..20_000) {
            prop_assert_eq!(size_array_elements_memory(tag_count).expect("size"), brute_force(tag_count));
        }

        #[test]
        fn prop_monotonic(tag_count in 0_u64..1_000_000) {
            let here = size_array_elements_memory(tag_count).expect("size");
            let next = size_array_elements_memory(tag_count + 1).expect("size");
            prop_assert!(next > here);
        }
    }
}
