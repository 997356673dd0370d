//! Anchor planning for ESC v2 compaction.
//!
//! A compaction reads each edge with [`QueryType::Compact`] and folds the
//! inserts since the last anchor into one new anchor. Writing the record is
//! the caller's job.

use fle2_error::{FleError, Result};
use fle2_state::{EscCollectionV2, StateRecord};
use fle2_types::{EscTwiceDerivedTagToken, EscTwiceDerivedValueToken};
use tracing::{debug, error};

use crate::FLE2_LOGGING_STANDARD;
use crate::count_info::{EdgeCountInfo, QueryType};

const COMPACTION_BEAD_ID: &str = "bd-fle2.9";

/// Where the next anchor goes and the insert count it records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorPlan {
    pub apos: u64,
    pub cpos: u64,
}

/// Decide whether `info` warrants a new anchor.
///
/// `Ok(None)` when nothing was inserted since the last anchor.
///
/// # Errors
///
/// * [`FleError::Internal`] when `info` was not read with
///   [`QueryType::Compact`].
/// * [`FleError::InvalidSearchPositions`] when the edge has no history at
///   all; an ECOC entry implies at least one insert.
pub fn plan_compaction_anchor(info: &EdgeCountInfo) -> Result<Option<AnchorPlan>> {
    if info.query_type != QueryType::Compact {
        return Err(FleError::internal(format!(
            "anchor planning needs compact count info, got {}",
            info.query_type.as_str()
        )));
    }

    match info.cpos {
        None => {
            debug!(
                bead_id = COMPACTION_BEAD_ID,
                logging_standard = FLE2_LOGGING_STANDARD,
                apos = ?info.apos,
                "no inserts since the last anchor"
            );
            Ok(None)
        }
        Some(0) => {
            let detail = if info.apos == Some(0) {
                "edge has no history"
            } else {
                "empty insert history under an existing anchor"
            };
            error!(
                bead_id = COMPACTION_BEAD_ID,
                logging_standard = FLE2_LOGGING_STANDARD,
                apos = ?info.apos,
                detail,
                "compaction found no inserts"
            );
            Err(FleError::InvalidSearchPositions {
                cpos: info.cpos,
                apos: info.apos,
            })
        }
        Some(cpos) => Ok(Some(AnchorPlan {
            apos: info.count,
            cpos,
        })),
    }
}

/// # Errors
///
/// Propagates encryption failure, and rejects `apos == 0`.
pub fn generate_anchor_record(
    tag: &EscTwiceDerivedTagToken,
    value: &EscTwiceDerivedValueToken,
    plan: &AnchorPlan,
) -> Result<StateRecord> {
    EscCollectionV2::generate_anchor_document(tag, value, plan.apos, plan.cpos)
}
