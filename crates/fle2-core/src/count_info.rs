//! Batched per-edge counter lookup.
//!
//! An "edge" is one `(value, cf)` pair of the ESC. A query over contention
//! maximum `cm` has `cm + 1` edges; asking for all of them in one call turns
//! `O(cm)` round trips into one.

use fle2_error::{FleError, Result};
use fle2_state::{
    CountingReader, EscCollectionV2, RecordStore, SearchStats, StateCollectionReader,
    TransactionCollectionReader,
};
use fle2_types::{
    EdcDerivedFromDataTokenAndContentionFactorToken, EdcTwiceDerivedToken,
    EscDerivedFromDataTokenAndContentionFactorToken, EscTwiceDerivedTagToken,
    EscTwiceDerivedValueToken,
};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::debug;

use crate::FLE2_LOGGING_STANDARD;

const COUNT_INFO_BEAD_ID: &str = "bd-fle2.8";

/// What the caller intends to do with the returned count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    /// Live insert count, for tag generation.
    Query,
    /// Position for the next non-anchor insert.
    Insert,
    /// Position for the next anchor.
    Compact,
}

impl QueryType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Insert => "insert",
            Self::Compact => "compact",
        }
    }
}

/// Tokens naming one edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgePrfBlock {
    pub esc: EscDerivedFromDataTokenAndContentionFactorToken,
    /// Required for [`QueryType::Query`]; tags cannot be derived without it.
    pub edc: Option<EdcDerivedFromDataTokenAndContentionFactorToken>,
}

/// Edges of one predicate, usually `cm + 1` of them.
pub type EdgeTokenSet = SmallVec<[EdgePrfBlock; 4]>;

/// Answer for one edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeCountInfo {
    /// Meaning depends on `query_type`.
    pub count: u64,
    pub query_type: QueryType,
    pub tag_token: EscTwiceDerivedTagToken,
    pub edc: Option<EdcTwiceDerivedToken>,
    pub cpos: Option<u64>,
    pub apos: Option<u64>,
    pub stats: SearchStats,
}

/// Source of batched count info, local or remote.
pub trait CountInfoFacade {
    /// One reply per set, one [`EdgeCountInfo`] per edge, in request order.
    ///
    /// # Errors
    ///
    /// Returns store and decode failures for any edge.
    fn get_count_infos(
        &self,
        namespace: &str,
        sets: &[EdgeTokenSet],
        query_type: QueryType,
    ) -> Result<Vec<Vec<EdgeCountInfo>>>;
}

/// Verify that `replies` lines up with `sets`.
///
/// # Errors
///
/// Returns [`FleError::CountInfoMismatch`] on the first disagreement.
pub fn check_count_info_shape(sets: &[EdgeTokenSet], replies: &[Vec<EdgeCountInfo>]) -> Result<()> {
    if sets.len() != replies.len() {
        return Err(FleError::CountInfoMismatch {
            expected: sets.len(),
            actual: replies.len(),
        });
    }
    for (set, reply) in sets.iter().zip(replies) {
        if set.len() != reply.len() {
            return Err(FleError::CountInfoMismatch {
                expected: set.len(),
                actual: reply.len(),
            });
        }
    }
    Ok(())
}

/// Resolve one edge against an ESC reader.
///
/// # Errors
///
/// Propagates search failures and counter overflow.
pub fn count_info_for_edge<R: StateCollectionReader + ?Sized>(
    reader: &R,
    edge: &EdgePrfBlock,
    query_type: QueryType,
) -> Result<EdgeCountInfo> {
    let tag = EscTwiceDerivedTagToken::derive(&edge.esc);
    let value = EscTwiceDerivedValueToken::derive(&edge.esc);

    let counting = CountingReader::new(reader);
    let positions = EscCollectionV2::emu_binary_v2(&counting, &tag, &value)?;
    let count = match query_type {
        QueryType::Query => positions.count(),
        QueryType::Insert => positions.next_insert_position()?,
        QueryType::Compact => positions.next_anchor_position()?,
    };

    Ok(EdgeCountInfo {
        count,
        query_type,
        tag_token: tag,
        edc: edge.edc.as_ref().map(EdcTwiceDerivedToken::derive),
        cpos: positions.cpos,
        apos: positions.apos,
        stats: counting.stats(),
    })
}

/// [`CountInfoFacade`] served from a local [`RecordStore`].
///
/// Each call opens one transaction reader, so every edge in the batch is
/// bounded by the same document count.
#[derive(Debug)]
pub struct LocalCountInfoService<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: RecordStore + ?Sized> LocalCountInfoService<'a, S> {
    pub const fn new(store: &'a S) -> Self {
        Self { store }
    }
}

impl<S: RecordStore + ?Sized> CountInfoFacade for LocalCountInfoService<'_, S> {
    fn get_count_infos(
        &self,
        namespace: &str,
        sets: &[EdgeTokenSet],
        query_type: QueryType,
    ) -> Result<Vec<Vec<EdgeCountInfo>>> {
        let reader = TransactionCollectionReader::new(self.store, namespace)?;
        let replies = sets
            .iter()
            .map(|set| {
                set.iter()
                    .map(|edge| count_info_for_edge(&reader, edge, query_type))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            bead_id = COUNT_INFO_BEAD_ID,
            logging_standard = FLE2_LOGGING_STANDARD,
            namespace,
            sets = sets.len(),
            query_type = query_type.as_str(),
            "count info batch answered"
        );
        Ok(replies)
    }
}
