//! Contention fan-out: turn one equality predicate into the full list of EDC
//! tags a query must match.
//!
//! Every form works in two passes. The first resolves a live count for each
//! contention factor in `[0, cm]`; the second runs only after the aggregate
//! count has passed [`verify_tags_will_fit`], and derives the tags.

use std::slice;

use fle2_error::{CollectionKind, FleError, Result};
use fle2_state::{
    CountingReader, EccCollection, EccRange, EmuBinaryResult, EscCollection, EscCollectionV2,
    RecordStore, StateCollectionNamespaces, StateCollectionReader, TransactionCollectionReader,
    count_deleted, merge_ecc_ranges,
};
use fle2_types::{ContentionTokens, EdcTwiceDerivedToken, EqualityFindTokens, PrfBlock};
use smallvec::SmallVec;
use tracing::{debug, error, info};

use crate::FLE2_LOGGING_STANDARD;
use crate::config::{Fle2Config, QueryProtocol};
use crate::count_info::{
    CountInfoFacade, EdgePrfBlock, EdgeTokenSet, LocalCountInfoService, QueryType,
    check_count_info_shape,
};
use crate::memory_guard::verify_tags_will_fit;
use crate::telemetry::{
    GLOBAL_TAG_METRICS, NoOpTagObserver, TagTelemetryEvent, TagTelemetryObserver, monotonic_ns,
};

const TAGS_BEAD_ID: &str = "bd-fle2.6";

/// Resolved state of one contention factor, before any tag exists.
#[derive(Debug, Clone)]
struct ContentionCount {
    edc: EdcTwiceDerivedToken,
    /// Highest insert count; tags are drawn from `1..=count`.
    count: u64,
    /// Merged, sorted, clipped to `[1, count]`.
    deleted: Vec<EccRange>,
    live: u64,
}

impl ContentionCount {
    fn without_deletes(edc: EdcTwiceDerivedToken, count: u64) -> Self {
        Self {
            edc,
            count,
            deleted: Vec::new(),
            live: count,
        }
    }
}

type ContentionCounts = SmallVec<[ContentionCount; 8]>;

/// Merge `ranges` and clip them to the positions `1..=count` that can carry
/// a tag.
fn clip_deleted_ranges(ranges: Vec<EccRange>, count: u64) -> Vec<EccRange> {
    merge_ecc_ranges(ranges)
        .into_iter()
        .filter(|range| range.end >= 1 && range.start <= count)
        .map(|range| EccRange::new(range.start.max(1), range.end.min(count)))
        .collect()
}

/// `ranges` must be sorted and disjoint.
fn is_deleted(ranges: &[EccRange], position: u64) -> bool {
    let index = ranges.partition_point(|range| range.end < position);
    ranges
        .get(index)
        .is_some_and(|range| range.contains(position))
}

/// Runs the fan-out forms against a fixed configuration.
#[derive(Debug, Clone)]
pub struct TagMaterializer<O: TagTelemetryObserver = NoOpTagObserver> {
    config: Fle2Config,
    observer: O,
}

impl TagMaterializer {
    #[must_use]
    pub const fn new(config: Fle2Config) -> Self {
        Self {
            config,
            observer: NoOpTagObserver,
        }
    }
}

impl<O: TagTelemetryObserver> TagMaterializer<O> {
    pub const fn with_observer(config: Fle2Config, observer: O) -> Self {
        Self { config, observer }
    }

    pub const fn config(&self) -> &Fle2Config {
        &self.config
    }

    pub const fn observer(&self) -> &O {
        &self.observer
    }

    /// Tags for `tokens` using the configured protocol and the store's own
    /// namespaces. Batched v2 goes through [`LocalCountInfoService`].
    ///
    /// # Errors
    ///
    /// See [`Self::read_tags_v1`], [`Self::read_tags_v2`] and
    /// [`Self::read_tags_v2_batched`].
    pub fn read_tags_from_store<S: RecordStore + ?Sized>(
        &self,
        store: &S,
        namespaces: &StateCollectionNamespaces,
        tokens: &EqualityFindTokens,
    ) -> Result<Vec<PrfBlock>> {
        match self.config.protocol {
            QueryProtocol::V1 => {
                let esc = TransactionCollectionReader::new(store, namespaces.esc.as_str())?;
                let ecc = TransactionCollectionReader::new(store, namespaces.ecc.as_str())?;
                self.read_tags_v1(&esc, &ecc, tokens)
            }
            QueryProtocol::V2 if self.config.batch_edges => self.read_tags_v2_batched(
                &LocalCountInfoService::new(store),
                &namespaces.esc,
                tokens,
            ),
            QueryProtocol::V2 => {
                let esc = TransactionCollectionReader::new(store, namespaces.esc.as_str())?;
                self.read_tags_v2(&esc, tokens)
            }
        }
    }

    /// Tags for `tokens` over readers supplied by the caller. The v2 form is
    /// always unbatched here; `ecc` is ignored for v2.
    ///
    /// # Errors
    ///
    /// See [`Self::read_tags_v1`] and [`Self::read_tags_v2`].
    pub fn read_tags<E, C>(
        &self,
        protocol: QueryProtocol,
        esc: &E,
        ecc: &C,
        tokens: &EqualityFindTokens,
    ) -> Result<Vec<PrfBlock>>
    where
        E: StateCollectionReader + ?Sized,
        C: StateCollectionReader + ?Sized,
    {
        match protocol {
            QueryProtocol::V1 => self.read_tags_v1(esc, ecc, tokens),
            QueryProtocol::V2 => self.read_tags_v2(esc, tokens),
        }
    }

    /// ESC counters minus ECC delete ranges.
    ///
    /// # Errors
    ///
    /// * [`FleError::Config`] when the contention maximum is over the ceiling.
    /// * [`FleError::CompactionPlaceholder`] when the top ESC record is a
    ///   placeholder.
    /// * [`FleError::RecordNotFound`] when a record the search reported is
    ///   missing.
    /// * [`FleError::MemoryLimitExceeded`] before any tag is generated.
    /// * Decode and reader failures.
    pub fn read_tags_v1<E, C>(
        &self,
        esc: &E,
        ecc: &C,
        tokens: &EqualityFindTokens,
    ) -> Result<Vec<PrfBlock>>
    where
        E: StateCollectionReader + ?Sized,
        C: StateCollectionReader + ?Sized,
    {
        self.config.check_contention(tokens.max_contention)?;

        let esc = CountingReader::new(esc);
        let mut counts = ContentionCounts::new();
        let mut reads = 0_u64;
        for cf in 0..=tokens.max_contention {
            let leaf = tokens.for_contention(cf);
            let (search, count) = v1_insert_count(&esc, &leaf)?;
            let mut lookups = esc.take_stats().reads;

            let mut plan = ContentionCount::without_deletes(leaf.edc_twice, count);
            if count > 0 {
                let walk = EccCollection::walk_deleted_ranges(ecc, &leaf.ecc_tag, &leaf.ecc_value)?;
                lookups = lookups.saturating_add(walk.reads);
                if let Some(position) = walk.placeholder_at {
                    GLOBAL_TAG_METRICS.record_placeholder();
                    self.observer.on_event(&TagTelemetryEvent::PlaceholderEncountered {
                        contention_factor: cf,
                        position,
                        timestamp_ns: monotonic_ns(),
                    });
                }
                plan.deleted = clip_deleted_ranges(walk.ranges, count);
                plan.live = count - count_deleted(&plan.deleted);
            }

            self.record_search(cf, search.position(), lookups);
            debug!(
                bead_id = TAGS_BEAD_ID,
                logging_standard = FLE2_LOGGING_STANDARD,
                contention_factor = cf,
                count,
                live = plan.live,
                lookups,
                "v1 contention factor resolved"
            );
            reads = reads.saturating_add(lookups);
            counts.push(plan);
        }

        self.materialize(QueryProtocol::V1, tokens.max_contention, &counts, reads)
    }

    /// ESC anchors only; every position up to the live count is a tag.
    ///
    /// # Errors
    ///
    /// * [`FleError::Config`] when the contention maximum is over the ceiling.
    /// * [`FleError::MemoryLimitExceeded`] before any tag is generated.
    /// * Search and decode failures.
    pub fn read_tags_v2<E: StateCollectionReader + ?Sized>(
        &self,
        esc: &E,
        tokens: &EqualityFindTokens,
    ) -> Result<Vec<PrfBlock>> {
        self.config.check_contention(tokens.max_contention)?;

        let esc = CountingReader::new(esc);
        let mut counts = ContentionCounts::new();
        let mut reads = 0_u64;
        for cf in 0..=tokens.max_contention {
            let leaf = tokens.for_contention(cf);
            let positions = EscCollectionV2::emu_binary_v2(&esc, &leaf.esc_tag, &leaf.esc_value)?;
            let lookups = esc.take_stats().reads;
            self.record_search(cf, positions.cpos, lookups);
            debug!(
                bead_id = TAGS_BEAD_ID,
                logging_standard = FLE2_LOGGING_STANDARD,
                contention_factor = cf,
                count = positions.count(),
                cpos = ?positions.cpos,
                apos = ?positions.apos,
                lookups,
                "v2 contention factor resolved"
            );
            reads = reads.saturating_add(lookups);
            counts.push(ContentionCount::without_deletes(leaf.edc_twice, positions.count()));
        }

        self.materialize(QueryProtocol::V2, tokens.max_contention, &counts, reads)
    }

    /// v2 with every contention factor answered by one facade call.
    ///
    /// # Errors
    ///
    /// * [`FleError::Config`] when the contention maximum is over the ceiling.
    /// * [`FleError::CountInfoMismatch`] for a reply of the wrong shape.
    /// * [`FleError::MissingEdcToken`] for an edge answered without one.
    /// * [`FleError::MemoryLimitExceeded`] before any tag is generated.
    /// * Whatever the facade returns.
    pub fn read_tags_v2_batched<F: CountInfoFacade + ?Sized>(
        &self,
        facade: &F,
        namespace: &str,
        tokens: &EqualityFindTokens,
    ) -> Result<Vec<PrfBlock>> {
        self.config.check_contention(tokens.max_contention)?;

        let edges: EdgeTokenSet = (0..=tokens.max_contention)
            .map(|cf| {
                let leaf = tokens.for_contention(cf);
                EdgePrfBlock {
                    esc: leaf.esc,
                    edc: Some(leaf.edc),
                }
            })
            .collect();
        let sets = slice::from_ref(&edges);
        let replies = facade.get_count_infos(namespace, sets, QueryType::Query)?;
        check_count_info_shape(sets, &replies)?;

        let mut counts = ContentionCounts::new();
        let mut reads = 0_u64;
        for (edge, info) in replies.iter().flatten().enumerate() {
            let edc = info.edc.ok_or(FleError::MissingEdcToken { edge })?;
            reads = reads.saturating_add(info.stats.reads);
            counts.push(ContentionCount::without_deletes(edc, info.count));
        }
        GLOBAL_TAG_METRICS.record_search(reads);
        self.observer.on_event(&TagTelemetryEvent::BatchedCountInfo {
            edges: edges.len(),
            query_type: QueryType::Query,
            reads,
            timestamp_ns: monotonic_ns(),
        });

        self.materialize(QueryProtocol::V2, tokens.max_contention, &counts, reads)
    }

    fn record_search(&self, contention_factor: u64, position: Option<u64>, reads: u64) {
        GLOBAL_TAG_METRICS.record_search(reads);
        self.observer.on_event(&TagTelemetryEvent::EmuBinaryCompleted {
            contention_factor,
            position,
            reads,
            timestamp_ns: monotonic_ns(),
        });
    }

    fn check_budget(&self, tag_count: u64) -> Result<()> {
        let limit = self.config.memory_limit_bytes;
        verify_tags_will_fit(tag_count, limit).inspect_err(|_| {
            GLOBAL_TAG_METRICS.record_budget_rejection();
            self.observer.on_event(&TagTelemetryEvent::MemoryBudgetRejected {
                tag_count,
                limit_bytes: limit,
                timestamp_ns: monotonic_ns(),
            });
        })
    }

    fn materialize(
        &self,
        protocol: QueryProtocol,
        contention_max: u64,
        counts: &[ContentionCount],
        reads: u64,
    ) -> Result<Vec<PrfBlock>> {
        let total = counts
            .iter()
            .try_fold(0_u64, |total, plan| total.checked_add(plan.live))
            .ok_or_else(|| FleError::counter_overflow("aggregate tag count overflowed u64"))?;
        self.check_budget(total)?;

        let capacity =
            usize::try_from(total).map_err(|_| FleError::TagCountOverflow { tag_count: total })?;
        let mut tags = Vec::with_capacity(capacity);
        for plan in counts {
            for position in 1..=plan.count {
                if !is_deleted(&plan.deleted, position) {
                    tags.push(plan.edc.generate_tag(position));
                }
            }
        }

        GLOBAL_TAG_METRICS.record_tags_emitted(total);
        self.observer.on_event(&TagTelemetryEvent::ContentionFanoutCompleted {
            protocol,
            contention_max,
            tag_count: total,
            reads,
            timestamp_ns: monotonic_ns(),
        });
        info!(
            bead_id = TAGS_BEAD_ID,
            logging_standard = FLE2_LOGGING_STANDARD,
            protocol = protocol.as_str(),
            contention_max,
            tag_count = total,
            reads,
            "contention fan-out complete"
        );
        Ok(tags)
    }
}

/// Insert count for one contention factor of a v1 ESC.
fn v1_insert_count<R: StateCollectionReader + ?Sized>(
    esc: &R,
    leaf: &ContentionTokens,
) -> Result<(EmuBinaryResult, u64)> {
    let search = EscCollection::emu_binary(esc, &leaf.esc_tag, &leaf.esc_value)?;
    let count = match search {
        EmuBinaryResult::Position(0) => 0,
        EmuBinaryResult::ConsultNull => {
            let id = EscCollection::generate_id(&leaf.esc_tag, None);
            let record = esc.get_by_id(&id)?.ok_or_else(|| {
                missing_record(leaf.contention_factor, "ESC null document".to_owned())
            })?;
            EscCollection::decrypt_null_document(&leaf.esc_value, &record)?.count
        }
        EmuBinaryResult::Position(position) => {
            let id = EscCollection::generate_id(&leaf.esc_tag, Some(position));
            let record = esc.get_by_id(&id)?.ok_or_else(|| {
                missing_record(leaf.contention_factor, format!("ESC document at {position}"))
            })?;
            let document = EscCollection::decrypt_document(&leaf.esc_value, &record)?;
            if document.is_compaction_placeholder() {
                return Err(FleError::CompactionPlaceholder {
                    collection: CollectionKind::Esc,
                });
            }
            document.count()
        }
    };
    Ok((search, count))
}

fn missing_record(contention_factor: u64, detail: String) -> FleError {
    error!(
        bead_id = TAGS_BEAD_ID,
        logging_standard = FLE2_LOGGING_STANDARD,
        contention_factor,
        detail = %detail,
        "record reported by search is missing"
    );
    FleError::not_found(CollectionKind::Esc, detail)
}
