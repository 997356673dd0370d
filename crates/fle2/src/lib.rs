//! FLE2 queryable-encryption index engine.
//!
//! Turns an equality predicate on an encrypted field into the list of EDC
//! tags a query must match, reading the ESC/ECC state collections through a
//! caller-supplied [`RecordStore`] or [`StateCollectionReader`].
//!
//! ```ignore
//! let tokens = EqualityFindTokens::derive(&key, value, max_contention);
//! let namespaces = StateCollectionNamespaces::for_edc("people");
//! let tags = TagMaterializer::new(Fle2Config::default())
//!     .read_tags_from_store(&store, &namespaces, &tokens)?;
//! ```

pub mod logging;

pub use fle2_core::{
    AnchorPlan, CountInfoFacade, EdgeCountInfo, EdgePrfBlock, EdgeTokenSet, Fle2Config,
    GLOBAL_TAG_METRICS, LocalCountInfoService, NoOpTagObserver, QueryProtocol, QueryType,
    TagMaterializer, TagMetricsSnapshot, TagTelemetryEvent, TagTelemetryObserver,
    TagTelemetryRingBuffer, generate_anchor_record, plan_compaction_anchor,
    size_array_elements_memory, verify_tags_will_fit,
};
pub use fle2_error::{CollectionKind, ErrorCode, FleError, Result};
pub use fle2_state::{
    CountingReader, EccCollection, EccRange, EmuBinaryResult, EmuBinaryV2Result, EscCollection,
    EscCollectionV2, InMemoryStateCollection, RecordStore, SearchStats, StateCollectionNamespaces,
    StateCollectionReader, StateRecord, TransactionCollectionReader, next_ecc_insert_slot,
    next_esc_insert_slot,
};
pub use fle2_types::{
    ContentionTokens, EcocCompactionRecord, EncryptedStateCollectionTokens, EqualityFindTokens,
    IndexKey, PRF_BLOCK_LEN, PrfBlock,
};

/// Lower layers, for callers that need more than the re-exported surface.
pub mod layers {
    pub use fle2_core as core;
    pub use fle2_error as error;
    pub use fle2_state as state;
    pub use fle2_types as types;
}

pub(crate) const FLE2_LOGGING_STANDARD: &str = "bd-fle2.log";
