//! Query-side FLE2 machinery built on the state collections: contention
//! fan-out into EDC tags, the tag-array memory guard, batched count-info
//! lookups, and compaction anchor planning.

pub mod compaction;
pub mod config;
pub mod count_info;
pub mod memory_guard;
pub mod tags;
pub mod telemetry;

pub use compaction::{AnchorPlan, generate_anchor_record, plan_compaction_anchor};
pub use config::{
    DEFAULT_MAX_CONTENTION_FACTOR, DEFAULT_MEMORY_LIMIT_BYTES, Fle2Config, QueryProtocol,
};
pub use count_info::{
    CountInfoFacade, EdgeCountInfo, EdgePrfBlock, EdgeTokenSet, LocalCountInfoService, QueryType,
    check_count_info_shape, count_info_for_edge,
};
pub use memory_guard::{ELEMENT_FIXED_OVERHEAD, size_array_elements_memory, verify_tags_will_fit};
pub use tags::TagMaterializer;
pub use telemetry::{
    GLOBAL_TAG_METRICS, NoOpTagObserver, TagMetrics, TagMetricsSnapshot, TagTelemetryEvent,
    TagTelemetryObserver, TagTelemetryRingBuffer,
};

pub(crate) const FLE2_LOGGING_STANDARD: &str = "bd-fle2.log";
