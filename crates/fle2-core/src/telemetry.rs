//! Structured telemetry for tag materialization.
//!
//! Same shape as the rest of the observability layer: a serializable event
//! enum, an observer trait with a no-op default, a bounded ring buffer, and
//! process-wide relaxed counters.
//!
//! # Conformance rules
//!
//! 1. Every [`TagTelemetryEvent`] variant carries a monotonic `timestamp_ns`.
//! 2. All events and snapshots implement `serde::Serialize` for JSON export.
//! 3. Observers MUST NOT block or perform I/O.
//! 4. Events never carry token or tag bytes, only counts and positions.
//! 5. Metric counters use `AtomicU64` with `Ordering::Relaxed`.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

use crate::config::QueryProtocol;
use crate::count_info::QueryType;

// ---------------------------------------------------------------------------
// Telemetry event schema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TagTelemetryEvent {
    /// One counter search finished for one contention factor.
    EmuBinaryCompleted {
        contention_factor: u64,
        /// Highest position found; `None` when the null record decided.
        position: Option<u64>,
        reads: u64,
        timestamp_ns: u64,
    },

    /// A full fan-out over `[0, contention_max]` produced its tags.
    ContentionFanoutCompleted {
        protocol: QueryProtocol,
        contention_max: u64,
        tag_count: u64,
        reads: u64,
        timestamp_ns: u64,
    },

    /// The aggregate tag count failed the memory guard.
    MemoryBudgetRejected {
        tag_count: u64,
        limit_bytes: usize,
        timestamp_ns: u64,
    },

    /// The v1 delete walk stopped at a compaction placeholder.
    PlaceholderEncountered {
        contention_factor: u64,
        position: u64,
        timestamp_ns: u64,
    },

    /// One batched count-info call answered a set of edges.
    BatchedCountInfo {
        edges: usize,
        query_type: QueryType,
        reads: u64,
        timestamp_ns: u64,
    },
}

impl TagTelemetryEvent {
    #[must_use]
    pub fn timestamp_ns(&self) -> u64 {
        match self {
            Self::EmuBinaryCompleted { timestamp_ns, .. }
            | Self::ContentionFanoutCompleted { timestamp_ns, .. }
            | Self::MemoryBudgetRejected { timestamp_ns, .. }
            | Self::PlaceholderEncountered { timestamp_ns, .. }
            | Self::BatchedCountInfo { timestamp_ns, .. } => *timestamp_ns,
        }
    }

    /// Short classification label for this event kind.
    #[must_use]
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::EmuBinaryCompleted { .. } => "emu_binary_completed",
            Self::ContentionFanoutCompleted { .. } => "contention_fanout_completed",
            Self::MemoryBudgetRejected { .. } => "memory_budget_rejected",
            Self::PlaceholderEncountered { .. } => "placeholder_encountered",
            Self::BatchedCountInfo { .. } => "batched_count_info",
        }
    }
}

/// Nanoseconds since the first call in this process.
#[must_use]
pub fn monotonic_ns() -> u64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    let elapsed = EPOCH.get_or_init(Instant::now).elapsed();
    u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX)
}

// ---------------------------------------------------------------------------
// Observer trait (zero-cost when unused)
// ---------------------------------------------------------------------------

/// Receives tag telemetry. Implementations MUST NOT block.
pub trait TagTelemetryObserver: Send + Sync {
    fn on_event(&self, event: &TagTelemetryEvent);
}

/// No-op observer that compiles to zero instructions.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpTagObserver;

impl TagTelemetryObserver for NoOpTagObserver {
    #[inline]
    fn on_event(&self, _event: &TagTelemetryEvent) {}
}

impl<O: TagTelemetryObserver + ?Sized> TagTelemetryObserver for &O {
    fn on_event(&self, event: &TagTelemetryEvent) {
        (**self).on_event(event);
    }
}

/// Ring-buffer observer that stores the last N events.
pub struct TagTelemetryRingBuffer {
    events: parking_lot::Mutex<RingBufferInner>,
}

struct RingBufferInner {
    buf: Vec<TagTelemetryEvent>,
    capacity: usize,
    write_pos: usize,
    count: usize,
}

impl TagTelemetryRingBuffer {
    /// A zero capacity is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: parking_lot::Mutex::new(RingBufferInner {
                buf: Vec::with_capacity(capacity),
                capacity,
                write_pos: 0,
                count: 0,
            }),
        }
    }

    /// The most recent events (up to capacity) in chronological order.
    #[must_use]
    pub fn drain(&self) -> Vec<TagTelemetryEvent> {
        let inner = self.events.lock();
        let n = inner.count.min(inner.capacity);
        let start = if inner.count >= inner.capacity {
            inner.write_pos
        } else {
            0
        };
        (0..n)
            .map(|i| inner.buf[(start + i) % inner.capacity].clone())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        let inner = self.events.lock();
        inner.count.min(inner.capacity)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TagTelemetryObserver for TagTelemetryRingBuffer {
    fn on_event(&self, event: &TagTelemetryEvent) {
        let mut inner = self.events.lock();
        let pos = inner.write_pos;
        if inner.buf.len() < inner.capacity {
            inner.buf.push(event.clone());
        } else {
            inner.buf[pos] = event.clone();
        }
        inner.write_pos = (pos + 1) % inner.capacity;
        inner.count = inner.count.saturating_add(1);
    }
}

// ---------------------------------------------------------------------------
// Global counters
// ---------------------------------------------------------------------------

/// Process-wide tag materialization counters.
#[derive(Debug, Default)]
pub struct TagMetrics {
    searches_total: AtomicU64,
    lookups_total: AtomicU64,
    tags_emitted_total: AtomicU64,
    budget_rejections_total: AtomicU64,
    placeholders_total: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TagMetricsSnapshot {
    pub searches_total: u64,
    pub lookups_total: u64,
    pub tags_emitted_total: u64,
    pub budget_rejections_total: u64,
    pub placeholders_total: u64,
}

pub static GLOBAL_TAG_METRICS: TagMetrics = TagMetrics::new();

impl TagMetrics {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            searches_total: AtomicU64::new(0),
            lookups_total: AtomicU64::new(0),
            tags_emitted_total: AtomicU64::new(0),
            budget_rejections_total: AtomicU64::new(0),
            placeholders_total: AtomicU64::new(0),
        }
    }

    pub fn record_search(&self, lookups: u64) {
        self.searches_total.fetch_add(1, Ordering::Relaxed);
        self.lookups_total.fetch_add(lookups, Ordering::Relaxed);
    }

    pub fn record_tags_emitted(&self, tags: u64) {
        self.tags_emitted_total.fetch_add(tags, Ordering::Relaxed);
    }

    pub fn record_budget_rejection(&self) {
        self.budget_rejections_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_placeholder(&self) {
        self.placeholders_total.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> TagMetricsSnapshot {
        TagMetricsSnapshot {
            searches_total: self.searches_total.load(Ordering::Relaxed),
            lookups_total: self.lookups_total.load(Ordering::Relaxed),
            tags_emitted_total: self.tags_emitted_total.load(Ordering::Relaxed),
            budget_rejections_total: self.budget_rejections_total.load(Ordering::Relaxed),
            placeholders_total: self.placeholders_total.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.searches_total.store(0, Ordering::Relaxed);
        self.lookups_total.store(0, Ordering::Relaxed);
        self.tags_emitted_total.store(0, Ordering::Relaxed);
        self.budget_rejections_total.store(0, Ordering::Relaxed);
        self.placeholders_total.store(0, Ordering::Relaxed);
    }
}

// ===========================================================================
// Tests: conformance validator
// ===========================================================================
