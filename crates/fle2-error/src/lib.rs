use std::fmt;

use thiserror::Error;

/// Which encrypted side collection a failure was observed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    /// Encrypted State Collection (insert counters).
    Esc,
    /// Encrypted Contention Collection (deleted ranges).
    Ecc,
    /// Encrypted Compaction Collection (token staging).
    Ecoc,
    /// Encrypted data collection (document tags).
    Edc,
}

impl CollectionKind {
    /// Short lowercase label, also used as the namespace suffix.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Esc => "esc",
            Self::Ecc => "ecc",
            Self::Ecoc => "ecoc",
            Self::Edc => "edc",
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Primary error type for the FLE2 index engine.
///
/// Every failure the engine can produce is one of these variants. Nothing is
/// retried internally; callers decide from [`FleError::is_transient`].
#[derive(Error, Debug)]
pub enum FleError {
    // === Record format errors ===
    /// Ciphertext did not authenticate under the supplied value token.
    #[error("{collection} record failed to decrypt: {detail}")]
    Decryption {
        collection: CollectionKind,
        detail: String,
    },

    /// Decrypted payload has the wrong width for its record shape.
    #[error("{collection} payload is malformed: expected {expected} bytes, got {actual}")]
    MalformedPayload {
        collection: CollectionKind,
        expected: usize,
        actual: usize,
    },

    /// Payload decoded but its sentinel fields match no known record variant.
    #[error("{collection} record has an unknown variant: {detail}")]
    UnknownRecordVariant {
        collection: CollectionKind,
        detail: String,
    },

    /// Record exists but carries no encrypted value.
    #[error("{collection} record has no value field")]
    MissingValue { collection: CollectionKind },

    // === Protocol signals ===
    /// A compaction placeholder was found where a live counter was expected.
    #[error("found {collection} compaction placeholder")]
    CompactionPlaceholder { collection: CollectionKind },

    /// A record the search proved present could not be read back.
    #[error("{collection} document not found: {detail}")]
    RecordNotFound {
        collection: CollectionKind,
        detail: String,
    },

    /// A v2 search returned `(cpos, apos)` values that cannot both hold.
    #[error("invalid searched ESC positions: cpos={cpos:?} apos={apos:?}")]
    InvalidSearchPositions {
        cpos: Option<u64>,
        apos: Option<u64>,
    },

    /// A batched count-info reply does not line up with the request.
    #[error("count info reply mismatch: expected {expected} entries, got {actual}")]
    CountInfoMismatch { expected: usize, actual: usize },

    /// Query fan-out needs an EDC token for every edge.
    #[error("edge {edge} carries no EDC token")]
    MissingEdcToken { edge: usize },

    // === Resource limits ===
    /// Serialized tag array would exceed the configured budget.
    #[error("encrypted rewrite too many tags: {required} bytes exceeds limit of {limit}")]
    MemoryLimitExceeded { required: usize, limit: usize },

    /// Tag count is too large to size at all.
    #[error("encrypted rewrite tag count overflow: {tag_count}")]
    TagCountOverflow { tag_count: u64 },

    /// Counter position arithmetic left the u64 range.
    #[error("counter overflow: {detail}")]
    CounterOverflow { detail: String },

    // === Plumbing ===
    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The backing record store failed a count or point read.
    #[error("record store error: {0}")]
    Store(String),

    /// AEAD encryption failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Internal logic error (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Stable numeric codes for surfacing errors over an RPC or CLI boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    /// Internal logic error.
    Internal = 1,
    /// Record could not be decrypted or decoded.
    Corrupt = 2,
    /// Compaction placeholder observed on the write path.
    CompactionPlaceholder = 3,
    /// State collections disagree with each other.
    Inconsistent = 4,
    /// Tag budget exceeded.
    TooManyTags = 5,
    /// Integer range exceeded.
    Range = 6,
    /// Misconfiguration or misuse of the API.
    Misuse = 7,
    /// Backing store failure.
    IoErr = 8,
}

impl FleError {
    /// Map this error to its stable code.
    #[allow(clippy::match_same_arms)]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Decryption { .. }
            | Self::MalformedPayload { .. }
            | Self::UnknownRecordVariant { .. }
            | Self::MissingValue { .. } => ErrorCode::Corrupt,
            Self::CompactionPlaceholder { .. } => ErrorCode::CompactionPlaceholder,
            Self::RecordNotFound { .. }
            | Self::InvalidSearchPositions { .. }
            | Self::CountInfoMismatch { .. } => ErrorCode::Inconsistent,
            Self::MemoryLimitExceeded { .. } => ErrorCode::TooManyTags,
            Self::TagCountOverflow { .. } | Self::CounterOverflow { .. } => ErrorCode::Range,
            Self::MissingEdcToken { .. } | Self::Config(_) => ErrorCode::Misuse,
            Self::Store(_) => ErrorCode::IoErr,
            Self::Encryption(_) | Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Whether retrying the surrounding transaction may succeed.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::CompactionPlaceholder { .. } | Self::Store(_))
    }

    /// Human-friendly suggestion for fixing this error.
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::CompactionPlaceholder { .. } => {
                Some("Retry the write after the running compaction finishes")
            }
            Self::MemoryLimitExceeded { .. } | Self::TagCountOverflow { .. } => {
                Some("Lower the contention factor or raise the rewrite memory limit")
            }
            Self::Decryption { .. } | Self::MalformedPayload { .. } => {
                Some("Check that the query tokens were derived from the right index key")
            }
            Self::RecordNotFound { .. } | Self::InvalidSearchPositions { .. } => {
                Some("Run compaction; the state collections may be out of sync")
            }
            _ => None,
        }
    }

    /// Get the process exit code for this error (for CLI use).
    pub const fn exit_code(&self) -> i32 {
        self.error_code() as i32
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a record-store error.
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a counter overflow error.
    pub fn counter_overflow(detail: impl Into<String>) -> Self {
        Self::CounterOverflow {
            detail: detail.into(),
        }
    }

    /// Create a missing-record error.
    pub fn not_found(collection: CollectionKind, detail: impl Into<String>) -> Self {
        Self::RecordNotFound {
            collection,
            detail: detail.into(),
        }
    }
}

/// Result type alias using `FleError`.
pub type Result<T> = std::result::Result<T, FleError>;
