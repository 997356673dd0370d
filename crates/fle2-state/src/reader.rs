//! Read access to a state collection.
//!
//! The engine only ever needs two things from storage: a document count that
//! bounds the search, and point reads by `_id`. Both must come from one
//! snapshot for the duration of a search.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::ops::{Add, AddAssign};

use fle2_error::Result;
use fle2_types::PrfBlock;
use serde::Serialize;
use tracing::debug;

use crate::FLE2_LOGGING_STANDARD;
use crate::record::StateRecord;

const READER_BEAD_ID: &str = "bd-fle2.2";

/// Capability to read one state collection.
pub trait StateCollectionReader {
    /// Document count of the whole collection (all fields and values).
    ///
    /// Used only to bound the exponential search. An overestimate costs extra
    /// probes; an underestimate is tolerated by probing past it.
    ///
    /// # Errors
    ///
    /// Returns a store error when the count cannot be obtained.
    fn document_count(&self) -> Result<u64>;

    /// Point lookup by `_id`.
    ///
    /// # Errors
    ///
    /// Returns a store error when the read fails. A missing record is
    /// `Ok(None)`, never an error.
    fn get_by_id(&self, id: &PrfBlock) -> Result<Option<StateRecord>>;
}

impl<R: StateCollectionReader + ?Sized> StateCollectionReader for &R {
    fn document_count(&self) -> Result<u64> {
        (**self).document_count()
    }

    fn get_by_id(&self, id: &PrfBlock) -> Result<Option<StateRecord>> {
        (**self).get_by_id(id)
    }
}

/// In-memory collection keyed by `_id`.
///
/// Serves as the local-storage reader and as the fixture for tests. The
/// reported count can be overridden to exercise estimate handling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InMemoryStateCollection {
    records: BTreeMap<PrfBlock, StateRecord>,
    count_override: Option<u64>,
}

impl InMemoryStateCollection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record, returning the one it displaced.
    pub fn insert(&mut self, record: StateRecord) -> Option<StateRecord> {
        self.records.insert(record.id, record)
    }

    pub fn remove(&mut self, id: &PrfBlock) -> Option<StateRecord> {
        self.records.remove(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Report `count` from [`StateCollectionReader::document_count`] instead
    /// of the true size.
    pub fn set_count_override(&mut self, count: Option<u64>) {
        self.count_override = count;
    }
}

impl Extend<StateRecord> for InMemoryStateCollection {
    fn extend<T: IntoIterator<Item = StateRecord>>(&mut self, iter: T) {
        for record in iter {
            self.insert(record);
        }
    }
}

impl FromIterator<StateRecord> for InMemoryStateCollection {
    fn from_iter<T: IntoIterator<Item = StateRecord>>(iter: T) -> Self {
        let mut collection = Self::new();
        collection.extend(iter);
        collection
    }
}

impl StateCollectionReader for InMemoryStateCollection {
    fn document_count(&self) -> Result<u64> {
        Ok(self
            .count_override
            .unwrap_or(self.records.len() as u64))
    }

    fn get_by_id(&self, id: &PrfBlock) -> Result<Option<StateRecord>> {
        Ok(self.records.get(id).cloned())
    }
}

/// Read counters accumulated by a search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SearchStats {
    /// Point lookups issued.
    pub reads: u64,
    /// Document-count queries issued.
    pub count_queries: u64,
}

impl Add for SearchStats {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            reads: self.reads.saturating_add(rhs.reads),
            count_queries: self.count_queries.saturating_add(rhs.count_queries),
        }
    }
}

impl AddAssign for SearchStats {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// Wraps a reader and counts every call made through it.
#[derive(Debug)]
pub struct CountingReader<R> {
    inner: R,
    reads: Cell<u64>,
    count_queries: Cell<u64>,
}

impl<R: StateCollectionReader> CountingReader<R> {
    pub const fn new(inner: R) -> Self {
        Self {
            inner,
            reads: Cell::new(0),
            count_queries: Cell::new(0),
        }
    }

    #[must_use]
    pub fn stats(&self) -> SearchStats {
        SearchStats {
            reads: self.reads.get(),
            count_queries: self.count_queries.get(),
        }
    }

    /// Zero the counters, returning what they held.
    pub fn take_stats(&self) -> SearchStats {
        let stats = self.stats();
        self.reads.set(0);
        self.count_queries.set(0);
        stats
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: StateCollectionReader> StateCollectionReader for CountingReader<R> {
    fn document_count(&self) -> Result<u64> {
        self.count_queries
            .set(self.count_queries.get().saturating_add(1));
        self.inner.document_count()
    }

    fn get_by_id(&self, id: &PrfBlock) -> Result<Option<StateRecord>> {
        self.reads.set(self.reads.get().saturating_add(1));
        self.inner.get_by_id(id)
    }
}

/// Storage handle scoped to one transaction, addressed by namespace.
pub trait RecordStore {
    /// # Errors
    ///
    /// Returns a store error when the count cannot be obtained.
    fn count_documents(&self, namespace: &str) -> Result<u64>;

    /// # Errors
    ///
    /// Returns a store error when the read fails.
    fn find_by_id(&self, namespace: &str, id: &PrfBlock) -> Result<Option<StateRecord>>;
}

/// Reader over one namespace of a [`RecordStore`] transaction.
///
/// The document count is read once at construction so every search through
/// this reader is bounded by the same snapshot value.
#[derive(Debug)]
pub struct TransactionCollectionReader<'a, S: ?Sized> {
    store: &'a S,
    namespace: String,
    document_count: u64,
}

impl<'a, S: RecordStore + ?Sized> TransactionCollectionReader<'a, S> {
    /// # Errors
    ///
    /// Propagates the store's count failure.
    pub fn new(store: &'a S, namespace: impl Into<String>) -> Result<Self> {
        let namespace = namespace.into();
        let document_count = store.count_documents(&namespace)?;
        debug!(
            bead_id = READER_BEAD_ID,
            logging_standard = FLE2_LOGGING_STANDARD,
            namespace = %namespace,
            document_count,
            "transaction reader opened"
        );
        Ok(Self {
            store,
            namespace,
            document_count,
        })
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl<S: RecordStore + ?Sized> StateCollectionReader for TransactionCollectionReader<'_, S> {
    fn document_count(&self) -> Result<u64> {
        Ok(self.document_count)
    }

    fn get_by_id(&self, id: &PrfBlock) -> Result<Option<StateRecord>> {
        self.store.find_by_id(&self.namespace, id)
    }
}
