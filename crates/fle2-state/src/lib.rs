//! Encrypted state collections (ESC, ECC) and the emulated binary search
//! that discovers their live counters.
//!
//! This crate never writes: it builds records for a caller to persist and
//! reads records back through [`StateCollectionReader`].

pub mod ecc;
pub mod emu_binary;
pub mod esc;
pub mod esc_v2;
pub mod insert_slot;
pub mod namespaces;
pub mod reader;
pub mod record;

pub use ecc::{
    EccCollection, EccDocument, EccNullDocument, EccRange, EccWalk, count_deleted, merge_ecc_ranges,
};
pub use emu_binary::{CounterCollection, EmuBinaryResult, emu_binary, highest_populated};
pub use esc::{EscCollection, EscDocument, EscNullDocument};
pub use esc_v2::{
    EmuBinaryV2Result, EscAnchorCollection, EscAnchorDocument, EscCollectionV2,
    EscNullAnchorDocument,
};
pub use insert_slot::{EscInsertSlot, next_ecc_insert_slot, next_esc_insert_slot};
pub use namespaces::StateCollectionNamespaces;
pub use reader::{
    CountingReader, InMemoryStateCollection, RecordStore, SearchStats, StateCollectionReader,
    TransactionCollectionReader,
};
pub use record::StateRecord;

pub(crate) const FLE2_LOGGING_STANDARD: &str = "bd-fle2.log";
