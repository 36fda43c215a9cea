//! Storage layer error types.

use crate::storage::page::{PageId, TableId};
use crate::transaction::TransactionId;
use thiserror::Error;

/// Errors that can occur in the storage layer.
///
/// Lock contention is deliberately absent: an unavailable lock is observed
/// as blocking inside `BufferPool::get_page`, never as an error value.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("page is full: no free slot available")]
    PageFull,

    #[error("invalid slot id: {slot} (page has {slots} slots)")]
    InvalidSlot { slot: u16, slots: u16 },

    #[error("slot {slot} is empty or already deleted")]
    SlotEmpty { slot: u16 },

    #[error("unknown page: {0}")]
    UnknownPage(PageId),

    #[error("no table registered with id {0:?}")]
    UnknownTable(TableId),

    #[error("tuple carries no record id; it was never stored")]
    TupleNotAnchored,

    #[error("tuple belongs to table {actual:?}, not {expected:?}")]
    WrongTable { expected: TableId, actual: TableId },

    #[error("buffer pool exhausted: no evictable page among {capacity} resident pages")]
    ResourceExhausted { capacity: usize },

    #[error("transaction {0} aborted")]
    TransactionAborted(TransactionId),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
