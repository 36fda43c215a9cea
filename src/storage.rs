//! Storage layer: slotted pages, heap files, and the buffer pool.
//!
//! The layering mirrors the on-disk reality:
//!
//! - **HeapPage**: one fixed-size (4KB) block in slotted format: an
//!   occupancy bitmap followed by equal-width tuple slots
//! - **HeapFile**: a table's backing file, a raw concatenation of blocks
//!   with no header; performs positioned I/O and nothing else
//! - **BufferPool**: bounded page cache that owns the page-level lock
//!   table and drives NO-STEAL transaction commit/abort
//!
//! All concurrency control lives in the buffer pool; heap files and pages
//! assume their caller holds the appropriate page lock.

pub mod buffer;
pub mod disk;
pub mod error;
pub mod page;

pub use buffer::{BufferPool, DeadlockPolicy, PageRef, Permission};
pub use disk::HeapFile;
pub use error::{StorageError, StorageResult};
pub use page::{HeapPage, PageId, TableId, PAGE_SIZE};
