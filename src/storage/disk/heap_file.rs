use crate::access::scan::SeqScan;
use crate::access::tuple::{Tuple, TupleId};
use crate::access::value::Schema;
use crate::storage::buffer::{BufferPool, Permission};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{HeapPage, PageId, TableId, PAGE_SIZE};
use crate::transaction::TransactionId;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::fs::{File, OpenOptions};
use std::hash::{Hash, Hasher};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A table's durable backing store: one file, logically partitioned into
/// fixed-size blocks with no header. Block `i` occupies the byte range
/// `[i * PAGE_SIZE, (i + 1) * PAGE_SIZE)`.
///
/// The heap file is a dumb block store: `read_page`/`write_page` do
/// positioned I/O and nothing else. All caching and concurrency safety
/// belong to the buffer pool, which holds the page's write lock for the
/// full duration of any mutation.
pub struct HeapFile {
    table_id: TableId,
    schema: Arc<Schema>,
    path: PathBuf,
    file: Mutex<File>,
}

impl HeapFile {
    /// Opens (creating if absent) the heap file at `path`. The table id is
    /// derived by hashing the canonicalized path, so reopening the same
    /// file always yields the same id.
    pub fn open(path: &Path, schema: Arc<Schema>) -> StorageResult<Arc<Self>> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let canonical = path.canonicalize()?;

        let mut hasher = DefaultHasher::new();
        canonical.hash(&mut hasher);
        let table_id = TableId(hasher.finish() as u32);

        Ok(Arc::new(Self {
            table_id,
            schema,
            path: canonical,
            file: Mutex::new(file),
        }))
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of blocks currently in the file.
    pub fn page_count(&self) -> StorageResult<u32> {
        let len = self.file.lock().metadata()?.len();
        Ok(len.div_ceil(PAGE_SIZE as u64) as u32)
    }

    /// Reads one block. Requesting the block one past the end yields a
    /// fresh empty page (the append slot the insert path allocates into);
    /// anything beyond that is an unknown page.
    pub fn read_page(&self, page_no: u32) -> StorageResult<HeapPage> {
        let pid = PageId::new(self.table_id, page_no);
        let mut file = self.file.lock();
        let len = file.metadata()?.len();
        let offset = page_no as u64 * PAGE_SIZE as u64;

        if offset >= len {
            let page_count = len.div_ceil(PAGE_SIZE as u64) as u32;
            if page_no == page_count {
                return Ok(HeapPage::empty(pid, Arc::clone(&self.schema)));
            }
            return Err(StorageError::UnknownPage(pid));
        }

        let mut buf = Box::new([0u8; PAGE_SIZE]);
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf.as_mut())?;
        Ok(HeapPage::from_bytes(pid, Arc::clone(&self.schema), buf))
    }

    /// Writes one block at its computed offset, extending the file as
    /// needed, and syncs.
    pub fn write_page(&self, page: &HeapPage) -> StorageResult<()> {
        let pid = page.page_id();
        if pid.table != self.table_id {
            return Err(StorageError::WrongTable {
                expected: self.table_id,
                actual: pid.table,
            });
        }
        let offset = pid.page_no as u64 * PAGE_SIZE as u64;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(page.bytes())?;
        file.sync_all()?;
        Ok(())
    }

    /// Inserts a tuple into the first page with a free slot, probing pages
    /// in ascending order with write permission. When every existing page
    /// is full, a new page is appended and persisted synchronously so
    /// `page_count` reflects it immediately, before any cache flush.
    ///
    /// The page is marked dirty under the same write latch as the
    /// mutation, so no observer can see it modified-but-clean. The
    /// appended page's before-image stays the empty construction-time
    /// bytes; an abort rolls the insert back like any other mutation.
    pub fn insert_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> StorageResult<TupleId> {
        let page_count = self.page_count()?;
        for page_no in 0..page_count {
            let pid = PageId::new(self.table_id, page_no);
            let page = pool.get_page(tid, pid, Permission::Write)?;
            let mut guard = page.write();
            if guard.free_slot_count() > 0 {
                let slot = guard.insert_tuple(tuple)?;
                guard.mark_dirty(Some(tid));
                return Ok(TupleId::new(pid, slot));
            }
        }

        // every existing page is full: allocate the append page
        let pid = PageId::new(self.table_id, page_count);
        let page = pool.get_page(tid, pid, Permission::Write)?;
        let mut guard = page.write();
        let slot = guard.insert_tuple(tuple)?;
        guard.mark_dirty(Some(tid));
        self.write_page(&guard)?;
        Ok(TupleId::new(pid, slot))
    }

    /// Deletes the tuple from the slot its record id names, marking the
    /// page dirty under the same write latch.
    pub fn delete_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> StorageResult<()> {
        let rid = tuple.id().ok_or(StorageError::TupleNotAnchored)?;
        if rid.page.table != self.table_id {
            return Err(StorageError::WrongTable {
                expected: self.table_id,
                actual: rid.page.table,
            });
        }
        let page = pool.get_page(tid, rid.page, Permission::Write)?;
        let mut guard = page.write();
        guard.delete_tuple(rid.slot)?;
        guard.mark_dirty(Some(tid));
        Ok(())
    }

    /// Returns a cursor over every tuple in the file, acquiring read locks
    /// page by page through the buffer pool.
    pub fn iterator(self: &Arc<Self>, pool: &BufferPool, tid: TransactionId) -> SeqScan {
        SeqScan::new(pool.clone(), Arc::clone(self), tid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::value::{DataType, Value};
    use tempfile::tempdir;

    fn test_schema() -> Arc<Schema> {
        Schema::new(vec![DataType::Int32])
    }

    #[test]
    fn test_table_id_stable_across_reopen() -> StorageResult<()> {
        let dir = tempdir()?;
        let path = dir.path().join("t.tbl");

        let id1 = HeapFile::open(&path, test_schema())?.table_id();
        let id2 = HeapFile::open(&path, test_schema())?.table_id();
        assert_eq!(id1, id2);

        let other = dir.path().join("u.tbl");
        let id3 = HeapFile::open(&other, test_schema())?.table_id();
        assert_ne!(id1, id3);

        Ok(())
    }

    #[test]
    fn test_new_file_has_no_pages() -> StorageResult<()> {
        let dir = tempdir()?;
        let file = HeapFile::open(&dir.path().join("t.tbl"), test_schema())?;
        assert_eq!(file.page_count()?, 0);
        Ok(())
    }

    #[test]
    fn test_write_read_roundtrip() -> StorageResult<()> {
        let dir = tempdir()?;
        let file = HeapFile::open(&dir.path().join("t.tbl"), test_schema())?;

        let mut page = file.read_page(0)?; // append slot: fresh empty page
        page.insert_tuple(&Tuple::new(vec![Value::Int(42)]))?;
        file.write_page(&page)?;
        assert_eq!(file.page_count()?, 1);

        let reloaded = file.read_page(0)?;
        assert_eq!(reloaded.tuple(0)?.values()[0], Value::Int(42));

        Ok(())
    }

    #[test]
    fn test_read_past_end() -> StorageResult<()> {
        let dir = tempdir()?;
        let file = HeapFile::open(&dir.path().join("t.tbl"), test_schema())?;

        // one past the end is the append slot, two past is an error
        assert!(file.read_page(0).is_ok());
        assert!(matches!(
            file.read_page(1),
            Err(StorageError::UnknownPage(_))
        ));

        Ok(())
    }

    #[test]
    fn test_blocks_do_not_overlap() -> StorageResult<()> {
        let dir = tempdir()?;
        let file = HeapFile::open(&dir.path().join("t.tbl"), test_schema())?;

        let mut p0 = file.read_page(0)?;
        p0.insert_tuple(&Tuple::new(vec![Value::Int(1)]))?;
        file.write_page(&p0)?;

        let mut p1 = file.read_page(1)?;
        p1.insert_tuple(&Tuple::new(vec![Value::Int(2)]))?;
        file.write_page(&p1)?;
        assert_eq!(file.page_count()?, 2);

        assert_eq!(file.read_page(0)?.tuple(0)?.values()[0], Value::Int(1));
        assert_eq!(file.read_page(1)?.tuple(0)?.values()[0], Value::Int(2));

        Ok(())
    }

    #[test]
    fn test_write_page_of_other_table_rejected() -> StorageResult<()> {
        let dir = tempdir()?;
        let file = HeapFile::open(&dir.path().join("t.tbl"), test_schema())?;
        let foreign = HeapPage::empty(PageId::new(TableId(12345), 0), test_schema());

        assert!(matches!(
            file.write_page(&foreign),
            Err(StorageError::WrongTable { .. })
        ));

        Ok(())
    }
}
