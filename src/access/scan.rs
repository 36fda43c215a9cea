//! Sequential scan over every tuple of a heap file.

use crate::access::tuple::Tuple;
use crate::storage::buffer::{BufferPool, Permission};
use crate::storage::disk::HeapFile;
use crate::storage::error::StorageResult;
use crate::storage::page::PageId;
use crate::transaction::TransactionId;
use std::sync::Arc;

/// Stateful cursor over all pages of a heap file, in page order, slot
/// order within a page. Every page is visited, including ones that turn
/// out empty. Each page is acquired with read permission through the
/// buffer pool; `close` drops cursor state only, and the read locks persist
/// until transaction end, which is what makes the scan strictly
/// two-phase.
pub struct SeqScan {
    pool: BufferPool,
    file: Arc<HeapFile>,
    tid: TransactionId,
    state: Option<ScanState>,
}

struct ScanState {
    page_no: u32,
    tuples: std::vec::IntoIter<Tuple>,
    peeked: Option<Tuple>,
}

impl SeqScan {
    pub fn new(pool: BufferPool, file: Arc<HeapFile>, tid: TransactionId) -> Self {
        Self {
            pool,
            file,
            tid,
            state: None,
        }
    }

    /// Positions the cursor at page 0. Must be called before iteration;
    /// a cursor that was never opened yields nothing.
    pub fn open(&mut self) -> StorageResult<()> {
        let tuples = Self::load_page(&self.pool, &self.file, self.tid, 0)?;
        self.state = Some(ScanState {
            page_no: 0,
            tuples: tuples.into_iter(),
            peeked: None,
        });
        Ok(())
    }

    /// Decodes one page's occupied tuples under a fresh read lock.
    fn load_page(
        pool: &BufferPool,
        file: &HeapFile,
        tid: TransactionId,
        page_no: u32,
    ) -> StorageResult<Vec<Tuple>> {
        let pid = PageId::new(file.table_id(), page_no);
        let page = pool.get_page(tid, pid, Permission::Read)?;
        let guard = page.read();
        guard.iter().collect()
    }

    /// Returns the next tuple, or `None` once every page is exhausted.
    /// Exhaustion is not an error; errors mean the underlying page access
    /// failed.
    pub fn next_tuple(&mut self) -> StorageResult<Option<Tuple>> {
        let Some(state) = self.state.as_mut() else {
            return Ok(None);
        };
        if let Some(tuple) = state.peeked.take() {
            return Ok(Some(tuple));
        }
        loop {
            if let Some(tuple) = state.tuples.next() {
                return Ok(Some(tuple));
            }
            let next_page = state.page_no + 1;
            if next_page >= self.file.page_count()? {
                return Ok(None);
            }
            state.page_no = next_page;
            state.tuples =
                Self::load_page(&self.pool, &self.file, self.tid, next_page)?.into_iter();
        }
    }

    /// True while more tuples remain.
    pub fn has_next(&mut self) -> StorageResult<bool> {
        if self.state.is_none() {
            return Ok(false);
        }
        if let Some(state) = self.state.as_ref() {
            if state.peeked.is_some() {
                return Ok(true);
            }
        }
        match self.next_tuple()? {
            Some(tuple) => {
                if let Some(state) = self.state.as_mut() {
                    state.peeked = Some(tuple);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Restarts the scan from page 0.
    pub fn rewind(&mut self) -> StorageResult<()> {
        self.close();
        self.open()
    }

    /// Discards cursor state. Locks acquired during the scan are NOT
    /// released here; they belong to the transaction.
    pub fn close(&mut self) {
        self.state = None;
    }
}

impl Iterator for SeqScan {
    type Item = StorageResult<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_tuple().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::value::{DataType, Schema, Value};
    use crate::storage::error::StorageError;
    use tempfile::{tempdir, TempDir};

    const T1: TransactionId = TransactionId(1);
    const T2: TransactionId = TransactionId(2);

    fn test_schema() -> Arc<Schema> {
        Schema::new(vec![DataType::Int32])
    }

    fn setup() -> StorageResult<(BufferPool, Arc<HeapFile>, TempDir)> {
        let dir = tempdir()?;
        let file = HeapFile::open(&dir.path().join("t.tbl"), test_schema())?;
        let pool = BufferPool::new(8);
        pool.register_table(Arc::clone(&file));
        Ok((pool, file, dir))
    }

    fn collect_ints(scan: &mut SeqScan) -> StorageResult<Vec<i32>> {
        let mut out = Vec::new();
        while let Some(tuple) = scan.next_tuple()? {
            match tuple.values()[0] {
                Value::Int(v) => out.push(v),
                _ => panic!("unexpected value type"),
            }
        }
        Ok(out)
    }

    #[test]
    fn test_scan_empty_file() -> StorageResult<()> {
        let (pool, file, _dir) = setup()?;

        let mut scan = file.iterator(&pool, T1);
        scan.open()?;
        assert!(!scan.has_next()?);
        assert!(scan.next_tuple()?.is_none());

        Ok(())
    }

    #[test]
    fn test_unopened_cursor_yields_nothing() -> StorageResult<()> {
        let (pool, file, _dir) = setup()?;
        let mut scan = file.iterator(&pool, T1);
        assert!(!scan.has_next()?);
        assert!(scan.next_tuple()?.is_none());
        Ok(())
    }

    #[test]
    fn test_scan_in_insertion_order() -> StorageResult<()> {
        let (pool, file, _dir) = setup()?;
        for i in 0..5 {
            pool.insert_tuple(T1, file.table_id(), &Tuple::new(vec![Value::Int(i)]))?;
        }

        let mut scan = file.iterator(&pool, T1);
        scan.open()?;
        assert_eq!(collect_ints(&mut scan)?, vec![0, 1, 2, 3, 4]);

        Ok(())
    }

    #[test]
    fn test_scan_spans_pages() -> StorageResult<()> {
        let (pool, file, _dir) = setup()?;
        let per_page = crate::storage::page::heap_page::slots_per_page(4) as i32;
        let total = per_page + 3;
        for i in 0..total {
            pool.insert_tuple(T1, file.table_id(), &Tuple::new(vec![Value::Int(i)]))?;
        }
        assert_eq!(file.page_count()?, 2);

        let mut scan = file.iterator(&pool, T1);
        scan.open()?;
        let ints = collect_ints(&mut scan)?;
        assert_eq!(ints.len(), total as usize);
        assert_eq!(ints.first(), Some(&0));
        assert_eq!(ints.last(), Some(&(total - 1)));

        Ok(())
    }

    #[test]
    fn test_scan_skips_deleted() -> StorageResult<()> {
        let (pool, file, _dir) = setup()?;
        let mut rids = Vec::new();
        for i in 0..4 {
            rids.push(pool.insert_tuple(T1, file.table_id(), &Tuple::new(vec![Value::Int(i)]))?);
        }
        let page = pool.get_page(T1, rids[1].page, Permission::Read)?;
        let victim = page.read().tuple(rids[1].slot)?;
        drop(page);
        pool.delete_tuple(T1, &victim)?;

        let mut scan = file.iterator(&pool, T1);
        scan.open()?;
        assert_eq!(collect_ints(&mut scan)?, vec![0, 2, 3]);

        Ok(())
    }

    #[test]
    fn test_rewind() -> StorageResult<()> {
        let (pool, file, _dir) = setup()?;
        for i in 0..3 {
            pool.insert_tuple(T1, file.table_id(), &Tuple::new(vec![Value::Int(i)]))?;
        }

        let mut scan = file.iterator(&pool, T1);
        scan.open()?;
        assert!(scan.next_tuple()?.is_some());
        assert!(scan.next_tuple()?.is_some());

        scan.rewind()?;
        assert_eq!(collect_ints(&mut scan)?, vec![0, 1, 2]);

        Ok(())
    }

    #[test]
    fn test_close_then_next_is_none() -> StorageResult<()> {
        let (pool, file, _dir) = setup()?;
        pool.insert_tuple(T1, file.table_id(), &Tuple::new(vec![Value::Int(1)]))?;

        let mut scan = file.iterator(&pool, T1);
        scan.open()?;
        scan.close();
        assert!(scan.next_tuple()?.is_none());
        assert!(!scan.has_next()?);

        Ok(())
    }

    #[test]
    fn test_close_keeps_locks() -> StorageResult<()> {
        let (pool, file, _dir) = setup()?;
        pool.insert_tuple(T1, file.table_id(), &Tuple::new(vec![Value::Int(1)]))?;
        pool.transaction_complete(T1, true)?;

        let mut scan = file.iterator(&pool, T2);
        scan.open()?;
        scan.close();
        // strict 2PL: the read lock survives until transaction end
        assert!(pool.holds_lock(T2, PageId::new(file.table_id(), 0)));

        pool.transaction_complete(T2, true)?;
        assert!(!pool.holds_lock(T2, PageId::new(file.table_id(), 0)));

        Ok(())
    }

    #[test]
    fn test_scan_sees_own_uncommitted_inserts() -> StorageResult<()> {
        let (pool, file, _dir) = setup()?;
        pool.insert_tuple(T1, file.table_id(), &Tuple::new(vec![Value::Int(42)]))?;

        // same transaction: the write lock is re-entrant for reads
        let mut scan = file.iterator(&pool, T1);
        scan.open()?;
        assert_eq!(collect_ints(&mut scan)?, vec![42]);

        Ok(())
    }

    #[test]
    fn test_iterator_adapter() -> StorageResult<()> {
        let (pool, file, _dir) = setup()?;
        for i in 0..3 {
            pool.insert_tuple(T1, file.table_id(), &Tuple::new(vec![Value::Int(i)]))?;
        }

        let mut scan = file.iterator(&pool, T1);
        scan.open()?;
        let tuples: Vec<Tuple> = scan.collect::<Result<_, StorageError>>()?;
        assert_eq!(tuples.len(), 3);

        Ok(())
    }
}
