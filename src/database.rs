use crate::access::{Schema, SeqScan, Tuple, TupleId};
use crate::storage::buffer::{BufferPool, DeadlockPolicy};
use crate::storage::disk::HeapFile;
use crate::transaction::{TransactionId, TransactionIdGenerator};
use anyhow::{bail, Result};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// High-level handle that ties the layers together: a data directory of
/// heap files, one shared buffer pool, and the transaction id source.
pub struct Database {
    data_dir: PathBuf,
    pool: BufferPool,
    tables: DashMap<String, Arc<HeapFile>>,
    tid_generator: TransactionIdGenerator,
}

impl Database {
    /// Open a database rooted at `data_dir`, creating the directory if
    /// it does not exist. Tables are materialized lazily via
    /// `create_table`; nothing is scanned up front.
    pub fn open(data_dir: &Path) -> Result<Self> {
        Self::open_with(data_dir, BufferPool::new(crate::storage::buffer::DEFAULT_CAPACITY))
    }

    /// Open with an explicitly configured buffer pool.
    pub fn open_with(data_dir: &Path, pool: BufferPool) -> Result<Self> {
        if data_dir.exists() && !data_dir.is_dir() {
            bail!("data directory path {:?} is not a directory", data_dir);
        }
        std::fs::create_dir_all(data_dir)?;
        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            pool,
            tables: DashMap::new(),
            tid_generator: TransactionIdGenerator::new(),
        })
    }

    /// Open with a given pool capacity and deadlock policy.
    pub fn open_configured(
        data_dir: &Path,
        capacity: usize,
        policy: DeadlockPolicy,
    ) -> Result<Self> {
        Self::open_with(data_dir, BufferPool::with_policy(capacity, policy))
    }

    /// Create (or reopen) the heap file backing `name` and register it
    /// with the buffer pool. Reopening an existing table with the same
    /// schema is fine; the on-disk file is reused as-is.
    pub fn create_table(&self, name: &str, schema: Arc<Schema>) -> Result<Arc<HeapFile>> {
        if let Some(existing) = self.tables.get(name) {
            return Ok(Arc::clone(existing.value()));
        }
        let path = self.data_dir.join(format!("{}.tbl", name));
        let file = HeapFile::open(&path, schema)?;
        self.pool.register_table(Arc::clone(&file));
        self.tables.insert(name.to_string(), Arc::clone(&file));
        Ok(file)
    }

    /// Look up a previously created table by name.
    pub fn table(&self, name: &str) -> Result<Arc<HeapFile>> {
        match self.tables.get(name) {
            Some(file) => Ok(Arc::clone(file.value())),
            None => bail!("table '{}' does not exist", name),
        }
    }

    pub fn begin(&self) -> TransactionId {
        self.tid_generator.next()
    }

    pub fn commit(&self, tid: TransactionId) -> Result<()> {
        self.pool.transaction_complete(tid, true)?;
        Ok(())
    }

    pub fn abort(&self, tid: TransactionId) -> Result<()> {
        self.pool.transaction_complete(tid, false)?;
        Ok(())
    }

    pub fn insert(&self, tid: TransactionId, table: &str, tuple: &Tuple) -> Result<TupleId> {
        let file = self.table(table)?;
        Ok(self.pool.insert_tuple(tid, file.table_id(), tuple)?)
    }

    pub fn delete(&self, tid: TransactionId, tuple: &Tuple) -> Result<()> {
        self.pool.delete_tuple(tid, tuple)?;
        Ok(())
    }

    pub fn scan(&self, tid: TransactionId, table: &str) -> Result<SeqScan> {
        let file = self.table(table)?;
        Ok(file.iterator(&self.pool, tid))
    }

    /// Write every cached page back to disk. Dirty markers are left
    /// alone, so recovery semantics for in-flight transactions do not
    /// change.
    pub fn checkpoint(&self) -> Result<()> {
        self.pool.flush_all_pages()?;
        Ok(())
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }
}
