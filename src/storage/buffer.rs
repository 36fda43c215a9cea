//! Bounded page cache with page-level locking and NO-STEAL transaction
//! completion.
//!
//! All cache and lock-table state lives behind one mutex; every operation
//! takes the critical section, mutates, and leaves. A request that cannot
//! be granted parks the caller on a condvar that is notified whenever any
//! lock is released, so waiters are woken promptly instead of polling.
//!
//! Eviction is NO-STEAL: a dirty page is never written out (or dropped)
//! to make room, so an uncommitted change can always be rolled back from
//! its in-memory before-image. When every resident page is dirty the
//! request fails with `ResourceExhausted` and the pool is left exactly as
//! it was before the call.

pub mod lock;
pub mod lru;

use crate::access::tuple::{Tuple, TupleId};
use crate::storage::disk::HeapFile;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{HeapPage, PageId, TableId};
use crate::transaction::TransactionId;
use dashmap::DashMap;
use lock::{Grant, LockTable, WaitGraph};
use log::{debug, trace, warn};
use lru::AccessOrder;
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub use lock::Permission;

/// Default number of pages a pool caches.
pub const DEFAULT_CAPACITY: usize = 50;

/// A page handle returned by `get_page`. The outer `RwLock` guards
/// physical access to the bytes; logical isolation between transactions
/// is enforced by the pool's lock table.
pub type PageRef = Arc<RwLock<HeapPage>>;

/// What to do when a lock request would join a wait cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlockPolicy {
    /// Refuse the request with `TransactionAborted` (the default).
    Detect,
    /// Wait anyway. Two transactions upgrading in opposite order will
    /// block each other forever; kept for compatibility testing against
    /// deployments that relied on the original undetected behavior.
    Wait,
}

struct PoolState {
    cache: HashMap<PageId, PageRef>,
    order: AccessOrder,
    locks: LockTable,
    waits: WaitGraph,
    /// Transactions currently parked in `get_page`.
    waiting: HashSet<TransactionId>,
    /// Waiting transactions that were aborted from another thread; their
    /// next wake-up turns into `TransactionAborted`.
    abort_signals: HashSet<TransactionId>,
}

struct Inner {
    capacity: usize,
    policy: DeadlockPolicy,
    state: Mutex<PoolState>,
    released: Condvar,
    tables: DashMap<TableId, Arc<HeapFile>>,
}

/// Shared handle to one buffer pool. Cloning is cheap; all clones see the
/// same cache and lock table.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<Inner>,
}

impl BufferPool {
    pub fn new(capacity: usize) -> Self {
        Self::with_policy(capacity, DeadlockPolicy::Detect)
    }

    pub fn with_policy(capacity: usize, policy: DeadlockPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                capacity,
                policy,
                state: Mutex::new(PoolState {
                    cache: HashMap::with_capacity(capacity),
                    order: AccessOrder::new(),
                    locks: LockTable::new(),
                    waits: WaitGraph::new(),
                    waiting: HashSet::new(),
                    abort_signals: HashSet::new(),
                }),
                released: Condvar::new(),
                tables: DashMap::new(),
            }),
        }
    }

    /// Makes a heap file reachable through its table id, so cache misses
    /// on its pages can be satisfied.
    pub fn register_table(&self, file: Arc<HeapFile>) {
        self.inner.tables.insert(file.table_id(), file);
    }

    pub fn table(&self, table_id: TableId) -> StorageResult<Arc<HeapFile>> {
        self.inner
            .tables
            .get(&table_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(StorageError::UnknownTable(table_id))
    }

    /// Retrieves a page with the requested permission, blocking until the
    /// lock can be granted.
    ///
    /// On a miss the page is loaded from its heap file, evicting the
    /// least-recently-touched clean page if the pool is full. A failed
    /// eviction (`ResourceExhausted`) or load leaves cache and lock state
    /// exactly as before the call.
    pub fn get_page(
        &self,
        tid: TransactionId,
        pid: PageId,
        perm: Permission,
    ) -> StorageResult<PageRef> {
        let inner = &self.inner;
        let mut state = inner.state.lock();

        let undo = loop {
            if state.abort_signals.remove(&tid) {
                state.waits.remove(tid);
                return Err(StorageError::TransactionAborted(tid));
            }
            match state.locks.try_acquire(tid, pid, perm) {
                Grant::Granted(undo) => {
                    state.waits.remove(tid);
                    break Some(undo);
                }
                Grant::AlreadyHeld => {
                    state.waits.remove(tid);
                    break None;
                }
                Grant::Denied => {
                    let holders: Vec<TransactionId> = state
                        .locks
                        .holders(pid)
                        .into_iter()
                        .filter(|holder| *holder != tid)
                        .collect();
                    if inner.policy == DeadlockPolicy::Detect
                        && holders
                            .iter()
                            .any(|holder| state.waits.would_cycle(tid, *holder))
                    {
                        warn!("{} would deadlock waiting on {}; aborting", tid, pid);
                        state.waits.remove(tid);
                        return Err(StorageError::TransactionAborted(tid));
                    }
                    trace!("{} waiting for {:?} on {}", tid, perm, pid);
                    state.waits.set_waits(tid, &holders);
                    state.waiting.insert(tid);
                    inner.released.wait(&mut state);
                    state.waiting.remove(&tid);
                }
            }
        };

        // lock granted; resolve the page, undoing the grant on any failure
        match Self::resolve_page(inner, &mut state, pid) {
            Ok(page) => Ok(page),
            Err(e) => {
                if let Some(undo) = undo {
                    state.locks.undo(tid, pid, undo);
                    drop(state);
                    inner.released.notify_all();
                }
                Err(e)
            }
        }
    }

    /// Cache lookup, with eviction and disk load on a miss. Called with
    /// the lock already granted.
    fn resolve_page(
        inner: &Inner,
        state: &mut PoolState,
        pid: PageId,
    ) -> StorageResult<PageRef> {
        if let Some(page) = state.cache.get(&pid) {
            let page = Arc::clone(page);
            state.order.touch(pid);
            return Ok(page);
        }

        if state.cache.len() >= inner.capacity {
            Self::evict(inner, state)?;
        }

        let file = inner
            .tables
            .get(&pid.table)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(StorageError::UnknownTable(pid.table))?;
        let page = Arc::new(RwLock::new(file.read_page(pid.page_no)?));
        state.cache.insert(pid, Arc::clone(&page));
        state.order.touch(pid);
        Ok(page)
    }

    /// Discards the least-recently-touched evictable page. A dirty page
    /// is never a victim (NO-STEAL), and neither is a write-locked one:
    /// its holder may be mutating the page through a handle handed out
    /// before it gets around to marking it dirty. If nothing is evictable
    /// the caller gets a recoverable `ResourceExhausted`.
    fn evict(inner: &Inner, state: &mut PoolState) -> StorageResult<()> {
        let victim = state
            .order
            .iter()
            .find(|pid| {
                let clean = state
                    .cache
                    .get(pid)
                    .map(|page| page.read().dirty().is_none())
                    .unwrap_or(false);
                clean && !state.locks.write_locked(*pid)
            })
            .ok_or(StorageError::ResourceExhausted {
                capacity: inner.capacity,
            })?;

        debug!("evicting clean page {}", victim);
        state.cache.remove(&victim);
        state.order.remove(victim);
        Ok(())
    }

    /// Unconditionally drops `tid`'s lock on `pid`.
    ///
    /// Releasing a lock before transaction end breaks strict two-phase
    /// locking; only narrow, carefully reasoned callers should use this.
    /// Idempotent.
    pub fn release_page(&self, tid: TransactionId, pid: PageId) {
        let mut state = self.inner.state.lock();
        if state.locks.release(tid, pid) {
            drop(state);
            self.inner.released.notify_all();
        }
    }

    /// True iff `tid` holds a read or write lock on `pid`.
    pub fn holds_lock(&self, tid: TransactionId, pid: PageId) -> bool {
        self.inner.state.lock().locks.holds(tid, pid)
    }

    /// Commit-by-default transaction completion.
    pub fn transaction_commit(&self, tid: TransactionId) -> StorageResult<()> {
        self.transaction_complete(tid, true)
    }

    /// Ends a transaction: reconciles every page it locked, then releases
    /// the locks.
    ///
    /// Pages dirtied by `tid` are flushed to their heap file on commit
    /// (marker cleared, before-image refreshed) or restored from their
    /// before-image on abort, with the restored bytes written back so a
    /// force-persisted append cannot resurrect after eviction. A failed
    /// flush leaves that page's dirty marker in place and the first error
    /// is returned, but every lock is still released and waiters are
    /// still woken; no exit path leaves a parked transaction sleeping.
    /// Safe and idempotent even when the transaction holds no locks;
    /// aborting a transaction that is currently blocked in `get_page` on
    /// another thread wakes it with `TransactionAborted`.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) -> StorageResult<()> {
        let mut state = self.inner.state.lock();
        let pages = state.locks.pages_locked_by(tid);
        debug!(
            "{} {} with {} page locks",
            tid,
            if commit { "committing" } else { "aborting" },
            pages.len()
        );

        let mut first_err: Option<StorageError> = None;
        for pid in pages {
            // dirty pages are always resident (NO-STEAL), so any page
            // missing from the cache was clean and needs no reconciling
            if let Some(page) = state.cache.get(&pid).map(Arc::clone) {
                let mut guard = page.write();
                if guard.dirty() == Some(tid) {
                    if let Err(e) = self.reconcile_page(commit, pid, &mut guard) {
                        first_err.get_or_insert(e);
                    }
                }
            }
            state.locks.release(tid, pid);
        }

        state.waits.remove(tid);
        if !commit && state.waiting.contains(&tid) {
            state.abort_signals.insert(tid);
        }
        drop(state);
        self.inner.released.notify_all();
        match first_err {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    fn reconcile_page(&self, commit: bool, pid: PageId, page: &mut HeapPage) -> StorageResult<()> {
        let file = self.table(pid.table)?;
        if commit {
            file.write_page(page)?;
            page.mark_dirty(None);
            page.snapshot_before_image();
        } else {
            page.restore_before_image();
            file.write_page(page)?;
        }
        Ok(())
    }

    /// Writes every dirty resident page through to its heap file without
    /// releasing locks or clearing transaction ownership. Checkpointing
    /// aid, not a transaction-end path.
    pub fn flush_all_pages(&self) -> StorageResult<()> {
        let state = self.inner.state.lock();
        for (pid, page) in &state.cache {
            let guard = page.read();
            if guard.dirty().is_some() {
                self.table(pid.table)?.write_page(&guard)?;
            }
        }
        Ok(())
    }

    /// Writes every page dirtied by `tid` through to its heap file. Like
    /// `flush_all_pages`, leaves dirty markers and locks untouched.
    pub fn flush_pages(&self, tid: TransactionId) -> StorageResult<()> {
        let state = self.inner.state.lock();
        for pid in state.locks.pages_locked_by(tid) {
            if let Some(page) = state.cache.get(&pid) {
                let guard = page.read();
                if guard.dirty() == Some(tid) {
                    self.table(pid.table)?.write_page(&guard)?;
                }
            }
        }
        Ok(())
    }

    /// Force-removes a page and all of its lock state, bypassing the
    /// dirty-page protection. Reserved for recovery paths that rewrote
    /// the on-disk image out-of-band and must keep the cache from
    /// shadowing it.
    pub fn discard_page(&self, pid: PageId) {
        let mut state = self.inner.state.lock();
        state.cache.remove(&pid);
        state.order.remove(pid);
        state.locks.remove_page(pid);
        drop(state);
        self.inner.released.notify_all();
    }

    /// Inserts a tuple into the named table through its heap file. The
    /// heap file marks the mutated page dirty under its write latch.
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        table_id: TableId,
        tuple: &Tuple,
    ) -> StorageResult<TupleId> {
        let file = self.table(table_id)?;
        file.insert_tuple(self, tid, tuple)
    }

    /// Deletes the tuple from the page its record id names.
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple) -> StorageResult<()> {
        let rid = tuple.id().ok_or(StorageError::TupleNotAnchored)?;
        let file = self.table(rid.page.table)?;
        file.delete_tuple(self, tid, tuple)
    }

    /// Number of resident pages. Observability aid for tests and stats.
    pub fn resident_pages(&self) -> usize {
        self.inner.state.lock().cache.len()
    }

    /// Whether `pid` is currently resident.
    pub fn contains_page(&self, pid: PageId) -> bool {
        self.inner.state.lock().cache.contains_key(&pid)
    }
}
