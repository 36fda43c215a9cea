//! Page-level lock table and wait-for graph.
//!
//! `LockTable` is a plain data structure with no synchronization of its
//! own: it lives inside the buffer pool's single critical section, and all
//! of its operations are non-blocking single attempts. Blocking and
//! wake-up happen in the pool's condvar loop.

use crate::storage::page::PageId;
use crate::transaction::TransactionId;
use std::collections::{HashMap, HashSet, VecDeque};

/// Permission a transaction requests on a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Read,
    Write,
}

/// Outcome of a single non-blocking acquisition attempt.
///
/// `Granted` carries the exact state change that was made so a caller
/// whose surrounding operation fails can restore the table to its
/// pre-attempt state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Grant {
    Granted(GrantUndo),
    /// The transaction already held a sufficient lock; nothing changed.
    AlreadyHeld,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GrantUndo {
    AddedReader,
    InstalledWriter,
    /// Solo-reader upgrade: the reader entry was swapped for the writer
    /// slot.
    Upgraded,
}

/// Per-page reader set and writer slot.
///
/// Invariant: a page is either free, shared by N readers, or exclusively
/// held by one writer. The only sanctioned crossover is the solo reader
/// upgrading itself to writer.
#[derive(Debug, Default)]
pub(crate) struct LockTable {
    readers: HashMap<PageId, HashSet<TransactionId>>,
    writer: HashMap<PageId, TransactionId>,
}

impl LockTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Single non-blocking attempt to acquire `perm` on `pid` for `tid`.
    pub(crate) fn try_acquire(
        &mut self,
        tid: TransactionId,
        pid: PageId,
        perm: Permission,
    ) -> Grant {
        match perm {
            Permission::Read => {
                if let Some(writer) = self.writer.get(&pid) {
                    if *writer != tid {
                        return Grant::Denied;
                    }
                }
                let readers = self.readers.entry(pid).or_default();
                if readers.insert(tid) {
                    Grant::Granted(GrantUndo::AddedReader)
                } else {
                    Grant::AlreadyHeld
                }
            }
            Permission::Write => {
                if let Some(writer) = self.writer.get(&pid) {
                    return if *writer == tid {
                        Grant::AlreadyHeld
                    } else {
                        Grant::Denied
                    };
                }
                let readers = self.readers.get(&pid).map(|r| r.len()).unwrap_or(0);
                match readers {
                    0 => {
                        self.writer.insert(pid, tid);
                        Grant::Granted(GrantUndo::InstalledWriter)
                    }
                    1 if self.holds_read(tid, pid) => {
                        // lock upgrade: sole reader becomes the writer
                        if let Some(readers) = self.readers.get_mut(&pid) {
                            readers.remove(&tid);
                        }
                        self.writer.insert(pid, tid);
                        Grant::Granted(GrantUndo::Upgraded)
                    }
                    _ => Grant::Denied,
                }
            }
        }
    }

    /// Reverts the state change recorded by a successful `try_acquire`.
    pub(crate) fn undo(&mut self, tid: TransactionId, pid: PageId, undo: GrantUndo) {
        match undo {
            GrantUndo::AddedReader => {
                if let Some(readers) = self.readers.get_mut(&pid) {
                    readers.remove(&tid);
                    if readers.is_empty() {
                        self.readers.remove(&pid);
                    }
                }
            }
            GrantUndo::InstalledWriter => {
                self.writer.remove(&pid);
            }
            GrantUndo::Upgraded => {
                self.writer.remove(&pid);
                self.readers.entry(pid).or_default().insert(tid);
            }
        }
    }

    /// Drops whatever lock `tid` holds on `pid`. Idempotent; callable even
    /// when no lock is held. Returns true if anything was released.
    pub(crate) fn release(&mut self, tid: TransactionId, pid: PageId) -> bool {
        let mut released = false;
        if let Some(readers) = self.readers.get_mut(&pid) {
            released |= readers.remove(&tid);
            if readers.is_empty() {
                self.readers.remove(&pid);
            }
        }
        if self.writer.get(&pid) == Some(&tid) {
            self.writer.remove(&pid);
            released = true;
        }
        released
    }

    fn holds_read(&self, tid: TransactionId, pid: PageId) -> bool {
        self.readers
            .get(&pid)
            .map(|r| r.contains(&tid))
            .unwrap_or(false)
    }

    /// True iff some transaction holds the write lock on `pid`.
    pub(crate) fn write_locked(&self, pid: PageId) -> bool {
        self.writer.contains_key(&pid)
    }

    /// True iff `tid` is a reader or the writer of `pid`.
    pub(crate) fn holds(&self, tid: TransactionId, pid: PageId) -> bool {
        self.holds_read(tid, pid) || self.writer.get(&pid) == Some(&tid)
    }

    /// Every page on which `tid` holds any lock.
    pub(crate) fn pages_locked_by(&self, tid: TransactionId) -> Vec<PageId> {
        let mut pages: HashSet<PageId> = self
            .readers
            .iter()
            .filter(|(_, readers)| readers.contains(&tid))
            .map(|(pid, _)| *pid)
            .collect();
        pages.extend(
            self.writer
                .iter()
                .filter(|(_, writer)| **writer == tid)
                .map(|(pid, _)| *pid),
        );
        pages.into_iter().collect()
    }

    /// Transactions currently holding any lock on `pid`.
    pub(crate) fn holders(&self, pid: PageId) -> Vec<TransactionId> {
        let mut holders: Vec<TransactionId> = self
            .readers
            .get(&pid)
            .map(|r| r.iter().copied().collect())
            .unwrap_or_default();
        if let Some(writer) = self.writer.get(&pid) {
            if !holders.contains(writer) {
                holders.push(*writer);
            }
        }
        holders
    }

    /// Forgets all lock state for `pid`. Used by `discard_page`.
    pub(crate) fn remove_page(&mut self, pid: PageId) {
        self.readers.remove(&pid);
        self.writer.remove(&pid);
    }
}

/// Wait-for graph over transactions, consulted before a requester is put
/// to sleep so a cycle can be refused up front.
#[derive(Debug, Default)]
pub(crate) struct WaitGraph {
    wait_for: HashMap<TransactionId, HashSet<TransactionId>>,
}

impl WaitGraph {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Records that `waiter` is blocked on exactly `holders`, replacing
    /// any previous edges for `waiter`.
    pub(crate) fn set_waits(&mut self, waiter: TransactionId, holders: &[TransactionId]) {
        if holders.is_empty() {
            self.wait_for.remove(&waiter);
        } else {
            self.wait_for
                .insert(waiter, holders.iter().copied().collect());
        }
    }

    pub(crate) fn remove(&mut self, tid: TransactionId) {
        self.wait_for.remove(&tid);
        for holders in self.wait_for.values_mut() {
            holders.remove(&tid);
        }
    }

    /// Would `waiter -> holder` close a cycle? BFS from `holder` looking
    /// for a path back to `waiter`.
    pub(crate) fn would_cycle(&self, waiter: TransactionId, holder: TransactionId) -> bool {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(holder);

        while let Some(current) = queue.pop_front() {
            if current == waiter {
                return true;
            }
            if visited.insert(current) {
                if let Some(next) = self.wait_for.get(&current) {
                    queue.extend(next.iter().copied());
                }
            }
        }
        false
    }
}
