//! Recency-of-access order over resident pages.
//!
//! An arena-backed doubly-linked list plus a hash index from page id to
//! node, so touch and removal are O(1) and eviction scans from the
//! least-recently-touched end.

use crate::storage::page::PageId;
use std::collections::HashMap;

#[derive(Debug)]
struct Node {
    pid: PageId,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Debug, Default)]
pub struct AccessOrder {
    nodes: Vec<Node>,
    free: Vec<usize>,
    index: HashMap<PageId, usize>,
    /// Least recently touched.
    head: Option<usize>,
    /// Most recently touched.
    tail: Option<usize>,
}

impl AccessOrder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Marks `pid` most recently touched, inserting it if absent.
    pub fn touch(&mut self, pid: PageId) {
        if let Some(&idx) = self.index.get(&pid) {
            if self.tail == Some(idx) {
                return;
            }
            self.unlink(idx);
            self.push_tail(idx);
        } else {
            let idx = self.alloc(pid);
            self.index.insert(pid, idx);
            self.push_tail(idx);
        }
    }

    /// Drops `pid` from the order. Returns false if it was not tracked.
    pub fn remove(&mut self, pid: PageId) -> bool {
        match self.index.remove(&pid) {
            Some(idx) => {
                self.unlink(idx);
                self.free.push(idx);
                true
            }
            None => false,
        }
    }

    /// Pages in ascending recency order: least recently touched first.
    pub fn iter(&self) -> impl Iterator<Item = PageId> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let idx = cursor?;
            cursor = self.nodes[idx].next;
            Some(self.nodes[idx].pid)
        })
    }

    fn alloc(&mut self, pid: PageId) -> usize {
        match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = Node {
                    pid,
                    prev: None,
                    next: None,
                };
                idx
            }
            None => {
                self.nodes.push(Node {
                    pid,
                    prev: None,
                    next: None,
                });
                self.nodes.len() - 1
            }
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = (self.nodes[idx].prev, self.nodes[idx].next);
        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }
        self.nodes[idx].prev = None;
        self.nodes[idx].next = None;
    }

    fn push_tail(&mut self, idx: usize) {
        self.nodes[idx].prev = self.tail;
        self.nodes[idx].next = None;
        match self.tail {
            Some(t) => self.nodes[t].next = Some(idx),
            None => self.head = Some(idx),
        }
        self.tail = Some(idx);
    }
}
