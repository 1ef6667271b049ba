//! Merged view over multiple [`TableReader`]s.
//!
//! Produces one sorted stream per record kind. When the same key appears
//! in several tables, only the entry from the **newest** table (highest
//! position in the stack) is emitted; stack order is the authority on
//! recency. Tombstones are emitted like any other record; whether they
//! survive is the compactor's decision.

use record::{LogRecord, RefRecord, Result};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::TableReader;

/// A pending key from one source table, used for heap-based merge
/// ordering. Only the key and source index are stored; the record
/// itself is read lazily when the key reaches the top of the heap.
struct HeapEntry<K: Ord> {
    key: K,
    /// Index into the `readers` array; higher means newer.
    source: usize,
}

impl<K: Ord> PartialEq for HeapEntry<K> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.source == other.source
    }
}

impl<K: Ord> Eq for HeapEntry<K> {}

impl<K: Ord> PartialOrd for HeapEntry<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: Ord> Ord for HeapEntry<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; we want the smallest key first, so
        // reverse the key comparison. On tie, pop the newer source
        // first (deterministic, and the winner under dedup anyway).
        other
            .key
            .cmp(&self.key)
            .then_with(|| self.source.cmp(&other.source))
    }
}

/// Fans N table readers into one ordered sequence per record kind.
pub struct MergedView<'a> {
    readers: &'a [TableReader],
}

impl<'a> MergedView<'a> {
    pub fn new(readers: &'a [TableReader]) -> Self {
        Self { readers }
    }

    /// Sorted stream of ref records, ascending by refname.
    pub fn refs(&self) -> MergedRefs<'a> {
        MergedRefs::new(self.readers)
    }

    /// Sorted stream of log records, (refname asc, update_index desc).
    pub fn logs(&self) -> MergedLogs<'a> {
        MergedLogs::new(self.readers)
    }
}

/// Merge cursor over the ref records of several tables.
pub struct MergedRefs<'a> {
    readers: &'a [TableReader],
    key_iters: Vec<std::vec::IntoIter<String>>,
    heap: BinaryHeap<HeapEntry<String>>,
}

impl<'a> MergedRefs<'a> {
    fn new(readers: &'a [TableReader]) -> Self {
        let mut key_iters = Vec::with_capacity(readers.len());
        let mut heap = BinaryHeap::new();
        for (i, reader) in readers.iter().enumerate() {
            let keys: Vec<String> = reader.ref_names().map(str::to_string).collect();
            let mut iter = keys.into_iter();
            if let Some(key) = iter.next() {
                heap.push(HeapEntry { key, source: i });
            }
            key_iters.push(iter);
        }
        Self {
            readers,
            key_iters,
            heap,
        }
    }

    fn advance(&mut self, source: usize) {
        if let Some(key) = self.key_iters[source].next() {
            self.heap.push(HeapEntry { key, source });
        }
    }

    /// Returns the next ref record in refname order, or `None` when all
    /// sources are exhausted. Duplicate refnames resolve to the newest
    /// source.
    pub fn next_entry(&mut self) -> Result<Option<RefRecord>> {
        loop {
            let top = match self.heap.pop() {
                Some(e) => e,
                None => return Ok(None),
            };
            self.advance(top.source);

            let key = top.key;
            let mut best_source = top.source;
            while let Some(peek) = self.heap.peek() {
                if peek.key != key {
                    break;
                }
                let dup = self.heap.pop().unwrap();
                best_source = best_source.max(dup.source);
                self.advance(dup.source);
            }

            match self.readers[best_source].ref_record(&key)? {
                Some(rec) => return Ok(Some(rec)),
                None => continue, // shouldn't happen, but skip
            }
        }
    }

    /// Collects all remaining records. Useful for tests.
    pub fn collect_all(&mut self) -> Result<Vec<RefRecord>> {
        let mut result = Vec::new();
        while let Some(rec) = self.next_entry()? {
            result.push(rec);
        }
        Ok(result)
    }
}

/// Merge cursor over the log records of several tables.
pub struct MergedLogs<'a> {
    readers: &'a [TableReader],
    key_iters: Vec<std::vec::IntoIter<(String, Reverse<u64>)>>,
    heap: BinaryHeap<HeapEntry<(String, Reverse<u64>)>>,
}

impl<'a> MergedLogs<'a> {
    fn new(readers: &'a [TableReader]) -> Self {
        let mut key_iters = Vec::with_capacity(readers.len());
        let mut heap = BinaryHeap::new();
        for (i, reader) in readers.iter().enumerate() {
            // readers yield (name asc, index asc); flip to the on-disk
            // (name asc, index desc) order
            let mut keys: Vec<(String, Reverse<u64>)> = reader
                .log_keys()
                .map(|(name, idx)| (name.to_string(), Reverse(idx)))
                .collect();
            keys.sort();
            let mut iter = keys.into_iter();
            if let Some(key) = iter.next() {
                heap.push(HeapEntry { key, source: i });
            }
            key_iters.push(iter);
        }
        Self {
            readers,
            key_iters,
            heap,
        }
    }

    fn advance(&mut self, source: usize) {
        if let Some(key) = self.key_iters[source].next() {
            self.heap.push(HeapEntry { key, source });
        }
    }

    /// Returns the next log record, or `None` when all sources are
    /// exhausted. Duplicate `(refname, update_index)` keys resolve to
    /// the newest source.
    pub fn next_entry(&mut self) -> Result<Option<LogRecord>> {
        loop {
            let top = match self.heap.pop() {
                Some(e) => e,
                None => return Ok(None),
            };
            self.advance(top.source);

            let key = top.key;
            let mut best_source = top.source;
            while let Some(peek) = self.heap.peek() {
                if peek.key != key {
                    break;
                }
                let dup = self.heap.pop().unwrap();
                best_source = best_source.max(dup.source);
                self.advance(dup.source);
            }

            let (name, Reverse(idx)) = &key;
            match self.readers[best_source].log_record(name, *idx)? {
                Some(rec) => return Ok(Some(rec)),
                None => continue,
            }
        }
    }

    /// Collects all remaining records. Useful for tests.
    pub fn collect_all(&mut self) -> Result<Vec<LogRecord>> {
        let mut result = Vec::new();
        while let Some(rec) = self.next_entry()? {
            result.push(rec);
        }
        Ok(result)
    }
}
