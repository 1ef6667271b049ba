//! Compaction: merge a contiguous range of tables into one replacement.
//!
//! The planner keeps the stack geometric (each table at least `factor`
//! times larger than everything newer than it), which bounds the table
//! count at `O(log N)` in the records written while bounding rewrite
//! work. The executor locks the chosen tables, streams their merged
//! contents into a staged table, swaps the manifest, and deletes the
//! originals. Auto-compaction narrows its range around tables locked by
//! someone else instead of failing the triggering write.

use record::{Error, LogExpiry, LogValue, Result};
use table::{MergedView, TableWriter};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::lock::Lockfile;
use crate::{apply_mode, format_table_name, manifest, Stack};

/// Planner factor: a table must be at least this many times larger than
/// the sum of all newer tables for the stack to count as geometric.
pub const DEFAULT_GEOMETRIC_FACTOR: u64 = 2;

/// A half-open range `[start, end)` of stack positions, oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Segment {
    pub start: usize,
    pub end: usize,
}

impl Segment {
    #[must_use]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// Suggests the largest contiguous range of tables whose merge restores
/// the geometric sequence, or an empty segment if the stack already is
/// one. A `factor` of 0 means [`DEFAULT_GEOMETRIC_FACTOR`].
///
/// The segment end is found by scanning from the newest table towards
/// the oldest for the last position whose predecessor is smaller than
/// `factor` times itself; the start is then pushed towards the oldest
/// table for as long as the preceding table is smaller than `factor`
/// times the accumulated merge.
pub fn suggest_compaction_segment(sizes: &[u64], factor: u64) -> Segment {
    let factor = if factor == 0 {
        DEFAULT_GEOMETRIC_FACTOR
    } else {
        factor
    };

    let mut seg = Segment::default();
    if sizes.len() <= 1 {
        return seg;
    }

    let mut bytes = 0u64;
    for i in (1..sizes.len()).rev() {
        if sizes[i - 1] < sizes[i].saturating_mul(factor) {
            seg.end = i + 1;
            bytes = sizes[i];
            break;
        }
    }
    if seg.end == 0 {
        return seg;
    }

    for i in (1..seg.end).rev() {
        let curr = bytes;
        bytes = bytes.saturating_add(sizes[i - 1]);
        if sizes[i - 1] < curr.saturating_mul(factor) {
            seg.start = i - 1;
        }
    }
    seg
}

impl Stack {
    /// Merges the entire stack into a single table, dropping ref
    /// tombstones and (per `expiry`) aged-out log entries.
    ///
    /// # Errors
    ///
    /// `LockError` if any table in the stack is locked by another
    /// process; the stack is left unchanged and `stats.failures` grows.
    pub fn compact_all(&mut self, expiry: Option<LogExpiry>) -> Result<()> {
        if self.readers.is_empty() {
            return Ok(());
        }
        self.compact_range_stats(0, self.readers.len() - 1, expiry, false)
    }

    /// Best-effort geometric compaction. Lock contention shrinks the
    /// merged range or, when fewer than two tables are free, skips the
    /// compaction entirely; it is reported through `stats.failures`,
    /// never as an error.
    pub fn auto_compact(&mut self) -> Result<()> {
        let sizes: Vec<u64> = self.readers.iter().map(|r| r.len() as u64).collect();
        let seg = suggest_compaction_segment(&sizes, DEFAULT_GEOMETRIC_FACTOR);
        if seg.is_empty() {
            return Ok(());
        }
        match self.compact_range_stats(seg.start, seg.end - 1, None, true) {
            Err(Error::Lock) => Ok(()),
            res => res,
        }
    }

    fn compact_range_stats(
        &mut self,
        first: usize,
        last: usize,
        expiry: Option<LogExpiry>,
        best_effort: bool,
    ) -> Result<()> {
        let res = self.compact_range(first, last, expiry, best_effort);
        if matches!(res, Err(Error::Lock)) {
            self.stats.failures += 1;
        }
        res
    }

    /// Merges tables `[first, last]` (inclusive stack positions).
    fn compact_range(
        &mut self,
        mut first: usize,
        mut last: usize,
        expiry: Option<LogExpiry>,
        best_effort: bool,
    ) -> Result<()> {
        self.stats.attempts += 1;

        let mut list_lock = Lockfile::acquire(&self.list_path)?;

        // another process may have advanced the stack before we locked;
        // swapping the manifest from a stale view would lose its commit
        let on_disk = manifest::read_names(&self.list_path)?;
        if !self.reflects(&on_disk) {
            return Err(Error::Outdated);
        }

        // lock every table in the range, oldest first
        let mut locks: Vec<Option<Lockfile>> = Vec::with_capacity(last - first + 1);
        for i in first..=last {
            match Lockfile::acquire(&self.table_path(self.readers[i].name())) {
                Ok(lock) => locks.push(Some(lock)),
                Err(Error::Lock) if best_effort => locks.push(None),
                Err(err) => return Err(err),
            }
        }
        if best_effort {
            let (run_start, run_len) = longest_locked_run(&locks);
            if run_len < 2 {
                // nothing worth merging is free
                return Err(Error::Lock);
            }
            for (i, slot) in locks.iter_mut().enumerate() {
                if i < run_start || i >= run_start + run_len {
                    *slot = None; // release locks outside the kept run
                }
            }
            last = first + run_start + run_len - 1;
            first += run_start;
        }

        let names = self.reader_names();
        let min = self.readers[first].min_update_index();
        let max = self.readers[last].max_update_index();
        debug!(first, last, "compacting tables");

        let staged = NamedTempFile::new_in(&self.dir)?;
        let finished = {
            let segment = &self.readers[first..=last];
            let mut writer = TableWriter::new(staged.reopen()?, &self.opts);
            writer.set_limits(min, max)?;

            let merged = MergedView::new(segment);

            // with the oldest table in the merge there is nothing left
            // for tombstones to shadow
            let drop_tombstones = first == 0;

            let mut refs = merged.refs();
            while let Some(rec) = refs.next_entry()? {
                if drop_tombstones && rec.is_deletion() {
                    continue;
                }
                writer.add_ref(rec)?;
            }

            let mut logs = merged.logs();
            while let Some(rec) = logs.next_entry()? {
                if drop_tombstones && rec.is_deletion() {
                    continue;
                }
                if let Some(expiry) = expiry {
                    if expiry.min_update_index > 0 && rec.update_index < expiry.min_update_index
                    {
                        continue;
                    }
                    if expiry.time > 0 {
                        if let LogValue::Update { time, .. } = &rec.value {
                            if *time < expiry.time {
                                continue;
                            }
                        }
                    }
                }
                writer.add_log(rec)?;
            }

            writer.finish()
        };

        let replacement = match finished {
            Ok(stats) => {
                self.stats.entries_written += stats.records;
                self.stats.bytes += stats.bytes;
                let name = format_table_name(min, max);
                let path = self.table_path(&name);
                apply_mode(staged.path(), self.opts.default_permissions)?;
                staged.persist(&path).map_err(|err| Error::Io(err.error))?;
                Some(name)
            }
            // everything merged away; the range is replaced by nothing
            Err(Error::EmptyTable) => None,
            Err(err) => return Err(err),
        };

        let mut new_names: Vec<String> = names[..first].to_vec();
        if let Some(name) = &replacement {
            new_names.push(name.clone());
        }
        new_names.extend_from_slice(&names[last + 1..]);

        list_lock.write_body(&manifest::format_body(&new_names))?;
        list_lock.commit(&self.list_path, self.opts.default_permissions)?;

        // the merged tables left the manifest; concurrent readers stay
        // valid through their open handles
        for name in &names[first..=last] {
            let _ = std::fs::remove_file(self.table_path(name));
        }
        drop(locks);

        self.reload()?;
        debug!(tables = self.readers.len(), "compaction finished");
        Ok(())
    }
}

/// Longest contiguous run of acquired locks; ties go to the newer run.
fn longest_locked_run(locks: &[Option<Lockfile>]) -> (usize, usize) {
    let mut best = (0, 0);
    let mut run_start = 0;
    let mut run_len = 0;
    for (i, slot) in locks.iter().enumerate() {
        if slot.is_some() {
            if run_len == 0 {
                run_start = i;
            }
            run_len += 1;
            if run_len >= best.1 {
                best = (run_start, run_len);
            }
        } else {
            run_len = 0;
        }
    }
    best
}
