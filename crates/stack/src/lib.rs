//! # Stack - transactional stack of immutable reference tables
//!
//! One logical key-value view over many append-only [`table`] files,
//! coordinated across processes through the filesystem alone.
//!
//! ## Architecture
//!
//! ```text
//! Writers                                 Readers
//!   |                                       |
//!   v                                       v
//! ┌───────────────────────────────────────────────┐
//! │                    STACK                      │
//! │                                               │
//! │ addition.rs → stage table → swap manifest     │
//! │                   |                           │
//! │                   |  (geometry degraded?)     │
//! │                   v           yes             │
//! │ compaction.rs → merge range → swap manifest   │
//! │                                               │
//! │ read.rs → tables newest → oldest              │
//! │             (first match wins)                │
//! └───────────────────────────────────────────────┘
//!              |                   ^
//!              v                   |
//!        tables.list  <--  reload.rs (diff & reopen)
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module          | Purpose                                            |
//! |-----------------|----------------------------------------------------|
//! | [`lib.rs`]      | `Stack` struct, open, accessors, names, stats      |
//! | [`manifest`]    | `tables.list` parsing and serialization            |
//! | [`lock`]        | scoped exclusive-create lock files                 |
//! | [`addition`]    | the write transaction (stage → validate → commit)  |
//! | [`reload`]      | re-align open readers with the on-disk manifest    |
//! | [`compaction`]  | geometric planner + locked range merge             |
//! | [`read`]        | ref / log point lookups with tombstone shadowing   |
//! | [`clean`]       | reap orphaned table files after a crash            |
//!
//! ## Concurrency
//!
//! All coordination is inter-process, through the filesystem. The
//! manifest `tables.list` *is* the stack; it is only ever replaced by an
//! atomic rename while `tables.list.lock` is held, so observers see
//! either the old or the new stack, never a torn one. Additions are
//! optimistic: a writer whose in-memory view is behind the manifest
//! fails with [`record::Error::Outdated`] and must reload. Compaction
//! additionally locks each table it merges; auto-compaction narrows its
//! range around tables someone else holds instead of failing. Readers
//! need no locks at all: obsolete tables are unlinked only after they
//! left the manifest, and an open handle survives unlink on POSIX.

mod addition;
mod clean;
mod compaction;
mod lock;
mod manifest;
mod read;
mod reload;

pub use addition::Addition;
pub use compaction::{suggest_compaction_segment, Segment, DEFAULT_GEOMETRIC_FACTOR};

use record::{Result, WriteOptions};
use std::path::{Path, PathBuf};
use table::{TableReader, TableWriter};
use tracing::debug;

/// Name of the manifest file within the stack directory.
pub const MANIFEST_NAME: &str = "tables.list";

/// Suffix carried by every table file.
pub const TABLE_SUFFIX: &str = ".ref";

/// Counters describing compaction activity on one stack handle.
///
/// `failures` also counts auto-compaction errors that were deliberately
/// not surfaced to the writer that triggered them.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompactionStats {
    /// Compactions that started executing (a planner miss is not an
    /// attempt).
    pub attempts: u64,
    /// Attempts that failed, including swallowed auto-compaction
    /// failures.
    pub failures: u64,
    /// Records written by compaction output tables.
    pub entries_written: u64,
    /// Bytes written by compaction output tables.
    pub bytes: u64,
}

/// A stack of immutable reference tables backed by one directory.
///
/// # Write path
///
/// 1. Acquire the manifest lock, verify the in-memory view is current.
/// 2. Stage a new table under a temporary name; validate its update
///    indices against the stack's monotonic counter.
/// 3. Commit by rewriting `tables.list` via atomic rename.
/// 4. Reload, then opportunistically compact.
///
/// # Read path
///
/// Tables are consulted newest to oldest; the first table containing the
/// key wins, and tombstones shadow older values.
pub struct Stack {
    pub(crate) dir: PathBuf,
    pub(crate) list_path: PathBuf,
    pub(crate) opts: WriteOptions,
    /// One open reader per manifest line, oldest first.
    pub(crate) readers: Vec<TableReader>,
    pub(crate) stats: CompactionStats,
}

impl std::fmt::Debug for Stack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stack")
            .field("dir", &self.dir)
            .field("tables", &self.readers.len())
            .field("next_update_index", &self.next_update_index())
            .field("stats", &self.stats)
            .finish()
    }
}

impl Stack {
    /// Opens (creating if necessary) the stack at `dir` and loads a
    /// reader for every table in its manifest.
    ///
    /// # Errors
    ///
    /// `FormatError` if an existing table disagrees with
    /// `opts.hash_id`; I/O errors from the directory or table files.
    pub fn open<P: AsRef<Path>>(dir: P, opts: WriteOptions) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let list_path = dir.join(MANIFEST_NAME);

        let mut stack = Self {
            dir,
            list_path,
            opts,
            readers: Vec::new(),
            stats: CompactionStats::default(),
        };
        stack.reload()?;
        debug!(dir = %stack.dir.display(), tables = stack.readers.len(), "opened stack");
        Ok(stack)
    }

    /// The directory backing this stack.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of tables in the current view.
    #[must_use]
    pub fn table_count(&self) -> usize {
        self.readers.len()
    }

    /// Basenames of the current tables, oldest first.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.readers.iter().map(|r| r.name())
    }

    /// One past the largest update index across all tables; `1` for an
    /// empty stack. Every record in the next addition must be stamped at
    /// or above this value.
    #[must_use]
    pub fn next_update_index(&self) -> u64 {
        self.readers
            .iter()
            .map(|r| r.max_update_index())
            .max()
            .map_or(1, |max| max + 1)
    }

    /// Compaction telemetry for this handle.
    #[must_use]
    pub fn compaction_stats(&self) -> &CompactionStats {
        &self.stats
    }

    /// Toggles the best-effort compaction that follows each addition.
    pub fn set_disable_auto_compact(&mut self, disable: bool) {
        self.opts.disable_auto_compact = disable;
    }

    /// Opens a write transaction. At most one addition may exist per
    /// stack handle; a concurrent process holding the manifest lock
    /// yields [`record::Error::Lock`], a stale in-memory view yields
    /// [`record::Error::Outdated`].
    pub fn new_addition(&mut self) -> Result<Addition<'_>> {
        Addition::new(self)
    }

    /// One-shot addition: stages a table through `write`, commits, and
    /// runs auto-compaction. Equivalent to
    /// `new_addition()? → add(write)? → commit()`.
    pub fn add<F>(&mut self, write: F) -> Result<()>
    where
        F: FnOnce(&mut TableWriter) -> Result<()>,
    {
        let mut addition = self.new_addition()?;
        addition.add(write)?;
        addition.commit()
    }

    pub(crate) fn table_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub(crate) fn reader_names(&self) -> Vec<String> {
        self.readers.iter().map(|r| r.name().to_string()).collect()
    }

    /// Whether the in-memory readers mirror the given manifest body.
    pub(crate) fn reflects(&self, names: &[String]) -> bool {
        self.readers.len() == names.len()
            && self
                .readers
                .iter()
                .zip(names)
                .all(|(reader, name)| reader.name() == name)
    }
}

/// Builds a table basename embedding its update-index interval plus a
/// random suffix for uniqueness.
pub(crate) fn format_table_name(min: u64, max: u64) -> String {
    format!(
        "{min:016x}-{max:016x}-{:08x}{TABLE_SUFFIX}",
        rand::random::<u32>()
    )
}

/// Whether `name` has the shape produced by [`format_table_name`].
pub(crate) fn is_table_name(name: &str) -> bool {
    let Some(stem) = name.strip_suffix(TABLE_SUFFIX) else {
        return false;
    };
    let mut parts = stem.split('-');
    let (Some(min), Some(max), Some(suffix), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    min.len() == 16
        && max.len() == 16
        && suffix.len() == 8
        && [min, max, suffix]
            .iter()
            .all(|p| p.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Applies the configured default file mode, if any. The umask has
/// already shaped the creation mode; this chmod enforces the final bits.
pub(crate) fn apply_mode(path: &Path, mode: Option<u32>) -> Result<()> {
    #[cfg(unix)]
    if let Some(mode) = mode {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
    }
    Ok(())
}

#[cfg(test)]
mod tests;
