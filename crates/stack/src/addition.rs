//! The write transaction.
//!
//! An [`Addition`] holds the manifest lock from creation to commit, so
//! at most one writer mutates the stack at a time. Tables are staged
//! under temporary names and only enter the manifest on commit; dropping
//! an uncommitted addition deletes its staged tables and releases the
//! lock, leaving no trace.

use record::{Error, Result};
use table::TableWriter;
use tempfile::NamedTempFile;
use tracing::warn;

use crate::lock::Lockfile;
use crate::{apply_mode, format_table_name, manifest, Stack};

/// An open write transaction on a [`Stack`].
///
/// Created by [`Stack::new_addition`]; several tables can be staged with
/// [`add`](Addition::add) before one [`commit`](Addition::commit)
/// publishes them all in a single manifest swap.
pub struct Addition<'a> {
    stack: &'a mut Stack,
    lock: Option<Lockfile>,
    /// Final basenames of staged tables, in staging order.
    staged: Vec<String>,
    next_update_index: u64,
}

impl<'a> Addition<'a> {
    pub(crate) fn new(stack: &'a mut Stack) -> Result<Self> {
        let lock = Lockfile::acquire(&stack.list_path)?;

        // The manifest may have moved since this handle last reloaded;
        // committing on a stale view would drop someone else's tables.
        let on_disk = manifest::read_names(&stack.list_path)?;
        if !stack.reflects(&on_disk) {
            return Err(Error::Outdated);
        }

        let next_update_index = stack.next_update_index();
        Ok(Self {
            stack,
            lock: Some(lock),
            staged: Vec::new(),
            next_update_index,
        })
    }

    /// The smallest update index records staged next may carry.
    #[must_use]
    pub fn next_update_index(&self) -> u64 {
        self.next_update_index
    }

    /// Stages one table written by `write`. The callback sets the
    /// writer's limits and appends records; returning an error aborts
    /// the staged table and propagates the error verbatim.
    ///
    /// A callback that writes no records succeeds as a no-op: the
    /// staged file is discarded and the commit will leave the manifest
    /// unchanged.
    ///
    /// # Errors
    ///
    /// `ApiError` if the table's minimum update index falls below the
    /// transaction's [`next_update_index`](Addition::next_update_index)
    /// (which a previous `add` in this transaction may have raised).
    pub fn add<F>(&mut self, write: F) -> Result<()>
    where
        F: FnOnce(&mut TableWriter) -> Result<()>,
    {
        let staged = NamedTempFile::new_in(&self.stack.dir)?;
        let mut writer = TableWriter::new(staged.reopen()?, &self.stack.opts);
        write(&mut writer)?;

        let min = writer.min_update_index();
        let max = writer.max_update_index();
        match writer.finish() {
            Ok(_) => {}
            // an empty probe commits as a no-op
            Err(Error::EmptyTable) => return Ok(()),
            Err(err) => return Err(err),
        }

        if min < self.next_update_index {
            return Err(Error::Api(format!(
                "new table starts at update index {min}, the stack requires at least {}",
                self.next_update_index
            )));
        }

        let name = format_table_name(min, max);
        let path = self.stack.table_path(&name);
        apply_mode(staged.path(), self.stack.opts.default_permissions)?;
        staged.persist(&path).map_err(|err| Error::Io(err.error))?;

        self.staged.push(name);
        self.next_update_index = max + 1;
        Ok(())
    }

    /// Publishes all staged tables by rewriting the manifest, reloads,
    /// and (unless disabled) runs best-effort auto-compaction. With
    /// nothing staged this is a successful no-op.
    pub fn commit(mut self) -> Result<()> {
        if self.staged.is_empty() {
            return Ok(()); // drop releases the manifest lock
        }
        let Some(mut lock) = self.lock.take() else {
            return Err(Error::Api("addition already committed".into()));
        };

        let mut names = self.stack.reader_names();
        names.append(&mut self.staged);

        lock.write_body(&manifest::format_body(&names))?;
        lock.commit(&self.stack.list_path, self.stack.opts.default_permissions)?;

        self.stack.reload()?;

        if !self.stack.opts.disable_auto_compact {
            // an optimization, not part of the commit's durability:
            // failures are counted, never surfaced
            if let Err(err) = self.stack.auto_compact() {
                self.stack.stats.failures += 1;
                warn!("auto-compaction after commit failed: {err}");
            }
        }
        Ok(())
    }
}

impl Drop for Addition<'_> {
    fn drop(&mut self) {
        // staged tables are not in the manifest yet; committed ones
        // were drained out of `staged`
        for name in &self.staged {
            let _ = std::fs::remove_file(self.stack.table_path(name));
        }
    }
}
