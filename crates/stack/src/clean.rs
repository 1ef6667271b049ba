//! Reaping debris left behind by crashed writers and compactors.

use record::Result;
use std::collections::HashSet;
use std::io::ErrorKind;
use tracing::debug;

use crate::{is_table_name, Stack};

impl Stack {
    /// Deletes table files that are not referenced by the current
    /// manifest and not locked by anyone. Intended to run once after
    /// startup to reclaim tables orphaned by an unclean shutdown.
    ///
    /// A lock file next to an orphan means some process may still be
    /// turning that table into a manifest entry, so it is left alone.
    /// Lock files themselves are never removed here; breaking a stale
    /// lock is the operator's call.
    pub fn clean(&mut self) -> Result<()> {
        self.reload()?;
        let live: HashSet<&str> = self.readers.iter().map(|r| r.name()).collect();

        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(_) => continue,
            };
            if !is_table_name(&name) || live.contains(name.as_str()) {
                continue;
            }
            if self.dir.join(format!("{name}.lock")).exists() {
                continue;
            }
            debug!(table = %name, "removing orphaned table");
            match std::fs::remove_file(entry.path()) {
                Ok(()) => {}
                // someone else cleaned it first
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }
}
