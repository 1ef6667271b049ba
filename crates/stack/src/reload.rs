//! Re-aligning open readers with the on-disk manifest.

use record::{Error, Result};
use std::collections::HashMap;
use std::io::ErrorKind;
use table::TableReader;
use tracing::debug;

use crate::{manifest, Stack};

/// A table can be unlinked between reading the manifest and opening it
/// when another process compacts concurrently; the whole reload then
/// re-reads the manifest and tries again.
const MAX_RELOAD_TRIES: usize = 3;

impl Stack {
    /// Re-opens the stack to the current manifest.
    ///
    /// Readers whose table is still listed are moved into the new list,
    /// never reopened: they own the file handle that keeps an unlinked
    /// table readable. Readers whose table left the manifest are closed
    /// once the new list is in place.
    pub fn reload(&mut self) -> Result<()> {
        let mut pool: HashMap<String, TableReader> = self
            .readers
            .drain(..)
            .map(|reader| (reader.name().to_string(), reader))
            .collect();

        let mut tries = 0;
        loop {
            tries += 1;
            let names = match manifest::read_names(&self.list_path) {
                Ok(names) => names,
                Err(err) => {
                    self.readers = pool.into_values().collect();
                    return Err(err);
                }
            };

            let mut next: Vec<TableReader> = Vec::with_capacity(names.len());
            let mut vanished = false;

            for name in &names {
                if let Some(reader) = pool.remove(name) {
                    next.push(reader);
                    continue;
                }
                match TableReader::open(self.table_path(name), self.opts.hash_id) {
                    Ok(reader) => next.push(reader),
                    Err(Error::Io(err))
                        if err.kind() == ErrorKind::NotFound && tries < MAX_RELOAD_TRIES =>
                    {
                        debug!(table = %name, "table vanished during reload; retrying");
                        vanished = true;
                        break;
                    }
                    Err(err) => {
                        // keep what we have so the handle stays usable
                        next.extend(pool.into_values());
                        self.readers = next;
                        return Err(err);
                    }
                }
            }

            if vanished {
                for reader in next {
                    pool.insert(reader.name().to_string(), reader);
                }
                continue;
            }

            self.readers = next;
            // `pool` drops here, closing readers that left the manifest
            return Ok(());
        }
    }
}
