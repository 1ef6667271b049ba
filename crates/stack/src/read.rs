//! Read path: ref and log point lookups.
//!
//! Tables are consulted newest to oldest and the first table containing
//! the key wins; a tombstone in a newer table therefore hides every
//! older value, and is reported as absence.

use record::{LogRecord, RefRecord, Result};

use crate::Stack;

impl Stack {
    /// The live value bound to `refname`, or `None` if the name is
    /// unbound (including when its newest record is a tombstone).
    pub fn read_ref(&self, refname: &str) -> Result<Option<RefRecord>> {
        for reader in self.readers.iter().rev() {
            if let Some(rec) = reader.ref_record(refname)? {
                return Ok(if rec.is_deletion() { None } else { Some(rec) });
            }
        }
        Ok(None)
    }

    /// The most recent log entry for `refname`, or `None` if the ref
    /// has no log (or its newest entry is a deletion).
    ///
    /// Update indices grow monotonically across additions, so the
    /// newest table holding any entry for `refname` also holds its
    /// highest-indexed entry.
    pub fn read_log(&self, refname: &str) -> Result<Option<LogRecord>> {
        for reader in self.readers.iter().rev() {
            if let Some(rec) = reader.latest_log(refname)? {
                return Ok(if rec.is_deletion() { None } else { Some(rec) });
            }
        }
        Ok(None)
    }
}
