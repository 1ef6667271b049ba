//! # Manifest - the `tables.list` file
//!
//! A newline-delimited list of table basenames, oldest first. The
//! manifest *is* the stack: a table file not listed here is not part of
//! the logical state, whatever else sits in the directory.
//!
//! Reading tolerates blank lines (including the trailing one a final
//! `\n` produces). Writing goes through the manifest lock: the new body
//! is written into `tables.list.lock`, fsynced, chmodded, and renamed
//! over `tables.list` (see [`crate::lock::Lockfile`]). The rename is
//! what makes manifest swaps atomic and totally ordered.
//!
//! A text format keeps the stack debuggable: operators can inspect and,
//! with the stack quiesced, repair the manifest with any editor.

use record::Result;
use std::io::ErrorKind;
use std::path::Path;

/// Reads the manifest, yielding basenames oldest first. A missing file
/// is an empty stack, not an error.
pub(crate) fn read_names(path: &Path) -> Result<Vec<String>> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };
    Ok(data
        .split('\n')
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Serializes a manifest body, one basename per line with a trailing
/// newline.
pub(crate) fn format_body(names: &[String]) -> Vec<u8> {
    let mut body = String::with_capacity(names.iter().map(|n| n.len() + 1).sum());
    for name in names {
        body.push_str(name);
        body.push('\n');
    }
    body.into_bytes()
}
