//! # Record - shared record model
//!
//! The building blocks every other crate works in terms of: ref and log
//! records (tagged unions mirroring the on-disk value types), the hash id
//! of the object-name digest, write options, log-expiry configuration,
//! and the public error taxonomy.
//!
//! A record's *key* differs by kind: ref records are keyed by refname
//! alone (a newer table shadows older ones wholesale), while log records
//! are keyed by `(refname, update_index)`; the update index is part of
//! the key, so one refname accumulates a history of entries.

use thiserror::Error;

/// Errors surfaced by the stack and table layers.
#[derive(Debug, Error)]
pub enum Error {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The on-disk manifest moved past the in-memory view. The caller
    /// should reload and retry.
    #[error("stack is outdated; reload and retry")]
    Outdated,

    /// A lock file is held by another process.
    #[error("lock is held by another process")]
    Lock,

    /// Contract violation by the caller (non-monotonic update index,
    /// malformed log message, records before `set_limits`, ...).
    #[error("api misuse: {0}")]
    Api(String),

    /// The file is not a valid table, or its hash id does not match.
    #[error("format error: {0}")]
    Format(String),

    /// A finished writer received no records.
    #[error("table contains no records")]
    EmptyTable,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Identifies the object-name digest used throughout a stack. Tables
/// written with one hash id cannot be opened under another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashId {
    #[default]
    Sha1,
    Sha256,
}

impl HashId {
    /// The 4-byte format id stamped into every table footer.
    pub fn format_id(self) -> u32 {
        match self {
            HashId::Sha1 => 0x7368_6131,   // "sha1"
            HashId::Sha256 => 0x7332_3536, // "s256"
        }
    }

    pub fn from_format_id(id: u32) -> Option<Self> {
        match id {
            0x7368_6131 => Some(HashId::Sha1),
            0x7332_3536 => Some(HashId::Sha256),
            _ => None,
        }
    }

    /// Raw digest width in bytes.
    pub fn raw_size(self) -> usize {
        match self {
            HashId::Sha1 => 20,
            HashId::Sha256 => 32,
        }
    }
}

/// Options governing every file a stack writes.
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// POSIX mode applied (post-umask, via an explicit chmod) to every
    /// table and manifest the stack produces. `None` leaves the
    /// process-default creation mode in place.
    pub default_permissions: Option<u32>,
    /// Digest identifying object names; must match the existing stack.
    pub hash_id: HashId,
    /// Suppress the best-effort compaction that normally follows a
    /// successful addition.
    pub disable_auto_compact: bool,
    /// Store log messages byte-for-byte instead of normalizing them.
    pub exact_log_message: bool,
}

/// Lower bounds below which log entries are dropped during compaction.
/// A zero field is inactive.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogExpiry {
    /// Wall-clock lower bound; update entries strictly older are dropped.
    pub time: u64,
    /// Update-index lower bound; entries strictly below are dropped.
    pub min_update_index: u64,
}

/// The value carried by a ref record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefValue {
    /// Tombstone: shadows the same refname in older tables.
    Deletion,
    /// A direct object name.
    Val1(Vec<u8>),
    /// An object name plus the peeled target it points at.
    Val2 {
        value: Vec<u8>,
        target_value: Vec<u8>,
    },
    /// A symbolic ref naming another ref.
    Symref(String),
}

/// One name→value binding at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefRecord {
    pub refname: String,
    pub update_index: u64,
    pub value: RefValue,
}

impl RefRecord {
    pub fn is_deletion(&self) -> bool {
        matches!(self.value, RefValue::Deletion)
    }
}

/// The value carried by a log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogValue {
    /// Tombstone: shadows the same `(refname, update_index)` key in
    /// older tables.
    Deletion,
    /// A recorded ref update.
    Update {
        old_hash: Vec<u8>,
        new_hash: Vec<u8>,
        name: String,
        email: String,
        time: u64,
        tz_offset: i16,
        message: String,
    },
}

/// One reflog entry, keyed by `(refname, update_index)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub refname: String,
    pub update_index: u64,
    pub value: LogValue,
}

impl LogRecord {
    pub fn is_deletion(&self) -> bool {
        matches!(self.value, LogValue::Deletion)
    }
}

/// Normalizes a log message: an empty message or one lacking a trailing
/// newline gains one; any newline before the last byte is rejected.
pub fn normalize_message(msg: &str) -> Result<String> {
    match msg.find('\n') {
        Some(pos) if pos + 1 < msg.len() => Err(Error::Api(
            "log message contains an embedded newline".into(),
        )),
        Some(_) => Ok(msg.to_string()),
        None => Ok(format!("{msg}\n")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_appends_missing_newline() {
        assert_eq!(normalize_message("one").unwrap(), "one\n");
        assert_eq!(normalize_message("").unwrap(), "\n");
    }

    #[test]
    fn normalize_keeps_trailing_newline() {
        assert_eq!(normalize_message("two\n").unwrap(), "two\n");
    }

    #[test]
    fn normalize_rejects_embedded_newline() {
        assert!(matches!(normalize_message("one\ntwo"), Err(Error::Api(_))));
        assert!(matches!(normalize_message("one\n\n"), Err(Error::Api(_))));
    }

    #[test]
    fn hash_id_format_round_trip() {
        for id in [HashId::Sha1, HashId::Sha256] {
            assert_eq!(HashId::from_format_id(id.format_id()), Some(id));
        }
        assert_eq!(HashId::from_format_id(0xdead_beef), None);
    }

    #[test]
    fn deletion_predicates() {
        let r = RefRecord {
            refname: "HEAD".into(),
            update_index: 1,
            value: RefValue::Deletion,
        };
        assert!(r.is_deletion());

        let l = LogRecord {
            refname: "HEAD".into(),
            update_index: 1,
            value: LogValue::Deletion,
        };
        assert!(l.is_deletion());
    }
}
