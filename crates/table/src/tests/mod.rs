mod merge_tests;
mod writer_tests;

use record::{LogRecord, LogValue, RefRecord, RefValue, Result, WriteOptions};
use std::fs::File;
use std::path::Path;

use crate::TableWriter;

/// Deterministic 20-byte object name for tests.
pub fn test_hash(i: u8) -> Vec<u8> {
    vec![i; 20]
}

pub fn test_ref(name: &str, update_index: u64, hash_byte: u8) -> RefRecord {
    RefRecord {
        refname: name.to_string(),
        update_index,
        value: RefValue::Val1(test_hash(hash_byte)),
    }
}

pub fn test_log(name: &str, update_index: u64, time: u64, message: &str) -> LogRecord {
    LogRecord {
        refname: name.to_string(),
        update_index,
        value: LogValue::Update {
            old_hash: test_hash(0),
            new_hash: test_hash(update_index as u8),
            name: "identity".to_string(),
            email: "identity@invalid".to_string(),
            time,
            tz_offset: 0,
            message: message.to_string(),
        },
    }
}

/// Writes a complete table at `path` covering `[min, max]`.
pub fn write_table(
    path: &Path,
    opts: &WriteOptions,
    min: u64,
    max: u64,
    refs: &[RefRecord],
    logs: &[LogRecord],
) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = TableWriter::new(file, opts);
    writer.set_limits(min, max)?;
    for rec in refs {
        writer.add_ref(rec.clone())?;
    }
    for rec in logs {
        writer.add_log(rec.clone())?;
    }
    writer.finish()?;
    Ok(())
}
