
use record::{LogRecord, LogValue, RefRecord, RefValue, Result};
use std::path::Path;

use crate::Stack;

pub fn test_hash(i: u8) -> Vec<u8> {
    vec![i; 20]
}

pub fn ref_val1(name: &str, update_index: u64, hash_byte: u8) -> RefRecord {
    RefRecord {
        refname: name.to_string(),
        update_index,
        value: RefValue::Val1(test_hash(hash_byte)),
    }
}

pub fn ref_symref(name: &str, update_index: u64, target: &str) -> RefRecord {
    RefRecord {
        refname: name.to_string(),
        update_index,
        value: RefValue::Symref(target.to_string()),
    }
}

pub fn ref_tombstone(name: &str, update_index: u64) -> RefRecord {
    RefRecord {
        refname: name.to_string(),
        update_index,
        value: RefValue::Deletion,
    }
}

pub fn log_update(name: &str, update_index: u64, time: u64, message: &str) -> LogRecord {
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

pub fn log_tombstone(name: &str, update_index: u64) -> LogRecord {
    LogRecord {
        refname: name.to_string(),
        update_index,
        value: LogValue::Deletion,
    }
}

/// Adds one table holding a single ref record.
pub fn add_ref(st: &mut Stack, rec: &RefRecord) -> Result<()> {
    let rec = rec.clone();
    st.add(move |writer| {
        writer.set_limits(rec.update_index, rec.update_index)?;
        writer.add_ref(rec)
    })
}

/// Adds one table holding a single log record, stamped at `update_index`.
pub fn add_log(st: &mut Stack, rec: &LogRecord, update_index: u64) -> Result<()> {
    let rec = rec.clone();
    st.add(move |writer| {
        writer.set_limits(update_index, update_index)?;
        writer.add_log(rec)
    })
}

/// Writes `n` one-ref tables without triggering auto-compaction.
pub fn write_n_ref_tables(st: &mut Stack, n: usize) -> Result<()> {
    let prev = st.opts.disable_auto_compact;
    st.opts.disable_auto_compact = true;
    for i in 0..n {
        let rec = ref_val1(
            &format!("refs/heads/branch-{i:04}"),
            st.next_update_index(),
            i as u8,
        );
        add_ref(st, &rec)?;
    }
    st.opts.disable_auto_compact = prev;
    Ok(())
}

/// Counts directory entries, skipping dotfiles (staging temp files and
/// NFS rename artifacts both lead with a dot).
pub fn count_dir_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
        .count()
}
