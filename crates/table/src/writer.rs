use record::{
    normalize_message, Error, LogRecord, LogValue, RefRecord, Result, WriteOptions,
};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;

use crate::format::{
    encode_log_record, encode_ref_record, write_footer, write_frame, write_index_name, Footer,
    FOOTER_BYTES,
};

/// Summary of a finished table, fed into compaction telemetry.
#[derive(Debug, Clone, Copy)]
pub struct WriterStats {
    pub records: u64,
    pub bytes: u64,
}

/// Produces one table file.
///
/// Records are buffered in sorted maps and streamed out in `finish()`:
/// the data section, both index sections, then the footer, followed by a
/// flush and fsync. The writer does not choose the file's final name;
/// the caller stages the output (typically under a temporary name) and
/// renames it into place once `finish()` succeeds.
///
/// `set_limits` must be called before the first record. Ref records must
/// carry an `update_index` inside the declared `[min, max]` interval;
/// log records are exempt because their update index is part of the
/// record key rather than a write stamp.
pub struct TableWriter {
    file: File,
    hash_id: u32,
    exact_log_message: bool,
    limits: Option<(u64, u64)>,
    refs: BTreeMap<String, RefRecord>,
    // (refname asc, update_index desc), the on-disk log order
    logs: BTreeMap<(String, Reverse<u64>), LogRecord>,
}

impl TableWriter {
    pub fn new(file: File, opts: &WriteOptions) -> Self {
        Self {
            file,
            hash_id: opts.hash_id.format_id(),
            exact_log_message: opts.exact_log_message,
            limits: None,
            refs: BTreeMap::new(),
            logs: BTreeMap::new(),
        }
    }

    /// Declares the update-index interval this table covers.
    pub fn set_limits(&mut self, min: u64, max: u64) -> Result<()> {
        if min > max {
            return Err(Error::Api(format!(
                "update index limits are inverted: {min} > {max}"
            )));
        }
        self.limits = Some((min, max));
        Ok(())
    }

    /// The declared minimum update index (0 before `set_limits`).
    pub fn min_update_index(&self) -> u64 {
        self.limits.map_or(0, |(min, _)| min)
    }

    /// The declared maximum update index (0 before `set_limits`).
    pub fn max_update_index(&self) -> u64 {
        self.limits.map_or(0, |(_, max)| max)
    }

    /// Buffers a ref record. Its update index must lie inside the
    /// declared limits.
    pub fn add_ref(&mut self, rec: RefRecord) -> Result<()> {
        let (min, max) = self
            .limits
            .ok_or_else(|| Error::Api("set_limits must be called before adding records".into()))?;
        if rec.update_index < min || rec.update_index > max {
            return Err(Error::Api(format!(
                "ref update index {} outside limits [{min}, {max}]",
                rec.update_index
            )));
        }
        self.refs.insert(rec.refname.clone(), rec);
        Ok(())
    }

    /// Buffers a log record, normalizing its message unless the writer
    /// was opened with `exact_log_message`.
    pub fn add_log(&mut self, mut rec: LogRecord) -> Result<()> {
        if self.limits.is_none() {
            return Err(Error::Api(
                "set_limits must be called before adding records".into(),
            ));
        }
        if !self.exact_log_message {
            if let LogValue::Update { message, .. } = &mut rec.value {
                *message = normalize_message(message)?;
            }
        }
        self.logs
            .insert((rec.refname.clone(), Reverse(rec.update_index)), rec);
        Ok(())
    }

    /// Streams everything out and fsyncs. Fails with
    /// [`Error::EmptyTable`] when no records were buffered, in which
    /// case the caller discards the staged file.
    pub fn finish(mut self) -> Result<WriterStats> {
        if self.refs.is_empty() && self.logs.is_empty() {
            return Err(Error::EmptyTable);
        }
        let (min, max) = self
            .limits
            .ok_or_else(|| Error::Api("finish without set_limits".into()))?;

        let mut pos = 0u64;

        let mut ref_index: Vec<(&String, u64)> = Vec::with_capacity(self.refs.len());
        for (name, rec) in &self.refs {
            ref_index.push((name, pos));
            pos += write_frame(&mut self.file, &encode_ref_record(rec))?;
        }

        let mut log_index: Vec<(&String, u64, u64)> = Vec::with_capacity(self.logs.len());
        for ((name, Reverse(idx)), rec) in &self.logs {
            log_index.push((name, *idx, pos));
            pos += write_frame(&mut self.file, &encode_log_record(rec))?;
        }

        let ref_index_offset = pos;
        for &(name, offset) in &ref_index {
            write_index_name(&mut self.file, name)?;
            self.file.write_all(&offset.to_le_bytes())?;
            pos += 2 + name.len() as u64 + 8;
        }

        let log_index_offset = pos;
        for &(name, idx, offset) in &log_index {
            write_index_name(&mut self.file, name)?;
            self.file.write_all(&idx.to_le_bytes())?;
            self.file.write_all(&offset.to_le_bytes())?;
            pos += 2 + name.len() as u64 + 8 + 8;
        }

        write_footer(
            &mut self.file,
            &Footer {
                min_update_index: min,
                max_update_index: max,
                ref_index_offset,
                log_index_offset,
                ref_count: ref_index.len() as u64,
                log_count: log_index.len() as u64,
                hash_id: self.hash_id,
            },
        )?;

        self.file.flush()?;
        self.file.sync_all()?;

        Ok(WriterStats {
            records: (ref_index.len() + log_index.len()) as u64,
            bytes: pos + FOOTER_BYTES,
        })
    }
}
