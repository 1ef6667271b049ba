use byteorder::{LittleEndian, ReadBytesExt};
use record::{Error, HashId, LogRecord, RefRecord, Result};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::format::{
    decode_log_record, decode_ref_record, read_footer, read_frame, read_index_name, Footer,
    FOOTER_BYTES,
};

/// Reads a table file for point lookups.
///
/// On [`open`](TableReader::open) both index sections are loaded into
/// memory; a persistent file handle is kept open for the lifetime of the
/// reader, wrapped in a `Mutex` so lookups work through a shared `&self`
/// reference. Point lookups cost one seek + read, and every record read
/// is CRC-verified.
///
/// The reader remains valid even after its file is unlinked: an open
/// handle survives unlink on POSIX, which is what lets compaction delete
/// obsolete tables out from under concurrent readers.
pub struct TableReader {
    /// Basename of the table file; equal to its manifest entry.
    name: String,
    #[allow(dead_code)]
    path: PathBuf,
    /// refname -> data-section byte offset.
    ref_index: BTreeMap<String, u64>,
    /// (refname, update_index) -> data-section byte offset.
    log_index: BTreeMap<(String, u64), u64>,
    file: Mutex<BufReader<File>>,
    footer: Footer,
}

impl TableReader {
    /// Opens a table file, validates its footer against the expected
    /// hash id, and loads both indexes.
    ///
    /// # Errors
    ///
    /// `FormatError` if the file is too small, the magic is wrong, the
    /// hash id disagrees with `expected_hash`, or an index offset points
    /// outside the file.
    pub fn open<P: AsRef<Path>>(path: P, expected_hash: HashId) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();
        let name = path_buf
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| Error::Format("table path has no basename".into()))?;

        let mut f = File::open(&path_buf)?;
        let filesize = f.metadata()?.len();

        let footer = read_footer(&mut f)?;
        if footer.hash_id != expected_hash.format_id() {
            return Err(Error::Format(format!(
                "table {name} uses hash id {:#010x}, stack expects {:#010x}",
                footer.hash_id,
                expected_hash.format_id()
            )));
        }

        let index_end = filesize - FOOTER_BYTES;
        if footer.ref_index_offset > footer.log_index_offset
            || footer.log_index_offset > index_end
        {
            return Err(Error::Format("invalid index offsets".into()));
        }

        // Load the ref index: name | offset entries up to the log index.
        f.seek(SeekFrom::Start(footer.ref_index_offset))?;
        let mut ref_index = BTreeMap::new();
        for _ in 0..footer.ref_count {
            let key = read_index_name(&mut f)?;
            let offset = f.read_u64::<LittleEndian>()?;
            ref_index.insert(key, offset);
        }

        // Load the log index: name | update_index | offset entries.
        f.seek(SeekFrom::Start(footer.log_index_offset))?;
        let mut log_index = BTreeMap::new();
        for _ in 0..footer.log_count {
            let key = read_index_name(&mut f)?;
            let update_index = f.read_u64::<LittleEndian>()?;
            let offset = f.read_u64::<LittleEndian>()?;
            log_index.insert((key, update_index), offset);
        }

        f.seek(SeekFrom::Start(0))?;

        Ok(Self {
            name,
            path: path_buf,
            ref_index,
            log_index,
            file: Mutex::new(BufReader::new(f)),
            footer,
        })
    }

    /// The table's basename, as it appears in the manifest.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn min_update_index(&self) -> u64 {
        self.footer.min_update_index
    }

    pub fn max_update_index(&self) -> u64 {
        self.footer.max_update_index
    }

    /// Total number of records (refs + logs); the size measure the
    /// compaction planner works with.
    pub fn len(&self) -> usize {
        self.ref_index.len() + self.log_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ref_index.is_empty() && self.log_index.is_empty()
    }

    fn read_body_at(&self, offset: u64) -> Result<Vec<u8>> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| Error::Format(format!("reader lock poisoned: {e}")))?;
        f.seek(SeekFrom::Start(offset))?;
        read_frame(&mut *f)
    }

    /// Point lookup for a ref record. The returned record may be a
    /// tombstone; shadowing is the stack's concern, not the reader's.
    pub fn ref_record(&self, refname: &str) -> Result<Option<RefRecord>> {
        let offset = match self.ref_index.get(refname) {
            Some(&o) => o,
            None => return Ok(None),
        };
        let rec = decode_ref_record(&self.read_body_at(offset)?)?;
        if rec.refname != refname {
            return Err(Error::Format("index pointed at mismatching refname".into()));
        }
        Ok(Some(rec))
    }

    /// Point lookup for one log entry by its full key.
    pub fn log_record(&self, refname: &str, update_index: u64) -> Result<Option<LogRecord>> {
        let offset = match self
            .log_index
            .get(&(refname.to_string(), update_index))
        {
            Some(&o) => o,
            None => return Ok(None),
        };
        Ok(Some(decode_log_record(&self.read_body_at(offset)?)?))
    }

    /// The log entry with the highest update index for `refname`, if any.
    pub fn latest_log(&self, refname: &str) -> Result<Option<LogRecord>> {
        let lower = (refname.to_string(), 0u64);
        let upper = (refname.to_string(), u64::MAX);
        let offset = match self
            .log_index
            .range((Bound::Included(lower), Bound::Included(upper)))
            .next_back()
        {
            Some((_, &o)) => o,
            None => return Ok(None),
        };
        Ok(Some(decode_log_record(&self.read_body_at(offset)?)?))
    }

    /// All refnames in ascending order.
    pub fn ref_names(&self) -> impl Iterator<Item = &str> {
        self.ref_index.keys().map(String::as_str)
    }

    /// All log keys in (refname asc, update_index asc) order.
    pub fn log_keys(&self) -> impl Iterator<Item = (&str, u64)> {
        self.log_index.keys().map(|(name, idx)| (name.as_str(), *idx))
    }
}
