use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use record::{Error, LogRecord, LogValue, RefRecord, RefValue, Result};
use std::io::{Read, Seek, SeekFrom, Write};

/// Magic identifying a table file ("RFT1").
pub const TABLE_MAGIC: u32 = 0x5246_5431;

/// Fixed footer size: six u64 fields plus hash id and magic.
pub const FOOTER_BYTES: u64 = 6 * 8 + 4 + 4;

/// Maximum refname/ident length we'll allocate during reads. Prevents
/// OOM on corrupt files.
const MAX_NAME_BYTES: usize = 64 * 1024;
/// Maximum record body length accepted during reads.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Ref record tags, matching the public value types.
const REF_DELETION: u8 = 0;
const REF_VAL1: u8 = 1;
const REF_VAL2: u8 = 2;
const REF_SYMREF: u8 = 3;

/// Log record tags.
const LOG_DELETION: u8 = 0;
const LOG_UPDATE: u8 = 1;

/// Parsed table footer.
#[derive(Debug, Clone, Copy)]
pub struct Footer {
    pub min_update_index: u64,
    pub max_update_index: u64,
    pub ref_index_offset: u64,
    pub log_index_offset: u64,
    pub ref_count: u64,
    pub log_count: u64,
    pub hash_id: u32,
}

/// Returns the position where the footer starts.
pub fn footer_pos(filesize: u64) -> u64 {
    filesize.saturating_sub(FOOTER_BYTES)
}

pub fn write_footer<W: Write>(w: &mut W, footer: &Footer) -> std::io::Result<()> {
    w.write_u64::<LittleEndian>(footer.min_update_index)?;
    w.write_u64::<LittleEndian>(footer.max_update_index)?;
    w.write_u64::<LittleEndian>(footer.ref_index_offset)?;
    w.write_u64::<LittleEndian>(footer.log_index_offset)?;
    w.write_u64::<LittleEndian>(footer.ref_count)?;
    w.write_u64::<LittleEndian>(footer.log_count)?;
    w.write_u32::<LittleEndian>(footer.hash_id)?;
    w.write_u32::<LittleEndian>(TABLE_MAGIC)?;
    Ok(())
}

/// Seeks to the end of the file and parses the footer, validating size
/// and magic.
pub fn read_footer<R: Read + Seek>(r: &mut R) -> Result<Footer> {
    let filesize = r.seek(SeekFrom::End(0))?;
    if filesize < FOOTER_BYTES {
        return Err(Error::Format("table file too small".into()));
    }
    r.seek(SeekFrom::Start(footer_pos(filesize)))?;

    let footer = Footer {
        min_update_index: r.read_u64::<LittleEndian>()?,
        max_update_index: r.read_u64::<LittleEndian>()?,
        ref_index_offset: r.read_u64::<LittleEndian>()?,
        log_index_offset: r.read_u64::<LittleEndian>()?,
        ref_count: r.read_u64::<LittleEndian>()?,
        log_count: r.read_u64::<LittleEndian>()?,
        hash_id: r.read_u32::<LittleEndian>()?,
    };
    let magic = r.read_u32::<LittleEndian>()?;
    if magic != TABLE_MAGIC {
        return Err(Error::Format(format!(
            "bad table magic {magic:#010x} (want {TABLE_MAGIC:#010x})"
        )));
    }
    Ok(footer)
}

// -- body encoding (infallible, into a scratch Vec) --

fn push_name(body: &mut Vec<u8>, name: &str) {
    body.extend_from_slice(&(name.len() as u16).to_le_bytes());
    body.extend_from_slice(name.as_bytes());
}

fn push_hash(body: &mut Vec<u8>, hash: &[u8]) {
    body.push(hash.len() as u8);
    body.extend_from_slice(hash);
}

fn read_name<R: Read>(r: &mut R) -> Result<String> {
    let len = r.read_u16::<LittleEndian>()? as usize;
    if len > MAX_NAME_BYTES {
        return Err(Error::Format(format!("corrupt name length {len}")));
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| Error::Format("name is not valid UTF-8".into()))
}

fn read_hash<R: Read>(r: &mut R) -> Result<Vec<u8>> {
    let len = r.read_u8()? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// Encodes a ref record body (everything the CRC covers).
pub fn encode_ref_record(rec: &RefRecord) -> Vec<u8> {
    let mut body = Vec::with_capacity(64);
    let tag = match rec.value {
        RefValue::Deletion => REF_DELETION,
        RefValue::Val1(_) => REF_VAL1,
        RefValue::Val2 { .. } => REF_VAL2,
        RefValue::Symref(_) => REF_SYMREF,
    };
    body.push(tag);
    push_name(&mut body, &rec.refname);
    body.extend_from_slice(&rec.update_index.to_le_bytes());
    match &rec.value {
        RefValue::Deletion => {}
        RefValue::Val1(hash) => push_hash(&mut body, hash),
        RefValue::Val2 {
            value,
            target_value,
        } => {
            push_hash(&mut body, value);
            push_hash(&mut body, target_value);
        }
        RefValue::Symref(target) => push_name(&mut body, target),
    }
    body
}

pub fn decode_ref_record(body: &[u8]) -> Result<RefRecord> {
    let mut r = body;
    let tag = r.read_u8()?;
    let refname = read_name(&mut r)?;
    let update_index = r.read_u64::<LittleEndian>()?;
    let value = match tag {
        REF_DELETION => RefValue::Deletion,
        REF_VAL1 => RefValue::Val1(read_hash(&mut r)?),
        REF_VAL2 => RefValue::Val2 {
            value: read_hash(&mut r)?,
            target_value: read_hash(&mut r)?,
        },
        REF_SYMREF => RefValue::Symref(read_name(&mut r)?),
        other => return Err(Error::Format(format!("unknown ref record tag {other}"))),
    };
    Ok(RefRecord {
        refname,
        update_index,
        value,
    })
}

/// Encodes a log record body.
pub fn encode_log_record(rec: &LogRecord) -> Vec<u8> {
    let mut body = Vec::with_capacity(96);
    let tag = match rec.value {
        LogValue::Deletion => LOG_DELETION,
        LogValue::Update { .. } => LOG_UPDATE,
    };
    body.push(tag);
    push_name(&mut body, &rec.refname);
    body.extend_from_slice(&rec.update_index.to_le_bytes());
    if let LogValue::Update {
        old_hash,
        new_hash,
        name,
        email,
        time,
        tz_offset,
        message,
    } = &rec.value
    {
        push_hash(&mut body, old_hash);
        push_hash(&mut body, new_hash);
        push_name(&mut body, name);
        push_name(&mut body, email);
        body.extend_from_slice(&time.to_le_bytes());
        body.extend_from_slice(&tz_offset.to_le_bytes());
        body.extend_from_slice(&(message.len() as u32).to_le_bytes());
        body.extend_from_slice(message.as_bytes());
    }
    body
}

pub fn decode_log_record(body: &[u8]) -> Result<LogRecord> {
    let mut r = body;
    let tag = r.read_u8()?;
    let refname = read_name(&mut r)?;
    let update_index = r.read_u64::<LittleEndian>()?;
    let value = match tag {
        LOG_DELETION => LogValue::Deletion,
        LOG_UPDATE => {
            let old_hash = read_hash(&mut r)?;
            let new_hash = read_hash(&mut r)?;
            let name = read_name(&mut r)?;
            let email = read_name(&mut r)?;
            let time = r.read_u64::<LittleEndian>()?;
            let tz_offset = r.read_i16::<LittleEndian>()?;
            let msg_len = r.read_u32::<LittleEndian>()? as usize;
            if msg_len > MAX_BODY_BYTES {
                return Err(Error::Format(format!("corrupt message length {msg_len}")));
            }
            let mut buf = vec![0u8; msg_len];
            r.read_exact(&mut buf)?;
            let message = String::from_utf8(buf)
                .map_err(|_| Error::Format("log message is not valid UTF-8".into()))?;
            LogValue::Update {
                old_hash,
                new_hash,
                name,
                email,
                time,
                tz_offset,
                message,
            }
        }
        other => return Err(Error::Format(format!("unknown log record tag {other}"))),
    };
    Ok(LogRecord {
        refname,
        update_index,
        value,
    })
}

/// Writes one `crc32 | body_len | body` frame, returning bytes written.
pub fn write_frame<W: Write>(w: &mut W, body: &[u8]) -> std::io::Result<u64> {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(body);
    w.write_u32::<LittleEndian>(hasher.finalize())?;
    w.write_u32::<LittleEndian>(body.len() as u32)?;
    w.write_all(body)?;
    Ok(8 + body.len() as u64)
}

/// Reads one frame and returns the verified body.
pub fn read_frame<R: Read>(r: &mut R) -> Result<Vec<u8>> {
    let stored_crc = r.read_u32::<LittleEndian>()?;
    let body_len = r.read_u32::<LittleEndian>()? as usize;
    if body_len > MAX_BODY_BYTES {
        return Err(Error::Format(format!("corrupt record length {body_len}")));
    }
    let mut body = vec![0u8; body_len];
    r.read_exact(&mut body)?;

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&body);
    let actual_crc = hasher.finalize();
    if actual_crc != stored_crc {
        return Err(Error::Format(format!(
            "record checksum mismatch: expected {stored_crc:#010x}, got {actual_crc:#010x}"
        )));
    }
    Ok(body)
}

pub(crate) fn read_index_name<R: Read>(r: &mut R) -> Result<String> {
    read_name(r)
}

pub(crate) fn write_index_name<W: Write>(w: &mut W, name: &str) -> std::io::Result<()> {
    w.write_u16::<LittleEndian>(name.len() as u16)?;
    w.write_all(name.as_bytes())?;
    Ok(())
}
