//! # Table - immutable reference-table files
//!
//! On-disk storage for ref and log records. A table is *write-once,
//! read-many*: once produced it is never modified, only replaced during
//! compaction.
//!
//! ## File layout
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ DATA SECTION                                                  │
//! │                                                               │
//! │ ref records, sorted ascending by refname:                     │
//! │   crc32 (u32) | body_len (u32) | body                         │
//! │                                                               │
//! │ log records, sorted by (refname asc, update_index desc):      │
//! │   crc32 (u32) | body_len (u32) | body                         │
//! │                                                               │
//! │ The CRC32 covers the body only. This detects silent disk      │
//! │ corruption on reads.                                          │
//! ├───────────────────────────────────────────────────────────────┤
//! │ REF INDEX (refname -> data offset)                            │
//! │                                                               │
//! │ name_len (u16) | name | offset (u64)                          │
//! ├───────────────────────────────────────────────────────────────┤
//! │ LOG INDEX ((refname, update_index) -> data offset)            │
//! │                                                               │
//! │ name_len (u16) | name | update_index (u64) | offset (u64)     │
//! ├───────────────────────────────────────────────────────────────┤
//! │ FOOTER (always last 56 bytes)                                 │
//! │                                                               │
//! │ min_update_index (u64) | max_update_index (u64)               │
//! │ ref_index_offset (u64) | log_index_offset (u64)               │
//! │ ref_count (u64)        | log_count (u64)                      │
//! │ hash_id (u32)          | magic (u32) "RFT1"                   │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. The footer stamps the update-index
//! interval `[min, max]` the table covers and the hash id of the object
//! names inside; both are validated by the stack when the table joins
//! its manifest.

mod format;
mod merge;
mod reader;
mod writer;

pub use format::{Footer, FOOTER_BYTES, TABLE_MAGIC};
pub use merge::{MergedLogs, MergedRefs, MergedView};
pub use reader::TableReader;
pub use writer::{TableWriter, WriterStats};

#[cfg(test)]
mod tests;
