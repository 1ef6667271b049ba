use record::{Error, LogValue, RefValue, Result, WriteOptions};
use std::fs::File;
use std::io::{Seek, SeekFrom};
use tempfile::tempdir;

use super::{test_log, test_ref, write_table};
use crate::format::{footer_pos, read_footer};
use crate::{TableReader, TableWriter, FOOTER_BYTES, TABLE_MAGIC};

#[test]
fn write_and_inspect_footer() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("t.ref");

    write_table(
        &path,
        &WriteOptions::default(),
        3,
        5,
        &[test_ref("refs/heads/main", 3, 1), test_ref("refs/tags/v1", 5, 2)],
        &[test_log("refs/heads/main", 4, 100, "update\n")],
    )?;

    let mut f = File::open(&path)?;
    let filesize = f.metadata()?.len();
    assert!(filesize >= FOOTER_BYTES, "file too small to hold a footer");

    let footer = read_footer(&mut f)?;
    assert_eq!(footer.min_update_index, 3);
    assert_eq!(footer.max_update_index, 5);
    assert_eq!(footer.ref_count, 2);
    assert_eq!(footer.log_count, 1);
    assert!(footer.ref_index_offset < footer.log_index_offset);
    assert!(footer.log_index_offset < footer_pos(filesize));

    // raw magic at the tail
    f.seek(SeekFrom::End(-4))?;
    let mut magic = [0u8; 4];
    std::io::Read::read_exact(&mut f, &mut magic)?;
    assert_eq!(u32::from_le_bytes(magic), TABLE_MAGIC);
    Ok(())
}

#[test]
fn empty_writer_reports_empty_table() -> Result<()> {
    let dir = tempdir()?;
    let file = File::create(dir.path().join("t.ref"))?;
    let mut writer = TableWriter::new(file, &WriteOptions::default());
    writer.set_limits(1, 1)?;
    assert!(matches!(writer.finish(), Err(Error::EmptyTable)));
    Ok(())
}

#[test]
fn records_require_limits() -> Result<()> {
    let dir = tempdir()?;
    let file = File::create(dir.path().join("t.ref"))?;
    let mut writer = TableWriter::new(file, &WriteOptions::default());
    assert!(matches!(
        writer.add_ref(test_ref("HEAD", 1, 0)),
        Err(Error::Api(_))
    ));
    Ok(())
}

#[test]
fn ref_outside_limits_rejected() -> Result<()> {
    let dir = tempdir()?;
    let file = File::create(dir.path().join("t.ref"))?;
    let mut writer = TableWriter::new(file, &WriteOptions::default());
    writer.set_limits(5, 7)?;
    assert!(matches!(
        writer.add_ref(test_ref("HEAD", 4, 0)),
        Err(Error::Api(_))
    ));
    assert!(matches!(
        writer.add_ref(test_ref("HEAD", 8, 0)),
        Err(Error::Api(_))
    ));
    writer.add_ref(test_ref("HEAD", 6, 0))?;
    Ok(())
}

#[test]
fn inverted_limits_rejected() -> Result<()> {
    let dir = tempdir()?;
    let file = File::create(dir.path().join("t.ref"))?;
    let mut writer = TableWriter::new(file, &WriteOptions::default());
    assert!(matches!(writer.set_limits(2, 1), Err(Error::Api(_))));
    Ok(())
}

#[test]
fn log_message_gains_trailing_newline() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("t.ref");
    write_table(
        &path,
        &WriteOptions::default(),
        1,
        1,
        &[],
        &[test_log("branch", 1, 0, "one")],
    )?;

    let reader = TableReader::open(&path, Default::default())?;
    let log = reader.latest_log("branch")?.expect("log should exist");
    match log.value {
        LogValue::Update { message, .. } => assert_eq!(message, "one\n"),
        other => panic!("unexpected log value {other:?}"),
    }
    Ok(())
}

#[test]
fn exact_log_message_is_kept_verbatim() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("t.ref");
    let opts = WriteOptions {
        exact_log_message: true,
        ..Default::default()
    };
    write_table(&path, &opts, 1, 1, &[], &[test_log("branch", 1, 0, "no newline")])?;

    let reader = TableReader::open(&path, Default::default())?;
    let log = reader.latest_log("branch")?.expect("log should exist");
    match log.value {
        LogValue::Update { message, .. } => assert_eq!(message, "no newline"),
        other => panic!("unexpected log value {other:?}"),
    }
    Ok(())
}

#[test]
fn embedded_newline_rejected() -> Result<()> {
    let dir = tempdir()?;
    let file = File::create(dir.path().join("t.ref"))?;
    let mut writer = TableWriter::new(file, &WriteOptions::default());
    writer.set_limits(1, 1)?;
    assert!(matches!(
        writer.add_log(test_log("branch", 1, 0, "one\ntwo")),
        Err(Error::Api(_))
    ));
    Ok(())
}

#[test]
fn tombstones_round_trip() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("t.ref");
    let tombstone = record::RefRecord {
        refname: "gone".to_string(),
        update_index: 2,
        value: RefValue::Deletion,
    };
    write_table(&path, &WriteOptions::default(), 2, 2, &[tombstone.clone()], &[])?;

    let reader = TableReader::open(&path, Default::default())?;
    let got = reader.ref_record("gone")?.expect("tombstone should be stored");
    assert_eq!(got, tombstone);
    assert!(got.is_deletion());
    Ok(())
}
