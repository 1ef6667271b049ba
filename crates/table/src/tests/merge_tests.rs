use record::{HashId, RefValue, Result, WriteOptions};
use tempfile::tempdir;

use super::{test_hash, test_log, test_ref, write_table};
use crate::{MergedView, TableReader};

#[test]
fn refs_stream_in_sorted_order() -> Result<()> {
    let dir = tempdir()?;
    let opts = WriteOptions::default();

    let p1 = dir.path().join("a.ref");
    write_table(
        &p1,
        &opts,
        1,
        1,
        &[test_ref("b", 1, 1), test_ref("d", 1, 1)],
        &[],
    )?;
    let p2 = dir.path().join("b.ref");
    write_table(
        &p2,
        &opts,
        2,
        2,
        &[test_ref("a", 2, 2), test_ref("c", 2, 2)],
        &[],
    )?;

    let readers = vec![
        TableReader::open(&p1, HashId::Sha1)?,
        TableReader::open(&p2, HashId::Sha1)?,
    ];
    let merged = MergedView::new(&readers);
    let all = merged.refs().collect_all()?;
    let names: Vec<&str> = all.iter().map(|r| r.refname.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c", "d"]);
    Ok(())
}

#[test]
fn newest_table_wins_for_duplicate_refs() -> Result<()> {
    let dir = tempdir()?;
    let opts = WriteOptions::default();

    let p1 = dir.path().join("old.ref");
    write_table(&p1, &opts, 1, 1, &[test_ref("branch", 1, 1)], &[])?;
    let p2 = dir.path().join("new.ref");
    write_table(&p2, &opts, 2, 2, &[test_ref("branch", 2, 2)], &[])?;

    let readers = vec![
        TableReader::open(&p1, HashId::Sha1)?,
        TableReader::open(&p2, HashId::Sha1)?,
    ];
    let merged = MergedView::new(&readers);
    let all = merged.refs().collect_all()?;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].update_index, 2);
    assert_eq!(all[0].value, RefValue::Val1(test_hash(2)));
    Ok(())
}

#[test]
fn tombstones_are_emitted() -> Result<()> {
    let dir = tempdir()?;
    let opts = WriteOptions::default();

    let p1 = dir.path().join("old.ref");
    write_table(&p1, &opts, 1, 1, &[test_ref("branch", 1, 1)], &[])?;
    let p2 = dir.path().join("new.ref");
    let tombstone = record::RefRecord {
        refname: "branch".to_string(),
        update_index: 2,
        value: RefValue::Deletion,
    };
    write_table(&p2, &opts, 2, 2, &[tombstone], &[])?;

    let readers = vec![
        TableReader::open(&p1, HashId::Sha1)?,
        TableReader::open(&p2, HashId::Sha1)?,
    ];
    let merged = MergedView::new(&readers);
    let all = merged.refs().collect_all()?;
    assert_eq!(all.len(), 1);
    assert!(all[0].is_deletion());
    Ok(())
}

#[test]
fn logs_stream_name_ascending_index_descending() -> Result<()> {
    let dir = tempdir()?;
    let opts = WriteOptions::default();

    let p1 = dir.path().join("a.ref");
    write_table(
        &p1,
        &opts,
        1,
        2,
        &[],
        &[test_log("alpha", 1, 10, "a1\n"), test_log("beta", 2, 20, "b2\n")],
    )?;
    let p2 = dir.path().join("b.ref");
    write_table(
        &p2,
        &opts,
        3,
        4,
        &[],
        &[test_log("alpha", 4, 40, "a4\n"), test_log("beta", 3, 30, "b3\n")],
    )?;

    let readers = vec![
        TableReader::open(&p1, HashId::Sha1)?,
        TableReader::open(&p2, HashId::Sha1)?,
    ];
    let merged = MergedView::new(&readers);
    let all = merged.logs().collect_all()?;
    let keys: Vec<(&str, u64)> = all
        .iter()
        .map(|l| (l.refname.as_str(), l.update_index))
        .collect();
    assert_eq!(
        keys,
        vec![("alpha", 4), ("alpha", 1), ("beta", 3), ("beta", 2)]
    );
    Ok(())
}

#[test]
fn duplicate_log_keys_resolve_to_newest_table() -> Result<()> {
    let dir = tempdir()?;
    let opts = WriteOptions::default();

    let p1 = dir.path().join("a.ref");
    write_table(&p1, &opts, 1, 1, &[], &[test_log("branch", 42, 1, "old\n")])?;
    let p2 = dir.path().join("b.ref");
    write_table(&p2, &opts, 2, 2, &[], &[test_log("branch", 42, 2, "new\n")])?;

    let readers = vec![
        TableReader::open(&p1, HashId::Sha1)?,
        TableReader::open(&p2, HashId::Sha1)?,
    ];
    let merged = MergedView::new(&readers);
    let all = merged.logs().collect_all()?;
    assert_eq!(all.len(), 1);
    match &all[0].value {
        record::LogValue::Update { message, .. } => assert_eq!(message, "new\n"),
        other => panic!("unexpected log value {other:?}"),
    }
    Ok(())
}

#[test]
fn empty_view_yields_nothing() -> Result<()> {
    let readers: Vec<TableReader> = Vec::new();
    let merged = MergedView::new(&readers);
    assert!(merged.refs().next_entry()?.is_none());
    assert!(merged.logs().next_entry()?.is_none());
    Ok(())
}
