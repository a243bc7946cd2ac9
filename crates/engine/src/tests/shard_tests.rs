use super::helpers::test_config;
use crate::*;
use anyhow::Result;
use slot::{AccessMode, StoreError};
use std::fs;
use store::{PostingsList, ShardHeader, SHARD_HEADER_BYTES};
use tempfile::tempdir;

fn open_write(cfg: &config::EngineConfig, shard_id: u32) -> Result<ShardSession> {
    Ok(ShardSession::open(cfg, shard_id, AccessMode::Write)?.expect("write open always yields a shard"))
}

fn open_read(cfg: &config::EngineConfig, shard_id: u32) -> Result<ShardSession> {
    Ok(ShardSession::open(cfg, shard_id, AccessMode::Read)?.expect("shard should exist"))
}

// --------------------- Open ---------------------

#[test]
fn read_of_missing_shard_is_none() -> Result<()> {
    let dir = tempdir()?;
    let cfg = test_config(dir.path());
    assert!(ShardSession::open(&cfg, 4, AccessMode::Read)?.is_none());
    Ok(())
}

#[test]
fn new_shard_gets_zero_header() -> Result<()> {
    let dir = tempdir()?;
    let cfg = test_config(dir.path());
    let header = open_write(&cfg, 0)?.close()?;
    assert_eq!(header, ShardHeader::default());

    let paths = ShardPaths::new(&cfg.base_dir, 0);
    assert_eq!(fs::read(&paths.data.primary)?, vec![0u8; SHARD_HEADER_BYTES as usize]);
    Ok(())
}

// --------------------- Put / get ---------------------

#[test]
fn put_close_reopen_roundtrip() -> Result<()> {
    let dir = tempdir()?;
    let cfg = test_config(dir.path());

    let mut w = open_write(&cfg, 1)?;
    w.put(2, b"alpha")?;
    w.put(5, b"beta")?;
    assert_eq!(w.get(5)?, b"beta");
    let header = w.close()?;
    assert_eq!(header.pos_num, 5);

    let mut r = open_read(&cfg, 1)?;
    assert_eq!(r.shard_id(), 1);
    assert_eq!(r.header(), header);
    assert_eq!(r.get(2)?, b"alpha");
    assert_eq!(r.get(5)?, b"beta");
    assert!(matches!(r.get(3), Err(StoreError::NotFound(3))));
    assert!(matches!(r.get(6), Err(StoreError::NotFound(6))));
    assert!(matches!(r.get(0), Err(StoreError::NotFound(0))));
    assert!(matches!(r.put(1, b"x"), Err(StoreError::ReadOnlyViolation)));
    Ok(())
}

#[test]
fn empty_payload_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let mut w = open_write(&test_config(dir.path()), 0)?;
    assert!(matches!(w.put(1, b""), Err(StoreError::MalformedRecord(_))));
    w.abort()?;
    Ok(())
}

#[test]
fn header_reconciles_document_range() -> Result<()> {
    let dir = tempdir()?;
    let cfg = test_config(dir.path());

    let mut w = open_write(&cfg, 0)?;
    w.put(1, b"a")?;
    w.note_document(40)?;
    w.note_document(12)?;
    w.close()?;

    let mut w = open_write(&cfg, 0)?;
    assert_eq!(w.header().fileindex_start, 12);
    w.note_document(7)?;
    w.note_document(30)?;
    w.set_keyword_count(20)?;
    let header = w.close()?;

    assert_eq!(
        header,
        ShardHeader {
            pos_num: 20,
            fileindex_start: 7,
            fileindex_end: 40,
        }
    );
    assert_eq!(open_read(&cfg, 0)?.header(), header);
    Ok(())
}

// --------------------- Compaction ---------------------

#[test]
fn close_reclaims_overwritten_and_deleted_payloads() -> Result<()> {
    let dir = tempdir()?;
    let cfg = test_config(dir.path());

    let mut w = open_write(&cfg, 3)?;
    w.put(1, b"first version")?;
    w.put(1, b"v2")?;
    w.put(2, b"doomed")?;
    w.del(2)?;
    w.del(2)?;
    w.close()?;

    let paths = ShardPaths::new(&cfg.base_dir, 3);
    assert_eq!(
        fs::metadata(&paths.data.primary)?.len(),
        SHARD_HEADER_BYTES + 2
    );
    let mut r = open_read(&cfg, 3)?;
    assert_eq!(r.get(1)?, b"v2");
    assert!(r.get(2).unwrap_err().is_not_found());
    Ok(())
}

#[test]
fn merge_list_unions_with_stored_postings() -> Result<()> {
    let dir = tempdir()?;
    let cfg = test_config(dir.path());

    let mut first = PostingsList::new();
    first.add(3, 10);
    first.add(3, 12);
    let mut second = PostingsList::new();
    second.add(3, 11);
    second.add(8, 1);

    let mut w = open_write(&cfg, 0)?;
    w.merge_list(4, &first)?;
    w.close()?;
    let mut w = open_write(&cfg, 0)?;
    w.merge_list(4, &second)?;
    w.close()?;

    let list = open_read(&cfg, 0)?.get_list(4)?;
    assert_eq!(list.documents().collect::<Vec<_>>(), vec![3, 8]);
    assert_eq!(list.positions(3), Some(&[10, 11, 12][..]));
    assert_eq!(list.positions(8), Some(&[1][..]));
    Ok(())
}

// --------------------- Abort ---------------------

#[test]
fn abort_keeps_published_shard() -> Result<()> {
    let dir = tempdir()?;
    let cfg = test_config(dir.path());

    let mut w = open_write(&cfg, 2)?;
    w.put(1, b"kept")?;
    w.close()?;

    let mut w = open_write(&cfg, 2)?;
    w.put(1, b"lost")?;
    w.put(9, b"lost too")?;
    w.abort()?;

    assert!(stale_shadows(&cfg.base_dir)?.is_empty());
    let mut r = open_read(&cfg, 2)?;
    assert_eq!(r.header().pos_num, 1);
    assert_eq!(r.get(1)?, b"kept");
    Ok(())
}
