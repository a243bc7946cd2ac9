use super::helpers::{snapshot_dir, test_config, titled};
use crate::recovery::{discard, prepare_shadow, promote};
use crate::*;
use anyhow::Result;
use std::fs::{self, OpenOptions};
use tempfile::tempdir;

fn publish(cfg: &config::EngineConfig, doc_id: u64, title: &str) -> Result<()> {
    let mut w = Session::open_write(cfg)?;
    w.put_filedata(doc_id, &titled(title))?;
    w.close()
}

// --------------------- Crashed writer ---------------------

#[test]
fn dropped_writer_leaves_primaries_untouched() -> Result<()> {
    let dir = tempdir()?;
    let cfg = test_config(dir.path());
    publish(&cfg, 1, "old")?;
    let before = snapshot_dir(&cfg.base_dir);

    {
        let mut w = Session::open_write(&cfg)?;
        w.put_filedata(1, &titled("new"))?;
        w.mark_deleted(1)?;
        w.attributes().score.put(1, 2.5)?;
        // dropped without close
    }

    let stale = stale_shadows(&cfg.base_dir)?;
    assert!(!stale.is_empty());
    let after: Vec<_> = snapshot_dir(&cfg.base_dir)
        .into_iter()
        .filter(|(p, _)| !stale.contains(p))
        .collect();
    assert_eq!(before, after);

    let mut r = Session::open_read(&cfg)?;
    assert_eq!(r.get_filedata(1)?, titled("old"));
    assert!(!r.is_deleted(1)?);
    Ok(())
}

#[test]
fn next_writer_resumes_from_shadows() -> Result<()> {
    let dir = tempdir()?;
    let cfg = test_config(dir.path());
    publish(&cfg, 1, "old")?;

    {
        let mut w = Session::open_write(&cfg)?;
        w.put_filedata(1, &titled("new"))?;
        w.mark_deleted(1)?;
    }

    let mut w = Session::open_write(&cfg)?;
    assert_eq!(w.get_filedata(1)?, titled("new"));
    assert!(w.is_deleted(1)?);
    w.close()?;

    assert!(stale_shadows(&cfg.base_dir)?.is_empty());
    let mut r = Session::open_read(&cfg)?;
    assert_eq!(r.get_filedata(1)?, titled("new"));
    assert!(r.is_deleted(1)?);
    Ok(())
}

#[test]
fn abort_after_crash_restores_clean_directory() -> Result<()> {
    let dir = tempdir()?;
    let cfg = test_config(dir.path());
    publish(&cfg, 1, "old")?;
    let before = snapshot_dir(&cfg.base_dir);

    {
        let mut w = Session::open_write(&cfg)?;
        w.put_filedata(1, &titled("new"))?;
    }
    Session::open_write(&cfg)?.abort()?;

    assert!(stale_shadows(&cfg.base_dir)?.is_empty());
    assert_eq!(snapshot_dir(&cfg.base_dir), before);
    Ok(())
}

#[test]
fn failed_close_keeps_shadows_and_primaries() -> Result<()> {
    let dir = tempdir()?;
    let cfg = test_config(dir.path());
    publish(&cfg, 1, "old")?;
    let before = snapshot_dir(&cfg.base_dir);

    let mut w = Session::open_write(&cfg)?;
    w.put_filedata(2, &titled("truncated"))?;
    let shadow = w.paths().filedata.shadow.clone();
    OpenOptions::new().write(true).open(&shadow)?.set_len(3)?;

    assert!(w.close().is_err());
    assert!(shadow.exists());
    let stale = stale_shadows(&cfg.base_dir)?;
    assert!(stale.iter().all(|p| !p.to_string_lossy().ends_with(".gc")));
    let primaries: Vec<_> = snapshot_dir(&cfg.base_dir)
        .into_iter()
        .filter(|(p, _)| !stale.contains(p))
        .collect();
    assert_eq!(primaries, before);

    Session::open_write(&cfg)?.abort()?;
    let mut r = Session::open_read(&cfg)?;
    assert_eq!(r.get_filedata(1)?, titled("old"));
    Ok(())
}

// --------------------- Past the published bounds ---------------------

#[test]
fn resumed_writer_keeps_document_past_published_count() -> Result<()> {
    let dir = tempdir()?;
    let cfg = test_config(dir.path());
    publish(&cfg, 1, "one")?;

    {
        let mut w = Session::open_write(&cfg)?;
        w.put_filedata(2, &titled("two"))?;
        // dropped without close
    }

    let mut w = Session::open_write(&cfg)?;
    assert_eq!(w.counts().documents, 2);
    assert_eq!(w.get_filedata(2)?, titled("two"));
    w.close()?;

    let mut r = Session::open_read(&cfg)?;
    assert_eq!(r.counts().documents, 2);
    assert_eq!(r.get_filedata(1)?, titled("one"));
    assert_eq!(r.get_filedata(2)?, titled("two"));
    Ok(())
}

#[test]
fn retried_close_keeps_counts_after_failed_compaction() -> Result<()> {
    let dir = tempdir()?;
    let cfg = test_config(dir.path());
    publish(&cfg, 1, "one")?;

    let mut w = Session::open_write(&cfg)?;
    w.put_filedata(2, &titled("two"))?;
    w.set_keyword_count(40)?;
    // A directory where compaction wants its output file.
    let blocker = store::with_suffix(&w.paths().filedata.shadow, store::GC_SUFFIX);
    fs::create_dir(&blocker)?;
    assert!(w.close().is_err());
    fs::remove_dir(&blocker)?;

    let w = Session::open_write(&cfg)?;
    assert_eq!(w.counts().documents, 2);
    assert_eq!(w.counts().keywords, 40);
    w.close()?;

    let mut r = Session::open_read(&cfg)?;
    assert_eq!(r.counts().keywords, 40);
    assert_eq!(r.get_filedata(2)?, titled("two"));
    Ok(())
}

#[test]
fn lowered_count_never_lets_a_dropped_slot_resurface() -> Result<()> {
    let dir = tempdir()?;
    let cfg = test_config(dir.path());
    publish(&cfg, 1, "one")?;
    publish(&cfg, 2, "two")?;

    let mut w = Session::open_write(&cfg)?;
    w.set_document_count(1)?;
    w.close()?;
    publish(&cfg, 3, "three")?;

    let mut r = Session::open_read(&cfg)?;
    assert_eq!(r.get_filedata(1)?, titled("one"));
    assert!(matches!(
        r.get_filedata(2),
        Err(slot::StoreError::NotFound(2))
    ));
    assert_eq!(r.get_filedata(3)?, titled("three"));
    Ok(())
}

#[test]
fn resumed_shard_keeps_keyword_past_published_header() -> Result<()> {
    let dir = tempdir()?;
    let cfg = test_config(dir.path());
    let open = |mode| -> Result<ShardSession> {
        ShardSession::open(&cfg, 0, mode)?.ok_or_else(|| anyhow::anyhow!("shard 0 missing"))
    };

    let mut w = open(slot::AccessMode::Write)?;
    w.put(1, b"one")?;
    w.close()?;

    {
        let mut w = open(slot::AccessMode::Write)?;
        w.put(5, b"five")?;
        w.note_document(3)?;
        // dropped without close
    }

    let mut w = open(slot::AccessMode::Write)?;
    assert_eq!(w.header().pos_num, 5);
    assert_eq!(w.header().fileindex_end, 3);
    assert_eq!(w.get(5)?, b"five");
    w.close()?;

    let mut r = open(slot::AccessMode::Read)?;
    assert_eq!(r.get(1)?, b"one");
    assert_eq!(r.get(5)?, b"five");
    Ok(())
}

#[test]
fn retried_shard_close_keeps_keyword_after_failed_compaction() -> Result<()> {
    let dir = tempdir()?;
    let cfg = test_config(dir.path());
    let open = |mode| -> Result<ShardSession> {
        ShardSession::open(&cfg, 2, mode)?.ok_or_else(|| anyhow::anyhow!("shard 2 missing"))
    };
    let paths = ShardPaths::new(&cfg.base_dir, 2);

    let mut w = open(slot::AccessMode::Write)?;
    w.put(7, b"seven")?;
    let blocker = store::with_suffix(&paths.data.shadow, store::GC_SUFFIX);
    fs::create_dir(&blocker)?;
    assert!(w.close().is_err());
    assert!(!paths.data.primary.exists());
    fs::remove_dir(&blocker)?;

    let header = open(slot::AccessMode::Write)?.close()?;
    assert_eq!(header.pos_num, 7);
    assert_eq!(open(slot::AccessMode::Read)?.get(7)?, b"seven");
    Ok(())
}

// --------------------- Shadow primitives ---------------------

#[test]
fn prepare_shadow_copies_or_resumes() -> Result<()> {
    let dir = tempdir()?;
    let file = ManagedFile::new(dir.path().join("score"));
    fs::write(&file.primary, b"primary")?;

    assert!(!prepare_shadow(&file, true)?);
    assert_eq!(fs::read(&file.shadow)?, b"primary");
    assert!(!file.partial().exists());

    fs::write(&file.shadow, b"edited")?;
    assert!(prepare_shadow(&file, false)?);
    assert_eq!(fs::read(&file.shadow)?, b"edited");
    Ok(())
}

#[test]
fn prepare_shadow_ignores_partial_copy() -> Result<()> {
    let dir = tempdir()?;
    let file = ManagedFile::new(dir.path().join("size"));
    fs::write(&file.primary, b"abcdef")?;
    fs::write(file.partial(), b"ab")?;

    assert!(!prepare_shadow(&file, false)?);
    assert_eq!(fs::read(&file.shadow)?, b"abcdef");
    assert!(!file.partial().exists());
    Ok(())
}

#[test]
fn prepare_shadow_of_missing_primary_is_empty() -> Result<()> {
    let dir = tempdir()?;
    let file = ManagedFile::new(dir.path().join("urllen"));
    assert!(!prepare_shadow(&file, false)?);
    assert_eq!(fs::read(&file.shadow)?, Vec::<u8>::new());
    assert!(!file.primary.exists());
    Ok(())
}

#[test]
fn promote_and_discard() -> Result<()> {
    let dir = tempdir()?;
    let file = ManagedFile::new(dir.path().join("domainid"));
    assert!(!promote(&file)?);

    fs::write(&file.shadow, b"v1")?;
    assert!(promote(&file)?);
    assert_eq!(fs::read(&file.primary)?, b"v1");
    assert!(!file.shadow.exists());

    fs::write(&file.shadow, b"v2")?;
    fs::write(file.partial(), b"v")?;
    fs::write(store::with_suffix(&file.shadow, store::GC_SUFFIX), b"gc")?;
    discard(&file)?;
    assert!(stale_shadows(dir.path())?.is_empty());
    assert_eq!(fs::read(&file.primary)?, b"v1");
    discard(&file)?;
    Ok(())
}

#[test]
fn stale_shadows_scans_base_and_pos() -> Result<()> {
    let dir = tempdir()?;
    let base = dir.path();
    fs::create_dir(base.join(POS_DIR))?;
    for name in ["filedata", "filedata_tmp", "score_tmp.partial", "pos/3_tmp", "pos/3_index_tmp.gc", "pos/3"] {
        fs::write(base.join(name), b"")?;
    }
    assert_eq!(
        stale_shadows(base)?,
        vec![
            base.join("filedata_tmp"),
            base.join("pos/3_index_tmp.gc"),
            base.join("pos/3_tmp"),
            base.join("score_tmp.partial"),
        ]
    );
    assert!(stale_shadows(base.join("missing"))?.is_empty());
    Ok(())
}

// --------------------- Count files ---------------------

#[test]
fn count_files_roundtrip_and_validation() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("filenum");
    assert_eq!(read_count(&path)?, 0);

    write_count(&path, 1234, true)?;
    assert_eq!(read_count(&path)?, 1234);
    assert_eq!(fs::read(&path)?, 1234i32.to_le_bytes());

    assert!(write_count(&path, u64::from(u32::MAX), false).is_err());
    assert_eq!(read_count(&path)?, 1234);

    fs::write(&path, [1u8, 0])?;
    assert!(read_count(&path).is_err());
    fs::write(&path, (-5i32).to_le_bytes())?;
    assert!(read_count(&path).is_err());
    Ok(())
}

#[test]
fn writer_prefers_count_shadows() -> Result<()> {
    let dir = tempdir()?;
    let cfg = test_config(dir.path());
    Session::open_write(&cfg)?.close()?;

    let paths = BasePaths::new(&cfg.base_dir);
    write_count(&paths.filenum.shadow, 9, false)?;

    assert_eq!(Session::open_read(&cfg)?.counts().documents, 0);
    let w = Session::open_write(&cfg)?;
    assert_eq!(w.counts().documents, 9);
    w.close()?;
    assert_eq!(read_count(&paths.filenum.primary)?, 9);
    Ok(())
}
