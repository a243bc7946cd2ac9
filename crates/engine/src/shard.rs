//! Postings shard sessions (`pos/<shard_id>`).
//!
//! Same protocol as the base session: write mode works on shadows of the
//! shard's three files and stages the reconciled header into the shadow as
//! it goes. Close writes the final header, compacts, and promotes.
use anyhow::{Context, Result};
use config::EngineConfig;
use slot::AccessMode;
use std::fs::File;
use store::{compact, CompactionOptions, PostingsList, PostingsStore, ShardHeader, SHARD_HEADER_BYTES};
use tracing::{debug, info};

use crate::paths::ShardPaths;
use crate::recovery::{discard, open_file, prepare_shadow, promote, sync_dir};

/// An open session on one postings shard.
pub struct ShardSession {
    paths: ShardPaths,
    mode: AccessMode,
    config: EngineConfig,
    store: PostingsStore<File>,
}

impl std::fmt::Debug for ShardSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardSession")
            .field("shard_id", &self.paths.shard_id)
            .field("mode", &self.mode)
            .field("header", &self.store.header())
            .finish()
    }
}

impl ShardSession {
    /// Opens shard `shard_id` under `config.base_dir`.
    ///
    /// Read mode returns `Ok(None)` if any of the shard's files is missing.
    /// Write mode creates the shard if needed.
    pub fn open(config: &EngineConfig, shard_id: u32, mode: AccessMode) -> Result<Option<Self>> {
        let paths = ShardPaths::new(&config.base_dir, shard_id);
        let write = mode.is_write();

        if write {
            let dir = config.base_dir.join(crate::POS_DIR);
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            for f in paths.managed() {
                prepare_shadow(f, config.sync_on_close)?;
            }
        } else if !paths.primaries_exist() {
            return Ok(None);
        }

        let open = |f: &crate::ManagedFile| open_file(f.active(write), write);
        let store = PostingsStore::open(
            open(&paths.data)?,
            open(&paths.sizes)?,
            open(&paths.offsets)?,
            mode,
            config.max_postings_blob,
        )
        .with_context(|| format!("failed to open postings shard {shard_id}"))?;

        debug!(shard_id, mode = ?mode, header = ?store.header(), "shard opened");
        Ok(Some(Self {
            paths,
            mode,
            config: config.clone(),
            store,
        }))
    }

    #[must_use]
    pub fn shard_id(&self) -> u32 {
        self.paths.shard_id
    }

    #[must_use]
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// The shard header as read at open.
    #[must_use]
    pub fn header(&self) -> ShardHeader {
        self.store.header()
    }

    /// Raw postings payload for `keyword_id`.
    pub fn get(&mut self, keyword_id: u64) -> slot::Result<Vec<u8>> {
        self.store.get(keyword_id)
    }

    /// Decoded postings for `keyword_id`.
    pub fn get_list(&mut self, keyword_id: u64) -> slot::Result<PostingsList> {
        self.store.get_list(keyword_id)
    }

    pub fn put(&mut self, keyword_id: u64, bytes: &[u8]) -> slot::Result<()> {
        self.store.put(keyword_id, bytes)
    }

    /// Merges `list` into the keyword's existing postings.
    pub fn merge_list(&mut self, keyword_id: u64, list: &PostingsList) -> slot::Result<()> {
        self.store.merge_list(keyword_id, list)
    }

    pub fn del(&mut self, keyword_id: u64) -> slot::Result<()> {
        self.store.del(keyword_id)
    }

    /// Records that `doc_id` is represented in this shard.
    pub fn note_document(&mut self, doc_id: u32) -> slot::Result<()> {
        self.store.note_document(doc_id)
    }

    pub fn set_keyword_count(&mut self, count: u64) -> slot::Result<()> {
        self.store.set_keyword_count(count)
    }

    /// Ends the session, returning the header now on disk.
    ///
    /// Write mode writes the reconciled header into the shadow, compacts the
    /// shadow, then promotes the three files. On error the shadows stay.
    pub fn close(self) -> Result<ShardHeader> {
        let ShardSession {
            paths,
            mode,
            config,
            mut store,
        } = self;
        if !mode.is_write() {
            return Ok(store.header());
        }

        let header = store
            .finish()
            .with_context(|| format!("failed to write header of shard {}", paths.shard_id))?;
        let (data, sizes, offsets) = store.into_inner();
        if config.sync_on_close {
            for f in [&data, &sizes, &offsets] {
                f.sync_all().context("failed to sync shard shadow")?;
            }
        }
        drop((data, sizes, offsets));

        let stats = compact(
            &paths.compaction(),
            CompactionOptions {
                total: header.keyword_count(),
                header_len: SHARD_HEADER_BYTES,
                cap: config.max_postings_blob,
                sync: config.sync_on_close,
            },
        )
        .with_context(|| format!("compaction of shard {} failed", paths.shard_id))?;

        for f in paths.managed() {
            promote(f)?;
        }
        if config.sync_on_close {
            if let Some(dir) = paths.data.primary.parent() {
                sync_dir(dir);
            }
        }

        info!(
            shard_id = paths.shard_id,
            pos_num = header.pos_num,
            fileindex_start = header.fileindex_start,
            fileindex_end = header.fileindex_end,
            live = stats.live,
            "shard closed"
        );
        Ok(header)
    }

    /// Ends a write session by deleting the shard's shadows.
    pub fn abort(self) -> Result<()> {
        let ShardSession { paths, mode, store, .. } = self;
        drop(store);
        if mode.is_write() {
            for f in paths.managed() {
                discard(f)?;
            }
            info!(shard_id = paths.shard_id, "shard session aborted");
        }
        Ok(())
    }
}
