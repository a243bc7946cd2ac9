//! # Engine - shard directory sessions
//!
//! Ties the [`slot`], [`bitmap`] and [`store`] crates together into the
//! open/close lifecycle of one base directory.
//!
//! ## Architecture
//!
//! ```text
//! Session::open(Write)                      Session::open(Read)
//!   |                                         |
//!   v                                         v
//! copy primary -> <file>_tmp (shadow)       open primaries directly
//!   |                                         |
//!   v                                         v
//! put / del / mark_deleted on shadows       get / is_deleted / cache refresh
//!   |
//!   v
//! close(): compact filedata shadow
//!          write count shadows
//!          rename every shadow over its primary
//! ```
//!
//! Postings shards under `pos/` follow the same protocol through
//! [`ShardSession`], one shard at a time.
//!
//! ## Module Responsibilities
//!
//! | Module         | Purpose                                                 |
//! |----------------|---------------------------------------------------------|
//! | `lib.rs`       | `Session` struct, `open`, accessors, `Debug`            |
//! | [`paths`]      | file naming, primary/shadow pairs                       |
//! | [`recovery`]   | shadow copy, promotion, discard, stale shadow listing   |
//! | [`counts`]     | `filenum` / `domainnum` / `keywordnum`                  |
//! | [`attributes`] | fixed-width per-document and per-keyword arrays         |
//! | [`read`]       | metadata, bitmap and attribute lookups, postings fetch  |
//! | [`write`]      | metadata, bitmap, attribute and count mutations         |
//! | [`compaction`] | `close()` and `abort()`                                 |
//! | [`shard`]      | `ShardSession` for `pos/<shard_id>`                     |
//! | [`cache`]      | `ReadCache` of small arrays for the query path          |
//!
//! ## Crash Safety
//!
//! Readers only ever open primaries, and a writer only renames into them at
//! close. A writer that dies leaves its shadows behind; the next write
//! session resumes from them, and [`Session::abort`] throws them away.
//! [`stale_shadows`] lists what an interrupted writer left.
mod attributes;
mod cache;
mod compaction;
mod counts;
mod paths;
mod read;
mod recovery;
mod shard;
mod write;

use anyhow::{Context, Result};
use bitmap::DeletionBitmap;
use config::EngineConfig;
use slot::AccessMode;
use std::fs::File;
use std::path::Path;
use store::{LinkStore, MetadataStore};
use tracing::{info, warn};

pub use attributes::{Attributes, Element, FixedArray};
pub use cache::ReadCache;
pub use counts::{read_count, write_count, Counts};
pub use paths::{BasePaths, ManagedFile, ShardPaths, POS_DIR, SHADOW_SUFFIX};
pub use recovery::stale_shadows;
pub use shard::ShardSession;

/// An open read or write session on one base directory.
///
/// A read session sees the primaries as they were at open. A write session
/// works on private shadow copies that become visible to readers only when
/// [`close`](Session::close) succeeds.
pub struct Session {
    pub(crate) mode: AccessMode,
    pub(crate) config: EngineConfig,
    pub(crate) paths: BasePaths,
    pub(crate) counts: Counts,
    pub(crate) filedata: MetadataStore<File>,
    pub(crate) deletes: DeletionBitmap<File>,
    pub(crate) attrs: Attributes<File>,
    pub(crate) links: Option<LinkStore<File>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("mode", &self.mode)
            .field("base_dir", &self.paths.base_dir)
            .field("counts", &self.counts)
            .field("links", &self.links.is_some())
            .finish()
    }
}

impl Session {
    /// Opens a session on `config.base_dir`.
    ///
    /// # Steps
    ///
    /// 1. Read mode requires the base directory to exist; write mode creates
    ///    it and `pos/`.
    /// 2. Write mode materializes a shadow for every data file (or resumes an
    ///    existing one); read mode warns about shadows left at rest.
    /// 3. Counts are loaded, then every store is opened on the active files.
    ///
    /// # Errors
    ///
    /// Any failure to create, copy or open a required file. There is no
    /// degraded mode.
    pub fn open(config: &EngineConfig, mode: AccessMode) -> Result<Self> {
        let paths = BasePaths::new(&config.base_dir);
        let write = mode.is_write();

        if write {
            std::fs::create_dir_all(&paths.pos_dir).with_context(|| {
                format!("failed to create {}", paths.pos_dir.display())
            })?;
        } else if !paths.base_dir.is_dir() {
            anyhow::bail!(
                "base directory {} does not exist",
                paths.base_dir.display()
            );
        } else {
            let stale = stale_shadows(&paths.base_dir)?;
            if !stale.is_empty() {
                warn!(
                    base_dir = %paths.base_dir.display(),
                    count = stale.len(),
                    "shadow files from an unfinished write session are present"
                );
            }
        }

        let mut resumed = 0usize;
        if write {
            for f in paths.data_files() {
                if recovery::prepare_shadow(f, config.sync_on_close)? {
                    resumed += 1;
                }
            }
        }

        let counts = Counts::load(&paths, write)?;
        let open = |f: &ManagedFile| recovery::open_file(f.active(write), write);

        let filedata = MetadataStore::new(
            open(&paths.filedata)?,
            open(&paths.filedata_size)?,
            open(&paths.filedata_index)?,
            mode,
            config.max_filedata_record,
            counts.documents,
        );
        let deletes = DeletionBitmap::new(open(&paths.deletefile)?, mode);
        let attrs = Attributes {
            size: FixedArray::new(open(&paths.size)?, mode),
            domainid: FixedArray::new(open(&paths.domainid)?, mode),
            score: FixedArray::new(open(&paths.score)?, mode),
            filekeywordnum: FixedArray::new(open(&paths.filekeywordnum)?, mode),
            urllen: FixedArray::new(open(&paths.urllen)?, mode),
            keyword_totalnum: FixedArray::new(open(&paths.keyword_totalnum)?, mode),
            keyword_docsnum: FixedArray::new(open(&paths.keyword_docsnum)?, mode),
        };
        let links = LinkStore::open(&paths.base_dir, config.max_filedata_record)
            .context("failed to open link store")?;

        info!(
            base_dir = %paths.base_dir.display(),
            mode = ?mode,
            documents = counts.documents,
            resumed_shadows = resumed,
            "session opened"
        );

        Ok(Self {
            mode,
            config: config.clone(),
            paths,
            counts,
            filedata,
            deletes,
            attrs,
            links,
        })
    }

    /// Shorthand for [`Session::open`] in read mode.
    pub fn open_read(config: &EngineConfig) -> Result<Self> {
        Self::open(config, AccessMode::Read)
    }

    /// Shorthand for [`Session::open`] in write mode.
    pub fn open_write(config: &EngineConfig) -> Result<Self> {
        Self::open(config, AccessMode::Write)
    }

    /// Opens postings shard `shard_id` in this session's mode.
    ///
    /// Returns `Ok(None)` in read mode when the shard has no files yet.
    pub fn open_shard(&self, shard_id: u32) -> Result<Option<ShardSession>> {
        ShardSession::open(&self.config, shard_id, self.mode)
    }

    #[must_use]
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.paths.base_dir
    }

    #[must_use]
    pub fn paths(&self) -> &BasePaths {
        &self.paths
    }

    /// The counts this session started with, plus any changes it made.
    #[must_use]
    pub fn counts(&self) -> Counts {
        self.counts
    }

    /// Direct access to the metadata store.
    pub fn filedata(&mut self) -> &mut MetadataStore<File> {
        &mut self.filedata
    }

    /// Direct access to the deletion bitmap.
    pub fn deletes(&mut self) -> &mut DeletionBitmap<File> {
        &mut self.deletes
    }

    /// Direct access to the attribute arrays.
    pub fn attributes(&mut self) -> &mut Attributes<File> {
        &mut self.attrs
    }

    /// The link store, if the directory has one.
    pub fn links(&mut self) -> Option<&mut LinkStore<File>> {
        self.links.as_mut()
    }
}

#[cfg(test)]
mod tests;
