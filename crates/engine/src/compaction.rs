//! Session close and abort.
//!
//! Close runs, in order: flush and sync every shadow, write the count
//! shadows, compact the filedata shadow, then rename each shadow over its
//! primary. A failure before the renames leaves every shadow in place and
//! every primary untouched, so the caller can open a new write session,
//! which resumes from those shadows (counts included), and close again.
use anyhow::{Context, Result};
use std::fs::File;
use store::{compact, CompactionOptions};
use tracing::info;

use crate::recovery::{discard, promote, sync_dir};
use crate::Session;

impl Session {
    /// Ends the session.
    ///
    /// A read session just releases its files. A write session compacts and
    /// promotes its shadows as described in the module docs.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing, count writing, compaction or any rename
    /// fails. Shadows that were not yet promoted remain on disk.
    pub fn close(self) -> Result<()> {
        let Session {
            mode,
            config,
            paths,
            counts,
            filedata,
            deletes,
            attrs,
            links,
        } = self;
        drop(links);

        if !mode.is_write() {
            info!(base_dir = %paths.base_dir.display(), "read session closed");
            return Ok(());
        }

        let sync = config.sync_on_close;
        let mut files: Vec<File> = Vec::new();
        let (data, sizes, offsets) = filedata.into_inner();
        files.extend([data, sizes, offsets, deletes.into_inner()]);
        files.extend(attrs.into_files());
        for f in &mut files {
            std::io::Write::flush(f)?;
            if sync {
                f.sync_all().context("failed to sync shadow file")?;
            }
        }
        drop(files);

        counts
            .save_shadows(&paths, sync)
            .context("failed to write count shadows")?;

        let stats = compact(
            &paths.filedata_compaction(),
            CompactionOptions {
                total: counts.documents,
                header_len: 0,
                cap: config.max_filedata_record,
                sync,
            },
        )
        .with_context(|| {
            format!(
                "filedata compaction failed in {}",
                paths.base_dir.display()
            )
        })?;

        let mut promoted = 0usize;
        for f in paths.managed() {
            if promote(f)? {
                promoted += 1;
            }
        }
        if sync {
            sync_dir(&paths.base_dir);
        }

        info!(
            base_dir = %paths.base_dir.display(),
            promoted,
            documents = counts.documents,
            live_records = stats.live,
            reclaimed_bytes = stats.bytes_before.saturating_sub(stats.bytes_after),
            "write session closed"
        );
        Ok(())
    }

    /// Ends a write session without publishing anything: every shadow is
    /// deleted and the primaries stay as they were. On a read session this is
    /// the same as [`close`](Session::close).
    pub fn abort(self) -> Result<()> {
        if !self.mode.is_write() {
            return self.close();
        }
        let paths = self.paths.clone();
        drop(self);
        for f in paths.managed() {
            discard(f)?;
        }
        info!(base_dir = %paths.base_dir.display(), "write session aborted");
        Ok(())
    }
}
