//! Write path: metadata, tombstone, attribute and count mutations.
//!
//! Every call here fails with [`slot::StoreError::ReadOnlyViolation`] in a
//! read session. Changes land in the session's shadows only. Count changes
//! are mirrored into the count shadows as they happen, so a writer that
//! resumes those shadows also resumes the bounds that make its records
//! visible.
use anyhow::{Context, Result};
use store::FileData;

use crate::{Counts, Session};

impl Session {
    /// Stores metadata for `doc_id`, raising the document count if `doc_id`
    /// lies beyond it.
    pub fn put_filedata(&mut self, doc_id: u64, record: &FileData) -> Result<()> {
        self.filedata.put(doc_id, record)?;
        if doc_id > self.counts.documents {
            self.set_document_count(doc_id)?;
        }
        Ok(())
    }

    /// Hides the metadata for `doc_id` until compaction reclaims it.
    pub fn del_filedata(&mut self, doc_id: u64) -> slot::Result<()> {
        self.filedata.del(doc_id)
    }

    /// Tombstones `doc_id`. Fails if it already is.
    pub fn mark_deleted(&mut self, doc_id: u64) -> slot::Result<()> {
        self.deletes.put(doc_id)
    }

    /// Clears the tombstone on `doc_id`. Fails if there is none.
    pub fn unmark_deleted(&mut self, doc_id: u64) -> slot::Result<()> {
        self.deletes.del(doc_id)
    }

    pub fn set_document_count(&mut self, count: u64) -> Result<()> {
        self.mode.ensure_writable()?;
        self.stage_counts(Counts {
            documents: count,
            ..self.counts
        })?;
        self.filedata.set_document_count(count);
        Ok(())
    }

    pub fn set_domain_count(&mut self, count: u64) -> Result<()> {
        self.mode.ensure_writable()?;
        self.stage_counts(Counts {
            domains: count,
            ..self.counts
        })
    }

    pub fn set_keyword_count(&mut self, count: u64) -> Result<()> {
        self.mode.ensure_writable()?;
        self.stage_counts(Counts {
            keywords: count,
            ..self.counts
        })
    }

    /// Writes `counts` to the count shadows, then adopts them. Unsynced; close
    /// rewrites them with the configured fsync policy.
    fn stage_counts(&mut self, counts: Counts) -> Result<()> {
        counts
            .save_shadows(&self.paths, false)
            .context("failed to stage count shadows")?;
        self.counts = counts;
        Ok(())
    }
}
