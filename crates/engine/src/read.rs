//! Read path: metadata, tombstone and attribute lookups, and postings fetch.
//!
//! Per-record lookups return the typed [`StoreError`] so callers can tell
//! "absent" from "corrupt" and skip one document without failing a query.
use anyhow::Result;
use bitmap::BitmapSnapshot;
use slot::StoreError;
use store::{FileData, PostingsBudget};
use tracing::warn;

use crate::{Session, ShardSession};

impl Session {
    /// Metadata for `doc_id`.
    pub fn get_filedata(&mut self, doc_id: u64) -> slot::Result<FileData> {
        self.filedata.get(doc_id)
    }

    /// `true` if `doc_id` is tombstoned.
    pub fn is_deleted(&mut self, doc_id: u64) -> slot::Result<bool> {
        self.deletes.get(doc_id)
    }

    /// In-memory copy of the tombstones for documents `0..=documents`.
    pub fn deletion_snapshot(&mut self) -> slot::Result<BitmapSnapshot> {
        let total = self.counts.documents;
        self.deletes.snapshot(total)
    }

    /// Filters `ids` down to documents a query may return: in `1..=documents`
    /// and not tombstoned.
    pub fn filter_live<I>(&mut self, ids: I) -> slot::Result<Vec<u64>>
    where
        I: IntoIterator<Item = u64>,
    {
        let snapshot = self.deletion_snapshot()?;
        Ok(bitmap::filter_live(
            ids,
            self.counts.documents,
            Some(&snapshot),
        ))
    }

    /// Gathers the postings payload of `keyword_id` from each shard in
    /// `shards`, charging every payload to `budget`.
    ///
    /// Shards are always opened read-only on their primaries, even from a
    /// write session. Missing shards and absent keywords are skipped; a
    /// corrupt payload is logged and skipped.
    ///
    /// # Errors
    ///
    /// Fails if a shard cannot be opened or the budget is exhausted (the
    /// error wraps [`StoreError::OversizedRecord`]).
    pub fn collect_postings(
        &self,
        keyword_id: u64,
        shards: &[u32],
        budget: &mut PostingsBudget,
    ) -> Result<Vec<(u32, Vec<u8>)>> {
        let mut out = Vec::new();
        for &shard_id in shards {
            let Some(mut shard) =
                ShardSession::open(&self.config, shard_id, slot::AccessMode::Read)?
            else {
                continue;
            };
            match shard.get(keyword_id) {
                Ok(bytes) => {
                    budget.charge(bytes.len())?;
                    out.push((shard_id, bytes));
                }
                Err(StoreError::NotFound(_)) => {}
                Err(e) => {
                    warn!(shard_id, keyword_id, error = %e, "skipping unreadable postings");
                }
            }
        }
        Ok(out)
    }
}
