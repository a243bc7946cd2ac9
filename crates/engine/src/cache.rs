//! In-process cache of the small arrays the query path reads per result.
//!
//! Each array sits behind its own mutex and is reloaded independently, so a
//! reader can see one array from before a refresh next to another from after
//! it. Callers that need a consistent view must hold off queries while
//! [`ReadCache::refresh`] runs.
use bitmap::BitmapSnapshot;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::{Counts, Element, FixedArray, Session};

#[derive(Debug, Default)]
pub struct ReadCache {
    counts: Mutex<Option<Counts>>,
    score: Mutex<Vec<f64>>,
    size: Mutex<Vec<i32>>,
    urllen: Mutex<Vec<i32>>,
    filekeywordnum: Mutex<Vec<i32>>,
    domainid: Mutex<Vec<i32>>,
    deleted: Mutex<Option<BitmapSnapshot>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ReadCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reloads every array if `session`'s counts differ from the ones last
    /// loaded. Returns `true` if a reload happened.
    ///
    /// An array that fails to load is left empty and lookups into it return
    /// `None`.
    pub fn refresh(&self, session: &mut Session) -> bool {
        let counts = session.counts();
        if *lock(&self.counts) == Some(counts) {
            return false;
        }
        let n = counts.documents;
        debug!(documents = n, domains = counts.domains, "refreshing read cache");

        let attrs = session.attributes();
        reload(&self.score, &mut attrs.score, n, "score");
        reload(&self.size, &mut attrs.size, n, "size");
        reload(&self.urllen, &mut attrs.urllen, n, "urllen");
        reload(&self.filekeywordnum, &mut attrs.filekeywordnum, n, "filekeywordnum");
        reload(&self.domainid, &mut attrs.domainid, n, "domainid");

        {
            let mut deleted = lock(&self.deleted);
            *deleted = match session.deletion_snapshot() {
                Ok(snap) => Some(snap),
                Err(e) => {
                    warn!(error = %e, "failed to load deletion bitmap into cache");
                    None
                }
            };
        }

        *lock(&self.counts) = Some(counts);
        true
    }

    /// Counts the cache was last loaded with.
    pub fn counts(&self) -> Option<Counts> {
        *lock(&self.counts)
    }

    pub fn score(&self, doc_id: u64) -> Option<f64> {
        lookup(&self.score, doc_id)
    }

    pub fn size(&self, doc_id: u64) -> Option<i32> {
        lookup(&self.size, doc_id)
    }

    pub fn urllen(&self, doc_id: u64) -> Option<i32> {
        lookup(&self.urllen, doc_id)
    }

    pub fn filekeywordnum(&self, doc_id: u64) -> Option<i32> {
        lookup(&self.filekeywordnum, doc_id)
    }

    pub fn domainid(&self, doc_id: u64) -> Option<i32> {
        lookup(&self.domainid, doc_id)
    }

    /// `true` if the cached bitmap marks `doc_id` deleted.
    pub fn is_deleted(&self, doc_id: u64) -> bool {
        lock(&self.deleted)
            .as_ref()
            .is_some_and(|bm| bm.is_deleted(doc_id))
    }

    /// Drops IDs that are 0, beyond the cached document count, or deleted.
    /// Before the first refresh every ID is out of range.
    pub fn filter_live<I>(&self, ids: I) -> Vec<u64>
    where
        I: IntoIterator<Item = u64>,
    {
        let total = self.counts().map_or(0, |c| c.documents);
        let deleted = lock(&self.deleted);
        bitmap::filter_live(ids, total, deleted.as_ref())
    }
}

fn reload<T: Element>(slot: &Mutex<Vec<T>>, array: &mut FixedArray<T>, n: u64, name: &str) {
    let mut guard = lock(slot);
    *guard = match array.load(n) {
        Ok(values) => values,
        Err(e) => {
            warn!(array = name, error = %e, "failed to load array into cache");
            Vec::new()
        }
    };
}

fn lookup<T: Copy>(m: &Mutex<Vec<T>>, doc_id: u64) -> Option<T> {
    let idx = usize::try_from(doc_id).ok()?;
    lock(m).get(idx).copied()
}
