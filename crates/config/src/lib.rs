//! # Config - engine settings
//!
//! All settings come from environment variables, each falling back to its
//! default when unset or unparsable:
//!
//! ```text
//! SHARDSTORE_DIR                  base directory          (default: "data")
//! SHARDSTORE_MAX_POSTINGS_BLOB    postings blob cap bytes (default: 16 MiB)
//! SHARDSTORE_MAX_FILEDATA_RECORD  filedata record cap     (default: 16 MiB)
//! SHARDSTORE_MAX_QUERY_BYTES      postings per query      (default: 64 MiB)
//! SHARDSTORE_SYNC                 fsync on close          (default: "true")
//! ```

use std::path::{Path, PathBuf};

/// Default postings blob cap (16 MiB).
pub const DEFAULT_MAX_POSTINGS_BLOB: usize = 16 * 1024 * 1024;
/// Default filedata record cap (16 MiB).
pub const DEFAULT_MAX_FILEDATA_RECORD: usize = 16 * 1024 * 1024;
/// Default per-query postings budget (64 MiB).
pub const DEFAULT_MAX_QUERY_BYTES: usize = 64 * 1024 * 1024;

/// Settings shared by every session opened on one base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Directory holding the store files and the `pos/` subdirectory.
    pub base_dir: PathBuf,
    pub max_postings_blob: usize,
    pub max_filedata_record: usize,
    pub max_postings_query_bytes: usize,
    /// fsync shadows, compaction outputs and count files before renaming.
    pub sync_on_close: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("data"),
            max_postings_blob: DEFAULT_MAX_POSTINGS_BLOB,
            max_filedata_record: DEFAULT_MAX_FILEDATA_RECORD,
            max_postings_query_bytes: DEFAULT_MAX_QUERY_BYTES,
            sync_on_close: true,
        }
    }
}

impl EngineConfig {
    /// Defaults rooted at `base_dir`.
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Loads the configuration from `SHARDSTORE_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads the configuration through `lookup`, which stands in for the
    /// environment.
    pub fn from_lookup<L>(lookup: L) -> Self
    where
        L: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let num = |key: &str, default: usize| {
            lookup(key)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };
        Self {
            base_dir: lookup("SHARDSTORE_DIR")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(d.base_dir),
            max_postings_blob: num("SHARDSTORE_MAX_POSTINGS_BLOB", d.max_postings_blob),
            max_filedata_record: num("SHARDSTORE_MAX_FILEDATA_RECORD", d.max_filedata_record),
            max_postings_query_bytes: num("SHARDSTORE_MAX_QUERY_BYTES", d.max_postings_query_bytes),
            sync_on_close: lookup("SHARDSTORE_SYNC")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(d.sync_on_close),
        }
    }

    pub fn with_base_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.base_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_max_postings_blob(mut self, bytes: usize) -> Self {
        self.max_postings_blob = bytes;
        self
    }

    pub fn with_max_filedata_record(mut self, bytes: usize) -> Self {
        self.max_filedata_record = bytes;
        self
    }

    pub fn with_max_postings_query_bytes(mut self, bytes: usize) -> Self {
        self.max_postings_query_bytes = bytes;
        self
    }

    pub fn with_sync_on_close(mut self, sync: bool) -> Self {
        self.sync_on_close = sync;
        self
    }
}
