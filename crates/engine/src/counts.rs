//! # Counts - per-directory totals
//!
//! `filenum`, `domainnum` and `keywordnum` each hold a single little-endian
//! `i32`. A missing file means 0. They are never updated in place: every
//! change a write session makes is written to the count shadows (write
//! `.partial`, rename), close rewrites them with fsync, and they are then
//! promoted with the rest of the session's files.
use anyhow::{bail, Context, Result};
use std::fs::{self, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;

use crate::paths::{BasePaths, ManagedFile};

/// The three totals of one base directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    /// Highest document ID (`filenum`).
    pub documents: u64,
    /// Number of domains (`domainnum`).
    pub domains: u64,
    /// Number of keywords (`keywordnum`).
    pub keywords: u64,
}

impl Counts {
    /// Reads the counts a session should start from. A write session prefers
    /// count shadows left by an earlier, unfinished writer.
    pub fn load(paths: &BasePaths, write: bool) -> Result<Self> {
        let read = |f: &ManagedFile| {
            if write && f.shadow.exists() {
                read_count(&f.shadow)
            } else {
                read_count(&f.primary)
            }
        };
        Ok(Self {
            documents: read(&paths.filenum)?,
            domains: read(&paths.domainnum)?,
            keywords: read(&paths.keywordnum)?,
        })
    }

    /// Writes every count to its shadow.
    pub fn save_shadows(&self, paths: &BasePaths, sync: bool) -> Result<()> {
        write_count(&paths.filenum.shadow, self.documents, sync)?;
        write_count(&paths.domainnum.shadow, self.domains, sync)?;
        write_count(&paths.keywordnum.shadow, self.keywords, sync)?;
        Ok(())
    }
}

/// Reads one count file. Missing means 0; a short or negative value is an
/// error.
pub fn read_count(path: &Path) -> Result<u64> {
    let mut f = match fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => {
            return Err(e).with_context(|| format!("failed to open count file {}", path.display()))
        }
    };
    let mut buf = [0u8; 4];
    f.read_exact(&mut buf)
        .with_context(|| format!("count file {} is truncated", path.display()))?;
    let value = i32::from_le_bytes(buf);
    if value < 0 {
        bail!("count file {} holds negative value {}", path.display(), value);
    }
    Ok(value as u64)
}

/// Atomically replaces `path` with a single `i32` count.
pub fn write_count(path: &Path, value: u64, sync: bool) -> Result<()> {
    let Ok(value) = i32::try_from(value) else {
        bail!("count {} for {} exceeds i32::MAX", value, path.display());
    };
    let tmp_path = store::with_suffix(path, crate::paths::PARTIAL_SUFFIX);
    {
        let mut f = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)
            .with_context(|| format!("failed to create {}", tmp_path.display()))?;
        f.write_all(&value.to_le_bytes())?;
        f.flush()?;
        if sync {
            f.sync_all()?;
        }
    }
    fs::rename(&tmp_path, path)
        .with_context(|| format!("failed to rename {} into place", tmp_path.display()))?;
    Ok(())
}
