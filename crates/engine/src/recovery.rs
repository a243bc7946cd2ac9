//! Shadow lifecycle: materialize, promote, discard, and find leftovers.
//!
//! A shadow is created by copying the primary to `<shadow>.partial`, syncing
//! it, and renaming it to `<shadow>`. A crash mid-copy therefore leaves only
//! a `.partial` file, never a truncated shadow that a later writer would
//! resume from.
use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use store::GC_SUFFIX;
use tracing::{debug, warn};

use crate::paths::{ManagedFile, PARTIAL_SUFFIX, POS_DIR, SHADOW_SUFFIX};

/// Makes sure `file.shadow` exists, copying the primary if needed.
///
/// Returns `true` if an existing shadow was resumed instead of copied.
pub fn prepare_shadow(file: &ManagedFile, sync: bool) -> Result<bool> {
    if file.shadow.exists() {
        debug!(shadow = %file.shadow.display(), "resuming from existing shadow");
        return Ok(true);
    }

    let partial = file.partial();
    match fs::copy(&file.primary, &partial) {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            File::create(&partial)
                .with_context(|| format!("failed to create {}", partial.display()))?;
        }
        Err(e) => {
            return Err(e).with_context(|| {
                format!(
                    "failed to copy {} to {}",
                    file.primary.display(),
                    partial.display()
                )
            })
        }
    }
    if sync {
        File::open(&partial)
            .and_then(|f| f.sync_all())
            .with_context(|| format!("failed to sync {}", partial.display()))?;
    }
    fs::rename(&partial, &file.shadow)
        .with_context(|| format!("failed to rename {} into place", partial.display()))?;
    Ok(false)
}

/// Renames the shadow over the primary. A missing shadow is not an error: it
/// was either never created or already promoted by an earlier attempt.
pub fn promote(file: &ManagedFile) -> Result<bool> {
    match fs::rename(&file.shadow, &file.primary) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| {
            format!(
                "failed to promote {} to {}",
                file.shadow.display(),
                file.primary.display()
            )
        }),
    }
}

/// Deletes the shadow and any staging leftovers. The primary is untouched.
pub fn discard(file: &ManagedFile) -> Result<()> {
    for p in [
        file.shadow.clone(),
        file.partial(),
        store::with_suffix(&file.shadow, GC_SUFFIX),
    ] {
        match fs::remove_file(&p) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| format!("failed to remove {}", p.display()))
            }
        }
    }
    Ok(())
}

/// Opens a file for a session.
///
/// Write mode opens read-write. Read mode opens read-only, creating an empty
/// file first if the primary is missing.
pub fn open_file(path: &Path, write: bool) -> Result<File> {
    if write {
        return OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("failed to open {}", path.display()));
    }
    if !path.exists() {
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    }
    OpenOptions::new()
        .read(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))
}

/// Lists shadow, staging and compaction leftovers in `base_dir` and its
/// `pos/` subdirectory, sorted by path.
///
/// Outside a write session this list should be empty; anything here belongs
/// to a writer that never closed.
pub fn stale_shadows<P: AsRef<Path>>(base_dir: P) -> Result<Vec<PathBuf>> {
    let base_dir = base_dir.as_ref();
    let mut found = Vec::new();
    for dir in [base_dir.to_path_buf(), base_dir.join(POS_DIR)] {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => {
                return Err(e).with_context(|| format!("failed to list {}", dir.display()))
            }
        };
        for entry in entries.flatten() {
            let p = entry.path();
            if let Some(name) = p.file_name().and_then(|n| n.to_str()) {
                if name.ends_with(SHADOW_SUFFIX)
                    || name.ends_with(PARTIAL_SUFFIX)
                    || name.ends_with(GC_SUFFIX)
                {
                    found.push(p);
                }
            }
        }
    }
    found.sort();
    Ok(found)
}

/// Fsyncs a directory so renames inside it are durable. Failures are logged
/// and ignored.
pub fn sync_dir(dir: &Path) {
    match File::open(dir).and_then(|d| d.sync_all()) {
        Ok(()) => {}
        Err(e) => warn!(dir = %dir.display(), error = %e, "directory sync failed"),
    }
}
