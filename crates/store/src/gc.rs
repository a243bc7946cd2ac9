//! Offline compaction of one slot store.
//!
//! Rewrites the data file and the offset file so that only live blobs remain,
//! packed contiguously in ID order. Sizes do not change, so the size file is
//! only truncated to `total + 1` entries: a slot past `total` has no offset
//! after the rewrite and must not keep a size that would make it look live.
//!
//! Outputs are written beside the inputs with a `.gc` suffix, synced, then
//! renamed over the inputs. Any failure removes the `.gc` files and leaves
//! the inputs as they were.

use byteorder::{LittleEndian, WriteBytesExt};
use slot::{slot_offset, BlobLog, Result, SlotTable, StoreError, SLOT_WIDTH};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Suffix of in-progress compaction outputs.
pub const GC_SUFFIX: &str = ".gc";

/// The three files of one slot store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionPaths {
    pub data: PathBuf,
    pub sizes: PathBuf,
    pub offsets: PathBuf,
}

impl CompactionPaths {
    fn gc_data(&self) -> PathBuf {
        with_suffix(&self.data, GC_SUFFIX)
    }

    fn gc_offsets(&self) -> PathBuf {
        with_suffix(&self.offsets, GC_SUFFIX)
    }
}

/// What a compaction pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionStats {
    /// Slots whose blob was copied.
    pub live: u64,
    /// Slots with size `<= 0` whose offset was reset.
    pub dropped: u64,
    /// Slots past `total` that still had a positive size.
    pub orphaned: u64,
    pub bytes_before: u64,
    pub bytes_after: u64,
}

/// Options for one compaction pass.
#[derive(Debug, Clone, Copy)]
pub struct CompactionOptions {
    /// Highest ID to carry over; IDs `1..=total` are visited.
    pub total: u64,
    /// Bytes at the front of the data file copied verbatim (shard header).
    pub header_len: u64,
    /// Per-blob size cap.
    pub cap: usize,
    /// fsync outputs before renaming.
    pub sync: bool,
}

/// Compacts the store at `paths`.
///
/// For every ID in `1..=total` with a positive size, the blob is copied to
/// the new data file and its new offset recorded; every other slot (and slot
/// 0) gets offset 0.
///
/// # Errors
///
/// Any I/O error, or a live slot whose offset is missing, oversized or
/// truncated, aborts the pass. The `.gc` outputs are deleted and the inputs
/// remain authoritative.
pub fn compact(paths: &CompactionPaths, opts: CompactionOptions) -> Result<CompactionStats> {
    info!(
        data = %paths.data.display(),
        total = opts.total,
        "compaction started"
    );

    let result = rewrite(paths, opts);
    match result {
        Ok(stats) => {
            info!(
                data = %paths.data.display(),
                live = stats.live,
                dropped = stats.dropped,
                orphaned = stats.orphaned,
                bytes_before = stats.bytes_before,
                bytes_after = stats.bytes_after,
                "compaction finished"
            );
            Ok(stats)
        }
        Err(e) => {
            for p in [paths.gc_data(), paths.gc_offsets()] {
                if let Err(rm) = fs::remove_file(&p) {
                    if rm.kind() != std::io::ErrorKind::NotFound {
                        warn!(path = %p.display(), error = %rm, "failed to remove compaction output");
                    }
                }
            }
            Err(e)
        }
    }
}

fn rewrite(paths: &CompactionPaths, opts: CompactionOptions) -> Result<CompactionStats> {
    let mut table = SlotTable::new(
        open_read(&paths.sizes)?,
        open_read(&paths.offsets)?,
        opts.total,
    );
    let mut old = BlobLog::new(open_read(&paths.data)?, opts.cap);
    let bytes_before = old.len()?;

    let gc_data = paths.gc_data();
    let gc_offsets = paths.gc_offsets();
    let mut data_out = BufWriter::new(create_truncate(&gc_data)?);
    let mut offsets_out = BufWriter::new(create_truncate(&gc_offsets)?);

    // Header, zero-padded if the input is shorter.
    let mut header = Vec::with_capacity(opts.header_len as usize);
    {
        let file = old.get_mut();
        file.seek(SeekFrom::Start(0))?;
        file.take(opts.header_len).read_to_end(&mut header)?;
    }
    header.resize(opts.header_len as usize, 0);
    data_out.write_all(&header)?;
    let mut pos = opts.header_len;

    let mut stats = CompactionStats {
        bytes_before,
        ..CompactionStats::default()
    };

    // Slot 0 is never a valid ID.
    offsets_out.write_i32::<LittleEndian>(0)?;

    for id in 1..=opts.total {
        let size = table.read_size(id)?.unwrap_or(0);
        if size <= 0 {
            offsets_out.write_i32::<LittleEndian>(0)?;
            stats.dropped += 1;
            continue;
        }
        let offset = table.read_offset(id)?.ok_or_else(|| {
            StoreError::MalformedRecord(format!("id {id} has size {size} but no offset"))
        })?;
        let blob = old.read_at(offset, size)?;
        let new_offset = i32::try_from(pos).map_err(|_| StoreError::LogOverflow(pos))?;
        data_out.write_all(&blob)?;
        offsets_out.write_i32::<LittleEndian>(new_offset)?;
        pos += blob.len() as u64;
        stats.live += 1;
    }
    stats.bytes_after = pos;

    finish_output(data_out, opts.sync)?;
    finish_output(offsets_out, opts.sync)?;
    drop(table);
    drop(old);

    // Valid against both the old and the new offsets, so it goes first.
    stats.orphaned = truncate_sizes(&paths.sizes, opts.total, opts.sync)?;
    if stats.orphaned > 0 {
        warn!(
            sizes = %paths.sizes.display(),
            total = opts.total,
            orphaned = stats.orphaned,
            "dropping live-looking slots past the recorded total"
        );
    }

    fs::rename(&gc_offsets, &paths.offsets)?;
    fs::rename(&gc_data, &paths.data)?;
    if opts.sync {
        sync_parent(&paths.data);
    }
    Ok(stats)
}

fn finish_output(mut w: BufWriter<File>, sync: bool) -> Result<()> {
    w.flush()?;
    let file = w.into_inner().map_err(|e| e.into_error())?;
    if sync {
        file.sync_all()?;
    }
    Ok(())
}

/// Cuts the size file down to entries `0..=total`. Returns how many of the
/// removed entries had a positive size.
fn truncate_sizes(path: &Path, total: u64, sync: bool) -> Result<u64> {
    let entries = total
        .checked_add(1)
        .ok_or(StoreError::OffsetOverflow {
            id: total,
            width: SLOT_WIDTH,
        })?;
    let keep = slot_offset(SLOT_WIDTH, entries)?;
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    if file.metadata()?.len() <= keep {
        return Ok(0);
    }

    let mut tail = Vec::new();
    file.seek(SeekFrom::Start(keep))?;
    file.read_to_end(&mut tail)?;
    let orphaned = tail
        .chunks_exact(SLOT_WIDTH as usize)
        .filter(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]) > 0)
        .count() as u64;

    file.set_len(keep)?;
    if sync {
        file.sync_all()?;
    }
    Ok(orphaned)
}

fn open_read(path: &Path) -> Result<File> {
    Ok(OpenOptions::new().read(true).open(path)?)
}

fn create_truncate(path: &Path) -> Result<File> {
    Ok(OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?)
}

/// Appends `suffix` to the final path component.
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

fn sync_parent(path: &Path) {
    let Some(parent) = path.parent() else {
        return;
    };
    if let Err(e) = File::open(parent).and_then(|d| d.sync_all()) {
        warn!(dir = %parent.display(), error = %e, "directory sync failed");
    }
}
