use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::{Result, StoreError};

/// Width in bytes of one entry in a slot size or slot offset file.
pub const SLOT_WIDTH: u64 = 4;

/// Computes the byte offset of element `id` in a dense array of
/// `item_width`-byte elements.
///
/// Fails with [`StoreError::OffsetOverflow`] instead of wrapping when
/// `item_width * id` does not fit in a signed 64-bit file offset.
pub fn slot_offset(item_width: u64, id: u64) -> Result<u64> {
    match item_width.checked_mul(id) {
        Some(offset) if offset <= i64::MAX as u64 => Ok(offset),
        _ => Err(StoreError::OffsetOverflow {
            id,
            width: item_width,
        }),
    }
}

/// Location and length of one blob in a [`BlobLog`](crate::BlobLog).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotRecord {
    /// Blob length in bytes. `<= 0` means absent.
    pub size: i32,
    /// Byte offset of the blob in the data file.
    pub offset: i32,
}

impl SlotRecord {
    /// The zeroed slot written by deletes.
    pub const EMPTY: SlotRecord = SlotRecord { size: 0, offset: 0 };

    /// Returns `true` if the slot points at a blob.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.size > 0
    }
}

/// Maps a dense integer ID to a [`SlotRecord`] stored across two files.
///
/// The size of ID `i` lives at byte `i * SLOT_WIDTH` of the size file and its
/// offset at the same position of the offset file. The table knows nothing
/// about what the blobs contain; it only does the arithmetic and the bounds
/// checks.
///
/// `max_id` is the store's recorded element count: IDs above it are reported
/// as [`StoreError::NotFound`] without touching the files.
pub struct SlotTable<F> {
    sizes: F,
    offsets: F,
    max_id: u64,
}

impl<F: Read + Write + Seek> SlotTable<F> {
    /// Wraps an already-open size file and offset file.
    pub fn new(sizes: F, offsets: F, max_id: u64) -> Self {
        Self {
            sizes,
            offsets,
            max_id,
        }
    }

    /// Returns the highest ID `get` will look up.
    #[must_use]
    pub fn max_id(&self) -> u64 {
        self.max_id
    }

    /// Updates the highest ID `get` will look up.
    pub fn set_max_id(&mut self, max_id: u64) {
        self.max_id = max_id;
    }

    /// Reads the slot for `id`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] if `id > max_id` or either entry lies past
    ///   the end of its file.
    /// - [`StoreError::OffsetOverflow`] if the entry cannot be addressed.
    pub fn get(&mut self, id: u64) -> Result<SlotRecord> {
        if id > self.max_id {
            return Err(StoreError::NotFound(id));
        }
        let size = self.read_size(id)?.ok_or(StoreError::NotFound(id))?;
        let offset = self.read_offset(id)?.ok_or(StoreError::NotFound(id))?;
        Ok(SlotRecord { size, offset })
    }

    /// Reads only the size entry for `id`, ignoring `max_id`.
    ///
    /// Returns `Ok(None)` when the entry lies past EOF.
    pub fn read_size(&mut self, id: u64) -> Result<Option<i32>> {
        let pos = slot_offset(SLOT_WIDTH, id)?;
        read_i32_at(&mut self.sizes, pos)
    }

    /// Reads only the offset entry for `id`, ignoring `max_id`.
    ///
    /// Returns `Ok(None)` when the entry lies past EOF.
    pub fn read_offset(&mut self, id: u64) -> Result<Option<i32>> {
        let pos = slot_offset(SLOT_WIDTH, id)?;
        read_i32_at(&mut self.offsets, pos)
    }

    /// Overwrites the slot for `id` in place. Writing past EOF extends both
    /// files; the gap reads back as empty slots.
    pub fn put(&mut self, id: u64, record: SlotRecord) -> Result<()> {
        let pos = slot_offset(SLOT_WIDTH, id)?;
        write_i32_at(&mut self.sizes, pos, record.size)?;
        write_i32_at(&mut self.offsets, pos, record.offset)?;
        Ok(())
    }

    /// Zeroes both the size and the offset of `id`.
    pub fn clear(&mut self, id: u64) -> Result<()> {
        self.put(id, SlotRecord::EMPTY)
    }

    /// Zeroes only the size of `id`; the stale offset is reset by compaction.
    pub fn clear_size(&mut self, id: u64) -> Result<()> {
        let pos = slot_offset(SLOT_WIDTH, id)?;
        write_i32_at(&mut self.sizes, pos, 0)
    }

    /// Flushes both files.
    pub fn flush(&mut self) -> Result<()> {
        self.sizes.flush()?;
        self.offsets.flush()?;
        Ok(())
    }

    /// Returns the underlying `(sizes, offsets)` handles.
    pub fn into_inner(self) -> (F, F) {
        (self.sizes, self.offsets)
    }
}

/// Reads one little-endian `i32` at `pos`; a short read at EOF yields `None`.
fn read_i32_at<R: Read + Seek>(r: &mut R, pos: u64) -> Result<Option<i32>> {
    r.seek(SeekFrom::Start(pos))?;
    match r.read_i32::<LittleEndian>() {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(StoreError::Io(e)),
    }
}

fn write_i32_at<W: Write + Seek>(w: &mut W, pos: u64, value: i32) -> Result<()> {
    w.seek(SeekFrom::Start(pos))?;
    w.write_i32::<LittleEndian>(value)?;
    Ok(())
}
