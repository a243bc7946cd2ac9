//! # Deletion Bitmap
//!
//! One tombstone bit per document ID, stored in a plain byte file.
//!
//! Bit `doc_id` lives at byte `doc_id / 8`, bit `doc_id % 8` (least
//! significant bit first). The file grows lazily: any byte past EOF reads as
//! zero, so every document is "not deleted" until someone marks it.
//!
//! Two views exist:
//!
//! - [`DeletionBitmap`]: the on-disk file, with fail-on-redundant-transition
//!   `put`/`del` used by write sessions.
//! - [`BitmapSnapshot`]: an in-memory copy loaded once for the read cache and
//!   used to filter query results.
//!
//! ## Example
//!
//! ```rust
//! use bitmap::DeletionBitmap;
//! use slot::AccessMode;
//! use std::io::Cursor;
//!
//! let mut bm = DeletionBitmap::new(Cursor::new(Vec::new()), AccessMode::Write);
//! bm.put(3).unwrap();
//! assert!(bm.get(3).unwrap());
//! assert!(!bm.get(4).unwrap());
//! ```

use slot::{AccessMode, Result, StoreError};
use std::io::{self, Read, Seek, SeekFrom, Write};

/// The on-disk tombstone file for one base directory.
pub struct DeletionBitmap<F> {
    file: F,
    mode: AccessMode,
}

impl<F: Read + Write + Seek> DeletionBitmap<F> {
    /// Wraps an open bitmap file.
    pub fn new(file: F, mode: AccessMode) -> Self {
        Self { file, mode }
    }

    /// Returns the mode the bitmap was opened with.
    #[must_use]
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Returns `true` if `doc_id` is marked deleted. Bits past EOF are clear.
    pub fn get(&mut self, doc_id: u64) -> Result<bool> {
        let byte = self.read_byte(doc_id / 8)?;
        Ok(byte & bit_mask(doc_id) != 0)
    }

    /// Marks `doc_id` deleted.
    ///
    /// # Errors
    ///
    /// [`StoreError::AlreadyDeleted`] if the bit is already set,
    /// [`StoreError::ReadOnlyViolation`] outside a write session.
    pub fn put(&mut self, doc_id: u64) -> Result<()> {
        self.mode.ensure_writable()?;
        let idx = doc_id / 8;
        let byte = self.read_byte(idx)?;
        if byte & bit_mask(doc_id) != 0 {
            return Err(StoreError::AlreadyDeleted(doc_id));
        }
        self.write_byte(idx, byte | bit_mask(doc_id))
    }

    /// Clears the deleted mark on `doc_id`.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotDeleted`] if the bit is already clear,
    /// [`StoreError::ReadOnlyViolation`] outside a write session.
    pub fn del(&mut self, doc_id: u64) -> Result<()> {
        self.mode.ensure_writable()?;
        let idx = doc_id / 8;
        let byte = self.read_byte(idx)?;
        if byte & bit_mask(doc_id) == 0 {
            return Err(StoreError::NotDeleted(doc_id));
        }
        self.write_byte(idx, byte & !bit_mask(doc_id))
    }

    /// Loads the bits covering documents `0..=total` into memory.
    pub fn snapshot(&mut self, total: u64) -> Result<BitmapSnapshot> {
        self.file.seek(SeekFrom::Start(0))?;
        BitmapSnapshot::load(&mut self.file, total)
    }

    /// Flushes the bitmap file.
    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }

    /// Returns the underlying file.
    pub fn into_inner(self) -> F {
        self.file
    }

    // ---- Internal helpers ----

    fn read_byte(&mut self, idx: u64) -> Result<u8> {
        self.file.seek(SeekFrom::Start(idx))?;
        let mut buf = [0u8; 1];
        loop {
            match self.file.read(&mut buf) {
                Ok(0) => return Ok(0),
                Ok(_) => return Ok(buf[0]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(StoreError::Io(e)),
            }
        }
    }

    fn write_byte(&mut self, idx: u64, byte: u8) -> Result<()> {
        self.file.seek(SeekFrom::Start(idx))?;
        self.file.write_all(&[byte])?;
        Ok(())
    }
}

fn bit_mask(doc_id: u64) -> u8 {
    1u8 << (doc_id % 8)
}

/// In-memory copy of a deletion bitmap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitmapSnapshot {
    bytes: Vec<u8>,
}

impl BitmapSnapshot {
    /// Reads enough bytes to cover documents `0..=total`.
    ///
    /// A short file is not an error: the missing tail is treated as "nothing
    /// deleted", the same as [`DeletionBitmap::get`] past EOF.
    pub fn load<R: Read>(r: &mut R, total: u64) -> Result<Self> {
        let want = total / 8 + 1;
        let mut bytes = Vec::new();
        r.take(want).read_to_end(&mut bytes)?;
        bytes.resize(want as usize, 0);
        Ok(Self { bytes })
    }

    /// Builds a snapshot from raw bitmap bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Returns `true` if `doc_id` is marked deleted.
    #[must_use]
    pub fn is_deleted(&self, doc_id: u64) -> bool {
        usize::try_from(doc_id / 8)
            .ok()
            .and_then(|idx| self.bytes.get(idx))
            .is_some_and(|b| b & bit_mask(doc_id) != 0)
    }

    /// Number of deleted documents among `1..=total`.
    #[must_use]
    pub fn count_deleted(&self, total: u64) -> u64 {
        (1..=total).filter(|&id| self.is_deleted(id)).count() as u64
    }

    /// Size of the snapshot in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if the snapshot holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Keeps the IDs that a query may surface.
///
/// Drops ID 0, IDs greater than `total`, and IDs marked in `deleted`. With no
/// bitmap only the range check applies. Input order is preserved.
pub fn filter_live<I>(ids: I, total: u64, deleted: Option<&BitmapSnapshot>) -> Vec<u64>
where
    I: IntoIterator<Item = u64>,
{
    ids.into_iter()
        .filter(|&id| id != 0 && id <= total)
        .filter(|&id| deleted.map_or(true, |bm| !bm.is_deleted(id)))
        .collect()
}
