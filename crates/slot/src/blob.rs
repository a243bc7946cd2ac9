use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::{Result, StoreError};

/// Append-only byte store addressed by `(offset, len)` pairs kept elsewhere.
///
/// Writers append at end-of-file and learn the offset; readers seek and read
/// a known length. Nothing is ever reclaimed here: superseded blobs stay in
/// the file until a compaction rewrites it.
///
/// `append` is "seek to end, record position, write", so a log must only have
/// one writer at a time.
pub struct BlobLog<F> {
    file: F,
    cap: u64,
}

impl<F: Read + Write + Seek> BlobLog<F> {
    /// Wraps an open data file. `cap` bounds every blob read or written.
    pub fn new(file: F, cap: usize) -> Self {
        Self {
            file,
            cap: cap as u64,
        }
    }

    /// Returns the per-blob size cap in bytes.
    #[must_use]
    pub fn cap(&self) -> u64 {
        self.cap
    }

    /// Appends `bytes` at end-of-file and returns the offset they start at.
    ///
    /// # Errors
    ///
    /// - [`StoreError::OversizedRecord`] if `bytes` exceeds the cap.
    /// - [`StoreError::LogOverflow`] if the start offset does not fit the
    ///   `i32` stored in slot offset files.
    pub fn append(&mut self, bytes: &[u8]) -> Result<i32> {
        let len = bytes.len() as u64;
        if len > self.cap {
            return Err(StoreError::OversizedRecord {
                size: len,
                cap: self.cap,
            });
        }
        let pos = self.file.seek(SeekFrom::End(0))?;
        let offset = i32::try_from(pos).map_err(|_| StoreError::LogOverflow(pos))?;
        self.file.write_all(bytes)?;
        Ok(offset)
    }

    /// Reads exactly `len` bytes starting at `offset`.
    ///
    /// The cap is checked before anything is allocated, so a corrupted slot
    /// size cannot trigger a huge allocation.
    ///
    /// # Errors
    ///
    /// - [`StoreError::OversizedRecord`] if `len` exceeds the cap.
    /// - [`StoreError::MalformedRecord`] for a non-positive length, a negative
    ///   offset, or a blob that runs past EOF.
    pub fn read_at(&mut self, offset: i32, len: i32) -> Result<Vec<u8>> {
        if len <= 0 {
            return Err(StoreError::MalformedRecord(format!(
                "non-positive blob length {len}"
            )));
        }
        if len as u64 > self.cap {
            return Err(StoreError::OversizedRecord {
                size: len as u64,
                cap: self.cap,
            });
        }
        if offset < 0 {
            return Err(StoreError::MalformedRecord(format!(
                "negative blob offset {offset}"
            )));
        }

        self.file.seek(SeekFrom::Start(offset as u64))?;
        let mut buf = vec![0u8; len as usize];
        match self.file.read_exact(&mut buf) {
            Ok(()) => Ok(buf),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                Err(StoreError::MalformedRecord(format!(
                    "blob at offset {offset} truncated (wanted {len} bytes)"
                )))
            }
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    /// Overwrites bytes at an absolute position (used for fixed headers).
    pub fn write_at(&mut self, pos: u64, bytes: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(pos))?;
        self.file.write_all(bytes)?;
        Ok(())
    }

    /// Returns the current length of the log in bytes.
    pub fn len(&mut self) -> Result<u64> {
        Ok(self.file.seek(SeekFrom::End(0))?)
    }

    /// Returns `true` if the log holds no bytes at all.
    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Gives direct access to the data file (header reads).
    pub fn get_mut(&mut self) -> &mut F {
        &mut self.file
    }

    /// Flushes the data file.
    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }

    /// Returns the underlying data file.
    pub fn into_inner(self) -> F {
        self.file
    }
}
