//! Fixed-width attribute arrays: per document (`size`, `score`, ...) and per
//! keyword (`keyword_totalnum`, `keyword_docsnum`).
//!
//! Element `id` lives at byte `id * T::WIDTH`. Unlike the slot stores there
//! is no indirection and no compaction: a write overwrites in place (in the
//! session's shadow).
use slot::{slot_offset, AccessMode, Result, StoreError};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;

/// A fixed-width little-endian value stored in an attribute array.
pub trait Element: Copy + Default + std::fmt::Debug {
    /// Bytes per element.
    const WIDTH: u64;

    fn from_le(bytes: &[u8]) -> Self;

    fn to_le(self) -> Vec<u8>;
}

impl Element for i32 {
    const WIDTH: u64 = 4;

    fn from_le(bytes: &[u8]) -> Self {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&bytes[..4]);
        i32::from_le_bytes(buf)
    }

    fn to_le(self) -> Vec<u8> {
        self.to_le_bytes().to_vec()
    }
}

impl Element for f64 {
    const WIDTH: u64 = 8;

    fn from_le(bytes: &[u8]) -> Self {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&bytes[..8]);
        f64::from_le_bytes(buf)
    }

    fn to_le(self) -> Vec<u8> {
        self.to_le_bytes().to_vec()
    }
}

/// One dense array of `T`, indexed by document or keyword ID.
pub struct FixedArray<T, F = File> {
    file: F,
    mode: AccessMode,
    _elem: PhantomData<T>,
}

impl<T: Element, F: Read + Write + Seek> FixedArray<T, F> {
    pub fn new(file: F, mode: AccessMode) -> Self {
        Self {
            file,
            mode,
            _elem: PhantomData,
        }
    }

    /// Reads element `id`. Past EOF is [`StoreError::NotFound`].
    pub fn get(&mut self, id: u64) -> Result<T> {
        let pos = slot_offset(T::WIDTH, id)?;
        self.file.seek(SeekFrom::Start(pos))?;
        let mut buf = vec![0u8; T::WIDTH as usize];
        match self.file.read_exact(&mut buf) {
            Ok(()) => Ok(T::from_le(&buf)),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(StoreError::NotFound(id)),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    /// Overwrites element `id`, extending the file with zeros if needed.
    pub fn put(&mut self, id: u64, value: T) -> Result<()> {
        self.mode.ensure_writable()?;
        let pos = slot_offset(T::WIDTH, id)?;
        self.file.seek(SeekFrom::Start(pos))?;
        self.file.write_all(&value.to_le())?;
        Ok(())
    }

    /// Reads elements `0..=count`. A short file is padded with
    /// `T::default()`.
    pub fn load(&mut self, count: u64) -> Result<Vec<T>> {
        let n = count
            .checked_add(1)
            .ok_or(StoreError::OffsetOverflow {
                id: count,
                width: T::WIDTH,
            })?;
        let want = slot_offset(T::WIDTH, n)?;
        self.file.seek(SeekFrom::Start(0))?;
        let mut bytes = Vec::new();
        (&mut self.file).take(want).read_to_end(&mut bytes)?;

        let width = T::WIDTH as usize;
        let mut out: Vec<T> = bytes.chunks_exact(width).map(T::from_le).collect();
        out.resize(n as usize, T::default());
        Ok(out)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> F {
        self.file
    }
}

/// The attribute arrays of a base directory.
pub struct Attributes<F = File> {
    pub size: FixedArray<i32, F>,
    pub domainid: FixedArray<i32, F>,
    pub score: FixedArray<f64, F>,
    pub filekeywordnum: FixedArray<i32, F>,
    pub urllen: FixedArray<i32, F>,
    /// Occurrences of each keyword across all documents.
    pub keyword_totalnum: FixedArray<i32, F>,
    /// Documents containing each keyword.
    pub keyword_docsnum: FixedArray<i32, F>,
}

impl<F: Read + Write + Seek> Attributes<F> {
    pub fn flush(&mut self) -> Result<()> {
        self.size.flush()?;
        self.domainid.flush()?;
        self.score.flush()?;
        self.filekeywordnum.flush()?;
        self.urllen.flush()?;
        self.keyword_totalnum.flush()?;
        self.keyword_docsnum.flush()
    }

    /// Returns the files in field order.
    pub fn into_files(self) -> [F; 7] {
        [
            self.size.into_inner(),
            self.domainid.into_inner(),
            self.score.into_inner(),
            self.filekeywordnum.into_inner(),
            self.urllen.into_inner(),
            self.keyword_totalnum.into_inner(),
            self.keyword_docsnum.into_inner(),
        ]
    }
}
