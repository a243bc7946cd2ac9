use byteorder::{LittleEndian, ReadBytesExt};
use slot::{BlobLog, Result, SlotTable, StoreError};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Data file name of the link graph store.
pub const LINKLIST_FILE: &str = "linklist";
/// Slot size file name of the link graph store.
pub const LINKLIST_SIZE_FILE: &str = "linklist_size";
/// Slot offset file name of the link graph store.
pub const LINKLIST_INDEX_FILE: &str = "linklist_index";

/// Read-only document-to-document link payloads.
///
/// The data file starts with the document count as one `i32`. Payloads are
/// opaque to this layer.
pub struct LinkStore<F> {
    table: SlotTable<F>,
    log: BlobLog<F>,
}

impl LinkStore<File> {
    /// Opens the link store in `dir`. Returns `Ok(None)` if any of the three
    /// files is missing.
    pub fn open(dir: &Path, cap: usize) -> Result<Option<Self>> {
        let open = |name: &str| match OpenOptions::new().read(true).open(dir.join(name)) {
            Ok(f) => Ok(Some(f)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        };
        let (Some(data), Some(sizes), Some(offsets)) = (
            open(LINKLIST_FILE)?,
            open(LINKLIST_SIZE_FILE)?,
            open(LINKLIST_INDEX_FILE)?,
        ) else {
            return Ok(None);
        };
        Self::new(data, sizes, offsets, cap).map(Some)
    }
}

impl<F: Read + Write + Seek> LinkStore<F> {
    /// Wraps already-open files, reading the document count from `data`.
    pub fn new(mut data: F, sizes: F, offsets: F, cap: usize) -> Result<Self> {
        data.seek(SeekFrom::Start(0))?;
        let count = match data.read_i32::<LittleEndian>() {
            Ok(n) => u64::try_from(n).unwrap_or(0),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => 0,
            Err(e) => return Err(StoreError::Io(e)),
        };
        Ok(Self {
            table: SlotTable::new(sizes, offsets, count),
            log: BlobLog::new(data, cap),
        })
    }

    /// Number of documents the link graph covers.
    #[must_use]
    pub fn document_count(&self) -> u64 {
        self.table.max_id()
    }

    /// Raw link payload for `doc_id`.
    pub fn get(&mut self, doc_id: u64) -> Result<Vec<u8>> {
        if doc_id == 0 {
            return Err(StoreError::NotFound(0));
        }
        let rec = self.table.get(doc_id)?;
        if !rec.is_live() {
            return Err(StoreError::NotFound(doc_id));
        }
        self.log.read_at(rec.offset, rec.size)
    }
}
