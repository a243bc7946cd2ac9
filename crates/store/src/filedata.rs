use slot::{AccessMode, BlobLog, Result, SlotRecord, SlotTable, StoreError};
use std::io::{Read, Seek, Write};

use crate::format::FileData;

/// Document-ID-addressed metadata records.
///
/// The data file has no header. `del` only zeroes the slot size; the stale
/// offset and the bytes stay until compaction.
pub struct MetadataStore<F> {
    table: SlotTable<F>,
    log: BlobLog<F>,
    mode: AccessMode,
}

impl<F: Read + Write + Seek> MetadataStore<F> {
    /// Wraps the `filedata`, `filedata_size` and `filedata_index` files.
    /// `document_count` bounds `get`.
    pub fn new(
        data: F,
        sizes: F,
        offsets: F,
        mode: AccessMode,
        cap: usize,
        document_count: u64,
    ) -> Self {
        Self {
            table: SlotTable::new(sizes, offsets, document_count),
            log: BlobLog::new(data, cap),
            mode,
        }
    }

    #[must_use]
    pub fn document_count(&self) -> u64 {
        self.table.max_id()
    }

    /// Updates the bound `get` checks against.
    pub fn set_document_count(&mut self, count: u64) {
        self.table.set_max_id(count);
    }

    /// Reads and decodes the record for `doc_id`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] for ID 0, an ID above the document count,
    ///   an empty slot, or a slot whose size exceeds the cap.
    /// - [`StoreError::MalformedRecord`] if the blob is truncated or a field
    ///   overruns the record.
    pub fn get(&mut self, doc_id: u64) -> Result<FileData> {
        if doc_id == 0 {
            return Err(StoreError::NotFound(0));
        }
        let rec = self.table.get(doc_id)?;
        if !rec.is_live() || rec.size as u64 > self.log.cap() {
            return Err(StoreError::NotFound(doc_id));
        }
        let bytes = self.log.read_at(rec.offset, rec.size)?;
        FileData::decode(&bytes)
    }

    /// Serializes `record`, appends it and points `doc_id` at it.
    pub fn put(&mut self, doc_id: u64, record: &FileData) -> Result<()> {
        self.mode.ensure_writable()?;
        if doc_id == 0 {
            return Err(StoreError::NotFound(0));
        }
        let bytes = record.encode()?;
        let size = i32::try_from(bytes.len()).map_err(|_| StoreError::OversizedRecord {
            size: bytes.len() as u64,
            cap: self.log.cap(),
        })?;
        let offset = self.log.append(&bytes)?;
        self.table.put(doc_id, SlotRecord { size, offset })
    }

    /// Zeroes the slot size for `doc_id`.
    pub fn del(&mut self, doc_id: u64) -> Result<()> {
        self.mode.ensure_writable()?;
        if doc_id == 0 {
            return Err(StoreError::NotFound(0));
        }
        self.table.clear_size(doc_id)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.log.flush()?;
        self.table.flush()
    }

    /// Returns `(data, sizes, offsets)`.
    pub fn into_inner(self) -> (F, F, F) {
        let (sizes, offsets) = self.table.into_inner();
        (self.log.into_inner(), sizes, offsets)
    }
}
