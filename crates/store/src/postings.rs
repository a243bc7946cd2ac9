use slot::{AccessMode, BlobLog, Result, SlotRecord, SlotTable, StoreError};
use std::io::{Read, Seek, SeekFrom, Write};

use crate::codec::PostingsList;
use crate::format::{SessionMarks, ShardHeader, SHARD_HEADER_BYTES};

/// Keyword-ID-addressed postings for one shard.
///
/// The data file starts with a [`ShardHeader`]; blobs are appended after it.
/// `put` always appends and repoints the slot, so an overwritten payload
/// stays in the file until compaction.
///
/// The header is read once at open. Every mutation folds its
/// [`SessionMarks`] into a staged header written at offset 0, so a writer
/// that resumes from the same files sees the keyword and document bounds
/// reached so far. [`finish`](PostingsStore::finish) writes the final header
/// and flushes.
pub struct PostingsStore<F> {
    table: SlotTable<F>,
    log: BlobLog<F>,
    mode: AccessMode,
    header: ShardHeader,
    marks: SessionMarks,
}

impl<F: Read + Write + Seek> PostingsStore<F> {
    /// Opens a shard over its data, size and offset files.
    ///
    /// In write mode a data file shorter than a header gets a zero header, so
    /// the first blob never lands on top of it.
    pub fn open(
        mut data: F,
        sizes: F,
        offsets: F,
        mode: AccessMode,
        cap: usize,
    ) -> Result<Self> {
        data.seek(SeekFrom::Start(0))?;
        let header = ShardHeader::read_from(&mut data)?;
        let mut log = BlobLog::new(data, cap);
        if mode.is_write() && log.len()? < SHARD_HEADER_BYTES {
            log.write_at(0, &header.to_bytes())?;
        }
        let table = SlotTable::new(sizes, offsets, header.keyword_count());
        Ok(Self {
            table,
            log,
            mode,
            header,
            marks: SessionMarks::default(),
        })
    }

    /// The header as read at open.
    #[must_use]
    pub fn header(&self) -> ShardHeader {
        self.header
    }

    /// The high-water marks this session has accumulated.
    #[must_use]
    pub fn marks(&self) -> SessionMarks {
        self.marks
    }

    /// Highest keyword ID `get` will look up.
    #[must_use]
    pub fn keyword_count(&self) -> u64 {
        self.table.max_id()
    }

    /// Fetches the raw payload for `keyword_id`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] for ID 0, an ID above the keyword count, an
    ///   empty slot, or a slot whose size exceeds the cap.
    /// - [`StoreError::MalformedRecord`] if the blob is truncated.
    pub fn get(&mut self, keyword_id: u64) -> Result<Vec<u8>> {
        if keyword_id == 0 {
            return Err(StoreError::NotFound(0));
        }
        let rec = self.table.get(keyword_id)?;
        if !rec.is_live() || rec.size as u64 > self.log.cap() {
            return Err(StoreError::NotFound(keyword_id));
        }
        self.log.read_at(rec.offset, rec.size)
    }

    /// Fetches and decodes the postings for `keyword_id`.
    pub fn get_list(&mut self, keyword_id: u64) -> Result<PostingsList> {
        let bytes = self.get(keyword_id)?;
        PostingsList::decode(&bytes)
    }

    /// Appends `bytes` and points `keyword_id` at them.
    pub fn put(&mut self, keyword_id: u64, bytes: &[u8]) -> Result<()> {
        self.mode.ensure_writable()?;
        if keyword_id == 0 {
            return Err(StoreError::NotFound(0));
        }
        if bytes.is_empty() {
            return Err(StoreError::MalformedRecord(
                "empty postings payload".to_string(),
            ));
        }
        let size = i32::try_from(bytes.len()).map_err(|_| StoreError::OversizedRecord {
            size: bytes.len() as u64,
            cap: self.log.cap(),
        })?;
        let offset = self.log.append(bytes)?;
        self.table.put(keyword_id, SlotRecord { size, offset })?;
        self.note_keyword(keyword_id);
        self.stage_header()
    }

    /// Merges `list` into whatever `keyword_id` already holds and writes the
    /// result.
    pub fn merge_list(&mut self, keyword_id: u64, list: &PostingsList) -> Result<()> {
        self.mode.ensure_writable()?;
        let mut merged = match self.get_list(keyword_id) {
            Ok(existing) => existing,
            Err(e) if e.is_not_found() => PostingsList::new(),
            Err(e) => return Err(e),
        };
        merged.merge(list);
        self.put(keyword_id, &merged.encode())
    }

    /// Zeroes the slot for `keyword_id`. Deleting an empty slot is not an
    /// error.
    pub fn del(&mut self, keyword_id: u64) -> Result<()> {
        self.mode.ensure_writable()?;
        if keyword_id == 0 {
            return Err(StoreError::NotFound(0));
        }
        self.table.clear(keyword_id)
    }

    /// Widens the shard's document range to include `doc_id`.
    pub fn note_document(&mut self, doc_id: u32) -> Result<()> {
        self.mode.ensure_writable()?;
        let doc_id = i32::try_from(doc_id).map_err(|_| {
            StoreError::MalformedRecord(format!("document id {doc_id} exceeds i32::MAX"))
        })?;
        self.marks.note_document(doc_id);
        self.stage_header()
    }

    /// Declares that keyword IDs up to `count` exist in this shard.
    pub fn set_keyword_count(&mut self, count: u64) -> Result<()> {
        self.mode.ensure_writable()?;
        self.note_keyword(count);
        self.stage_header()
    }

    /// Writes the reconciled header at offset 0 and flushes every file.
    ///
    /// Returns the header now on disk. Read-mode stores return the header
    /// unchanged without writing.
    pub fn finish(&mut self) -> Result<ShardHeader> {
        if !self.mode.is_write() {
            return Ok(self.header);
        }
        let header = self.header.reconcile(&self.marks);
        self.log.write_at(0, &header.to_bytes())?;
        self.log.flush()?;
        self.table.flush()?;
        self.header = header;
        Ok(header)
    }

    /// Returns `(data, sizes, offsets)`.
    pub fn into_inner(self) -> (F, F, F) {
        let (sizes, offsets) = self.table.into_inner();
        (self.log.into_inner(), sizes, offsets)
    }

    fn stage_header(&mut self) -> Result<()> {
        let staged = self.header.reconcile(&self.marks);
        self.log.write_at(0, &staged.to_bytes())
    }

    fn note_keyword(&mut self, keyword_id: u64) {
        self.marks.note_keyword(keyword_id);
        if keyword_id > self.table.max_id() {
            self.table.set_max_id(keyword_id);
        }
    }
}
