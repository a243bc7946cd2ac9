//! Fixed headers and record codecs shared by the postings and metadata stores.
//!
//! ## Shard header (16 bytes, start of `pos/<shard_id>`)
//!
//! ```text
//! [pos_num: i64 LE][fileindex_start: i32 LE][fileindex_end: i32 LE]
//! ```
//!
//! ## Filedata record (one blob in `filedata`)
//!
//! ```text
//! [url_len: u64][url][title_len: u64][title][comment_len: u64][comment]
//! [size: i32][keyword_num: i32][lastmod: i64][domainid: i32]
//! [other_len: i32][other]
//! ```
//!
//! A string length of 0 means the field is absent. All integers are
//! little-endian.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use slot::{Result, StoreError};
use std::io::{self, Read, Write};

/// Size of the shard header in bytes: 8 (`pos_num`) + 4 (`start`) + 4 (`end`).
pub const SHARD_HEADER_BYTES: u64 = 8 + 4 + 4;

/// Bookkeeping stored at the front of every postings data file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShardHeader {
    /// Highest keyword ID the shard holds postings for.
    pub pos_num: i64,
    /// Lowest document ID represented in the shard, 0 if none.
    pub fileindex_start: i32,
    /// Highest document ID represented in the shard.
    pub fileindex_end: i32,
}

impl ShardHeader {
    /// Reads a header. A missing or short header reads as all zeros.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let mut buf = Vec::with_capacity(SHARD_HEADER_BYTES as usize);
        r.take(SHARD_HEADER_BYTES).read_to_end(&mut buf)?;
        if buf.len() < SHARD_HEADER_BYTES as usize {
            return Ok(Self::default());
        }
        let mut cur = io::Cursor::new(buf);
        Ok(Self {
            pos_num: cur.read_i64::<LittleEndian>()?,
            fileindex_start: cur.read_i32::<LittleEndian>()?,
            fileindex_end: cur.read_i32::<LittleEndian>()?,
        })
    }

    /// Writes the 16-byte header.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_i64::<LittleEndian>(self.pos_num)?;
        w.write_i32::<LittleEndian>(self.fileindex_start)?;
        w.write_i32::<LittleEndian>(self.fileindex_end)?;
        Ok(())
    }

    /// Encodes the header into a fixed buffer.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; SHARD_HEADER_BYTES as usize] {
        let mut out = [0u8; SHARD_HEADER_BYTES as usize];
        out[..8].copy_from_slice(&self.pos_num.to_le_bytes());
        out[8..12].copy_from_slice(&self.fileindex_start.to_le_bytes());
        out[12..].copy_from_slice(&self.fileindex_end.to_le_bytes());
        out
    }

    /// Returns the number of keyword slots the header covers.
    #[must_use]
    pub fn keyword_count(&self) -> u64 {
        u64::try_from(self.pos_num).unwrap_or(0)
    }

    /// Merges the high-water marks a write session observed into the header.
    ///
    /// Document ID 0 is never valid, so a zero on either side means "unset"
    /// and the other side wins. Otherwise the range widens to cover both.
    #[must_use]
    pub fn reconcile(&self, marks: &SessionMarks) -> ShardHeader {
        let fileindex_start = match (self.fileindex_start, marks.fileindex_start) {
            (0, observed) => observed,
            (current, 0) => current,
            (current, observed) => current.min(observed),
        };
        let pos_num = i64::try_from(marks.max_keyword)
            .unwrap_or(i64::MAX)
            .max(self.pos_num);
        ShardHeader {
            pos_num,
            fileindex_start,
            fileindex_end: self.fileindex_end.max(marks.fileindex_end),
        }
    }
}

/// What a write session touched, folded into the [`ShardHeader`] at close.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionMarks {
    /// Highest keyword ID written or declared.
    pub max_keyword: u64,
    /// Lowest document ID noted, 0 if none.
    pub fileindex_start: i32,
    /// Highest document ID noted.
    pub fileindex_end: i32,
}

impl SessionMarks {
    /// Widens the observed document range to include `doc_id`.
    pub fn note_document(&mut self, doc_id: i32) {
        if doc_id <= 0 {
            return;
        }
        if self.fileindex_start == 0 || doc_id < self.fileindex_start {
            self.fileindex_start = doc_id;
        }
        self.fileindex_end = self.fileindex_end.max(doc_id);
    }

    /// Raises the keyword high-water mark.
    pub fn note_keyword(&mut self, keyword_id: u64) {
        self.max_keyword = self.max_keyword.max(keyword_id);
    }
}

/// Per-document metadata stored in the filedata log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileData {
    pub url: Option<String>,
    pub title: Option<String>,
    pub comment: Option<String>,
    /// Document size in bytes.
    pub size: i32,
    /// Number of keywords indexed for the document.
    pub keyword_num: i32,
    /// Last-modified time, seconds since the epoch.
    pub lastmod: i64,
    pub domainid: i32,
    /// Opaque caller-defined bytes.
    pub other: Vec<u8>,
}

impl FileData {
    /// Serializes the record.
    ///
    /// An empty string is written as length 0 and therefore reads back as
    /// `None`.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        for field in [&self.url, &self.title, &self.comment] {
            let bytes = field.as_deref().unwrap_or("").as_bytes();
            buf.write_u64::<LittleEndian>(bytes.len() as u64)?;
            buf.extend_from_slice(bytes);
        }
        buf.write_i32::<LittleEndian>(self.size)?;
        buf.write_i32::<LittleEndian>(self.keyword_num)?;
        buf.write_i64::<LittleEndian>(self.lastmod)?;
        buf.write_i32::<LittleEndian>(self.domainid)?;
        let other_len = i32::try_from(self.other.len()).map_err(|_| StoreError::OversizedRecord {
            size: self.other.len() as u64,
            cap: i32::MAX as u64,
        })?;
        buf.write_i32::<LittleEndian>(other_len)?;
        buf.extend_from_slice(&self.other);
        Ok(buf)
    }

    /// Decodes a record, checking every length against the bytes left.
    ///
    /// Bytes after `other` are ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut cur = RecordCursor::new(bytes);
        let url = cur.read_string("url")?;
        let title = cur.read_string("title")?;
        let comment = cur.read_string("comment")?;
        let size = cur.read_i32("size")?;
        let keyword_num = cur.read_i32("keyword_num")?;
        let lastmod = cur.read_i64("lastmod")?;
        let domainid = cur.read_i32("domainid")?;
        let other_len = cur.read_i32("other_len")?;
        if other_len < 0 {
            return Err(StoreError::MalformedRecord(format!(
                "negative other_len {other_len}"
            )));
        }
        let other = cur.take(other_len as u64, "other")?.to_vec();
        Ok(Self {
            url,
            title,
            comment,
            size,
            keyword_num,
            lastmod,
            domainid,
            other,
        })
    }

    /// Drops every owned buffer, leaving an empty record.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    fn encoded_len(&self) -> usize {
        let strings: usize = [&self.url, &self.title, &self.comment]
            .iter()
            .map(|s| 8 + s.as_deref().map_or(0, str::len))
            .sum();
        strings + 4 + 4 + 8 + 4 + 4 + self.other.len()
    }
}

/// Bounds-checked reader over one record buffer.
///
/// Every read checks [`remaining_len`](RecordCursor::remaining_len) first and
/// fails with [`StoreError::MalformedRecord`] naming the field instead of
/// reading past the end.
pub struct RecordCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> RecordCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    #[must_use]
    pub fn remaining_len(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Consumes exactly `len` bytes.
    pub fn take(&mut self, len: u64, field: &str) -> Result<&'a [u8]> {
        let remaining = self.remaining_len();
        let len = usize::try_from(len)
            .ok()
            .filter(|&l| l <= remaining)
            .ok_or_else(|| {
                StoreError::MalformedRecord(format!(
                    "{field}: length {len} exceeds remaining {remaining} bytes"
                ))
            })?;
        let out = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    pub fn read_i32(&mut self, field: &str) -> Result<i32> {
        let mut raw = self.take(4, field)?;
        Ok(raw.read_i32::<LittleEndian>()?)
    }

    pub fn read_i64(&mut self, field: &str) -> Result<i64> {
        let mut raw = self.take(8, field)?;
        Ok(raw.read_i64::<LittleEndian>()?)
    }

    pub fn read_u64(&mut self, field: &str) -> Result<u64> {
        let mut raw = self.take(8, field)?;
        Ok(raw.read_u64::<LittleEndian>()?)
    }

    /// Reads a `u64` length followed by that many UTF-8 bytes. Length 0 is
    /// `None`.
    pub fn read_string(&mut self, field: &str) -> Result<Option<String>> {
        let len = self.read_u64(field)?;
        if len == 0 {
            return Ok(None);
        }
        let raw = self.take(len, field)?;
        let s = std::str::from_utf8(raw)
            .map_err(|e| StoreError::MalformedRecord(format!("{field}: {e}")))?;
        Ok(Some(s.to_owned()))
    }
}
