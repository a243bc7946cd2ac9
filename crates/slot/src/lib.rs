//! # Slot - dense ID-addressed record files
//!
//! The lowest layer of the shard storage engine. Every store in a shard
//! directory (postings, document metadata, link lists) is a pair of
//! primitives defined here:
//!
//! - a [`SlotTable`]: two small files holding one `(size, offset)` pair per
//!   integer ID, addressed by `id * SLOT_WIDTH` (no hashing, no resizing);
//! - a [`BlobLog`]: an append-only data file the slots point into.
//!
//! ## On-disk layout
//!
//! ```text
//! <name>_size   [size: i32 LE] [size: i32 LE] ...     one per ID, ID 0 first
//! <name>_index  [offset: i32 LE] [offset: i32 LE] ... one per ID, ID 0 first
//! <name>        [blob bytes ...]                      no per-record framing
//! ```
//!
//! A blob is self-describing only through its slot: the data file carries no
//! length prefix. A slot with `size <= 0` is absent (never written, or
//! deleted and awaiting compaction).
//!
//! ## Errors
//!
//! All store-level operations share [`StoreError`]. Every variant is
//! recoverable: a caller can skip the offending ID and keep going.

mod blob;
mod table;

use std::io;
use thiserror::Error;

pub use blob::BlobLog;
pub use table::{slot_offset, SlotRecord, SlotTable, SLOT_WIDTH};

/// Whether a store handle may mutate its files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Only `get`-type calls are allowed.
    Read,
    /// `put`/`del` are allowed; files are the session's shadow copies.
    Write,
}

impl AccessMode {
    /// Returns `true` for [`AccessMode::Write`].
    #[must_use]
    pub fn is_write(self) -> bool {
        matches!(self, AccessMode::Write)
    }

    /// Fails with [`StoreError::ReadOnlyViolation`] unless in write mode.
    pub fn ensure_writable(self) -> Result<()> {
        if self.is_write() {
            Ok(())
        } else {
            Err(StoreError::ReadOnlyViolation)
        }
    }
}

/// Errors returned by slot, bitmap and store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The ID is out of range, its slot is empty, or its slot lies past EOF.
    #[error("id {0} not found")]
    NotFound(u64),

    /// The deletion bit for this document is already set.
    #[error("document {0} is already deleted")]
    AlreadyDeleted(u64),

    /// The deletion bit for this document is already clear.
    #[error("document {0} is not deleted")]
    NotDeleted(u64),

    /// A mutation was attempted on a handle opened without a write session.
    #[error("store is open read-only")]
    ReadOnlyViolation,

    /// A declared record size exceeds the store's hard cap.
    #[error("record of {size} bytes exceeds the {cap} byte cap")]
    OversizedRecord {
        /// Declared or requested size in bytes.
        size: u64,
        /// The cap that was exceeded.
        cap: u64,
    },

    /// A record's internal structure is inconsistent (truncated blob, a
    /// length field overrunning its buffer, a negative offset, ...).
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// `id * width` does not fit in a signed 64-bit file offset.
    #[error("offset overflow: id {id} * width {width}")]
    OffsetOverflow {
        /// The ID being addressed.
        id: u64,
        /// The record width in bytes.
        width: u64,
    },

    /// The blob log has grown past the `i32` offsets slot files can store.
    #[error("blob log offset {0} exceeds i32::MAX")]
    LogOverflow(u64),
}

impl StoreError {
    /// Returns `true` if this is [`StoreError::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Result alias used throughout the storage crates.
pub type Result<T> = std::result::Result<T, StoreError>;
