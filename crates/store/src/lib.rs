//! # Store - postings and document metadata
//!
//! The concrete slot stores of a shard directory, built on the [`slot`]
//! primitives:
//!
//! | Type | Keyed by | Files |
//! |------|----------|-------|
//! | [`PostingsStore`] | keyword ID | `pos/<shard>`, `pos/<shard>_size`, `pos/<shard>_index` |
//! | [`MetadataStore`] | document ID | `filedata`, `filedata_size`, `filedata_index` |
//! | [`LinkStore`] | document ID | `linklist`, `linklist_size`, `linklist_index` |
//!
//! plus the codecs for their payloads ([`FileData`], [`PostingsList`],
//! [`varint`]) and the offline [`compact`] pass that reclaims the space
//! deleted and overwritten blobs leave behind.
//!
//! Every store is generic over `F: Read + Write + Seek`, so tests run against
//! `Cursor<Vec<u8>>` and production code against `std::fs::File`.

mod budget;
mod codec;
mod filedata;
mod format;
mod gc;
mod linklist;
mod postings;
pub mod varint;

pub use budget::PostingsBudget;
pub use codec::{PostingsBuilder, PostingsList};
pub use filedata::MetadataStore;
pub use format::{FileData, RecordCursor, SessionMarks, ShardHeader, SHARD_HEADER_BYTES};
pub use gc::{compact, with_suffix, CompactionOptions, CompactionPaths, CompactionStats, GC_SUFFIX};
pub use linklist::{LinkStore, LINKLIST_FILE, LINKLIST_INDEX_FILE, LINKLIST_SIZE_FILE};
pub use postings::PostingsStore;

/// Default cap on one postings blob (16 MiB).
pub const MAX_POSTINGS_BLOB_SIZE: usize = 16 * 1024 * 1024;

/// Default cap on one encoded filedata record (16 MiB).
pub const MAX_FILEDATA_RECORD_SIZE: usize = 16 * 1024 * 1024;

/// Default cap on postings bytes gathered for one query (64 MiB).
pub const MAX_POSTINGS_QUERY_BYTES: usize = 64 * 1024 * 1024;
