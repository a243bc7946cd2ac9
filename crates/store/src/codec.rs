//! Position lists: the payload format of one postings blob.
//!
//! ```text
//! repeated, documents ascending:
//!   varint(doc_gap) varint(position_count) varint(pos_delta)...
//! ```
//!
//! `doc_gap` is the distance from the previous document ID (from 0 for the
//! first), so it is never zero. The first position of a document is stored
//! as-is, later ones as the distance from their predecessor.

use slot::{Result, StoreError};
use std::collections::BTreeMap;

use crate::varint::{encode_u32, VarintReader};

/// All positions of one keyword, grouped by document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostingsList {
    docs: BTreeMap<u32, Vec<u32>>,
}

impl PostingsList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that the keyword occurs in `doc_id` at `position`. Duplicate
    /// positions are ignored. Document ID 0 is invalid and ignored.
    pub fn add(&mut self, doc_id: u32, position: u32) {
        if doc_id == 0 {
            return;
        }
        let positions = self.docs.entry(doc_id).or_default();
        if let Err(at) = positions.binary_search(&position) {
            positions.insert(at, position);
        }
    }

    /// Unions `other` into `self`.
    pub fn merge(&mut self, other: &PostingsList) {
        for (&doc, positions) in &other.docs {
            for &p in positions {
                self.add(doc, p);
            }
        }
    }

    /// Drops every position for `doc_id`. Returns `true` if it was present.
    pub fn remove_document(&mut self, doc_id: u32) -> bool {
        self.docs.remove(&doc_id).is_some()
    }

    /// Sorted positions for `doc_id`.
    #[must_use]
    pub fn positions(&self, doc_id: u32) -> Option<&[u32]> {
        self.docs.get(&doc_id).map(Vec::as_slice)
    }

    /// Document IDs in ascending order.
    pub fn documents(&self) -> impl Iterator<Item = u32> + '_ {
        self.docs.keys().copied()
    }

    /// Number of documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut prev_doc = 0u32;
        for (&doc, positions) in &self.docs {
            encode_u32(doc - prev_doc, &mut buf);
            encode_u32(positions.len() as u32, &mut buf);
            let mut prev_pos = 0u32;
            for (i, &p) in positions.iter().enumerate() {
                encode_u32(if i == 0 { p } else { p - prev_pos }, &mut buf);
                prev_pos = p;
            }
            prev_doc = doc;
        }
        buf
    }

    /// Decodes a payload, rejecting non-increasing document IDs or positions
    /// and any sum that overflows `u32`.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = VarintReader::new(bytes);
        let mut docs = BTreeMap::new();
        let mut doc = 0u32;
        while !reader.is_empty() {
            let gap = reader.read()?;
            if gap == 0 {
                return Err(malformed("zero document gap"));
            }
            doc = doc
                .checked_add(gap)
                .ok_or_else(|| malformed("document id overflows u32"))?;

            let count = reader.read_count()?;
            let mut positions = Vec::with_capacity(count);
            let mut pos = 0u32;
            for i in 0..count {
                let delta = reader.read()?;
                if i > 0 && delta == 0 {
                    return Err(malformed("repeated position"));
                }
                pos = pos
                    .checked_add(delta)
                    .ok_or_else(|| malformed("position overflows u32"))?;
                positions.push(pos);
            }
            docs.insert(doc, positions);
        }
        Ok(Self { docs })
    }
}

fn malformed(msg: &str) -> StoreError {
    StoreError::MalformedRecord(format!("postings payload: {msg}"))
}

/// Collects tokenizer output for many keywords before it is written.
#[derive(Debug, Default)]
pub struct PostingsBuilder {
    lists: BTreeMap<u64, PostingsList>,
}

impl PostingsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one `(keyword, document, position)` occurrence.
    pub fn add(&mut self, keyword_id: u64, doc_id: u32, position: u32) {
        self.lists.entry(keyword_id).or_default().add(doc_id, position);
    }

    /// Number of distinct keywords collected.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lists.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    /// Yields each keyword's list in ascending keyword order.
    pub fn into_lists(self) -> impl Iterator<Item = (u64, PostingsList)> {
        self.lists.into_iter()
    }

    /// Yields each keyword's encoded payload in ascending keyword order.
    pub fn into_payloads(self) -> impl Iterator<Item = (u64, Vec<u8>)> {
        self.lists.into_iter().map(|(k, list)| (k, list.encode()))
    }
}
