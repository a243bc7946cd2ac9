use slot::{Result, StoreError};

/// Caps the total postings bytes one query may pull into memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostingsBudget {
    limit: u64,
    used: u64,
}

impl PostingsBudget {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit as u64,
            used: 0,
        }
    }

    /// Records `len` more bytes, failing with
    /// [`StoreError::OversizedRecord`] if that would exceed the limit. A
    /// failed charge leaves the budget unchanged.
    pub fn charge(&mut self, len: usize) -> Result<()> {
        let next = self.used.saturating_add(len as u64);
        if next > self.limit {
            return Err(StoreError::OversizedRecord {
                size: next,
                cap: self.limit,
            });
        }
        self.used = next;
        Ok(())
    }

    #[must_use]
    pub fn used(&self) -> u64 {
        self.used
    }

    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.limit - self.used
    }
}
