//! Append-only history logs with block and time lookup
//!
//! The same log type backs the global GIST root history and every
//! identity's state history. Entries are never removed; appending stamps the
//! previous entry as replaced. Lookups by block or time binary search the
//! creation axis, which appends keep sorted.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::{
    error::{HistoryError, QueryError},
    types::{BlockNumber, HistoryEntry, Timestamp},
};

/// How block numbers and timestamps must advance between entries
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClockOrder {
    /// Both must strictly increase (one entry per block)
    Strict,
    /// Both must not decrease (several entries may share a block)
    NonDecreasing,
}

/// Append-only history log
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryLog {
    order: ClockOrder,
    entries: Vec<HistoryEntry>,
}

impl HistoryLog {
    /// Create an empty log
    pub const fn new(order: ClockOrder) -> Self {
        Self { order, entries: Vec::new() }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True before the first append
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entry that has not been replaced yet
    pub fn current(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    /// Entry at `index`, oldest first
    pub fn get(&self, index: usize) -> Option<&HistoryEntry> {
        self.entries.get(index)
    }

    /// All entries, oldest first
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Check that an entry created at `block_number`/`timestamp` keeps the log ordered
    pub fn check_clock(
        &self,
        block_number: BlockNumber,
        timestamp: Timestamp,
    ) -> Result<(), HistoryError> {
        let Some(last) = self.current() else {
            return Ok(());
        };

        let advances = match self.order {
            ClockOrder::Strict => {
                block_number > last.created_at_block && timestamp > last.created_at_timestamp
            }
            ClockOrder::NonDecreasing => {
                block_number >= last.created_at_block && timestamp >= last.created_at_timestamp
            }
        };

        if advances {
            Ok(())
        } else {
            Err(HistoryError::ClockRegression {
                block: block_number,
                timestamp,
                last_block: last.created_at_block,
                last_timestamp: last.created_at_timestamp,
            })
        }
    }

    /// Validate an append without performing it
    pub fn check_append(
        &self,
        value: U256,
        block_number: BlockNumber,
        timestamp: Timestamp,
    ) -> Result<(), HistoryError> {
        if self.current().is_some_and(|last| last.value == value) {
            return Err(HistoryError::DuplicateAdjacentValue(value));
        }
        self.check_clock(block_number, timestamp)
    }

    /// Append a new current entry and return its position
    pub fn append(
        &mut self,
        value: U256,
        block_number: BlockNumber,
        timestamp: Timestamp,
    ) -> Result<usize, HistoryError> {
        self.check_append(value, block_number, timestamp)?;

        if let Some(last) = self.entries.last_mut() {
            last.replaced_by = Some(value);
            last.replaced_at_block = Some(block_number);
            last.replaced_at_timestamp = Some(timestamp);
        }
        self.entries.push(HistoryEntry::new(value, block_number, timestamp));

        Ok(self.entries.len() - 1)
    }

    /// `count` entries starting at `start`, oldest first
    pub fn range(&self, start: usize, count: usize) -> Result<&[HistoryEntry], QueryError> {
        let len = self.entries.len();
        match start.checked_add(count) {
            Some(end) if count > 0 && end <= len => Ok(&self.entries[start..end]),
            _ => Err(QueryError::OutOfBounds { start, count, len }),
        }
    }

    /// Entry in effect at `block_number`
    pub fn find_by_block(&self, block_number: BlockNumber) -> Result<&HistoryEntry, QueryError> {
        let after = self.entries.partition_point(|entry| entry.created_at_block <= block_number);
        self.entry_before(after)
    }

    /// Entry in effect at `timestamp`
    pub fn find_by_time(&self, timestamp: Timestamp) -> Result<&HistoryEntry, QueryError> {
        let after = self.entries.partition_point(|entry| entry.created_at_timestamp <= timestamp);
        self.entry_before(after)
    }

    fn entry_before(&self, position: usize) -> Result<&HistoryEntry, QueryError> {
        position
            .checked_sub(1)
            .and_then(|index| self.entries.get(index))
            .ok_or(QueryError::NotFound)
    }
}
