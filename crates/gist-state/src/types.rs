//! Common types

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::verifier::TransitionProof;

/// Block ordinal supplied by the caller
pub type BlockNumber = u64;

/// Timestamp supplied by the caller
pub type Timestamp = u64;

/// One record of an append-only history log.
///
/// Everything except the `replaced_*` fields is fixed at append time; those
/// are stamped once, when the next record is appended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Logged value (a state or a root)
    pub value: U256,
    /// Block the entry was appended in
    pub created_at_block: BlockNumber,
    /// Time the entry was appended at
    pub created_at_timestamp: Timestamp,
    /// Value of the next entry, once appended
    pub replaced_by: Option<U256>,
    /// Block the next entry was appended in
    pub replaced_at_block: Option<BlockNumber>,
    /// Time the next entry was appended at
    pub replaced_at_timestamp: Option<Timestamp>,
}

impl HistoryEntry {
    /// A fresh, current entry
    pub const fn new(value: U256, block_number: BlockNumber, timestamp: Timestamp) -> Self {
        Self {
            value,
            created_at_block: block_number,
            created_at_timestamp: timestamp,
            replaced_by: None,
            replaced_at_block: None,
            replaced_at_timestamp: None,
        }
    }

    /// True while no newer entry has superseded this one
    pub const fn is_current(&self) -> bool {
        self.replaced_at_block.is_none()
    }
}

/// A committed identity state
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateInfo {
    /// Identity
    pub id: U256,
    /// Committed state
    pub state: U256,
    /// State that replaced this one
    pub replaced_by_state: Option<U256>,
    /// Block the state was committed in
    pub created_at_block: BlockNumber,
    /// Time the state was committed at
    pub created_at_timestamp: Timestamp,
    /// Block the state was replaced in
    pub replaced_at_block: Option<BlockNumber>,
    /// Time the state was replaced at
    pub replaced_at_timestamp: Option<Timestamp>,
}

impl StateInfo {
    pub(crate) const fn from_entry(id: U256, entry: &HistoryEntry) -> Self {
        Self {
            id,
            state: entry.value,
            replaced_by_state: entry.replaced_by,
            created_at_block: entry.created_at_block,
            created_at_timestamp: entry.created_at_timestamp,
            replaced_at_block: entry.replaced_at_block,
            replaced_at_timestamp: entry.replaced_at_timestamp,
        }
    }
}

/// A committed GIST root
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GistRootInfo {
    /// GIST root
    pub root: U256,
    /// Root that replaced this one
    pub replaced_by_root: Option<U256>,
    /// Block the root became current in
    pub created_at_block: BlockNumber,
    /// Time the root became current at
    pub created_at_timestamp: Timestamp,
    /// Block the root was replaced in
    pub replaced_at_block: Option<BlockNumber>,
    /// Time the root was replaced at
    pub replaced_at_timestamp: Option<Timestamp>,
}

impl From<&HistoryEntry> for GistRootInfo {
    fn from(entry: &HistoryEntry) -> Self {
        Self {
            root: entry.value,
            replaced_by_root: entry.replaced_by,
            created_at_block: entry.created_at_block,
            created_at_timestamp: entry.created_at_timestamp,
            replaced_at_block: entry.replaced_at_block,
            replaced_at_timestamp: entry.replaced_at_timestamp,
        }
    }
}

/// A state transition request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRequest {
    /// Identity to transition
    pub id: U256,
    /// Current state of the identity, ignored for genesis
    pub old_state: U256,
    /// State to commit
    pub new_state: U256,
    /// True for the identity's first transition
    pub is_old_state_genesis: bool,
    /// Proof of the transition
    pub proof: TransitionProof,
}

/// Emitted after a transition commits
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateUpdated {
    /// Identity that transitioned
    pub id: U256,
    /// Block of the transition
    pub block_number: BlockNumber,
    /// Time of the transition
    pub timestamp: Timestamp,
    /// Newly committed state
    pub state: U256,
    /// GIST root after the transition
    pub root: U256,
}

/// One committed transition, in commit order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Identity that transitioned
    pub id: U256,
    /// State it transitioned to
    pub state: U256,
}
