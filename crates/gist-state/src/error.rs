//! Error types

use alloy_primitives::U256;
use gist_smt::SmtError;

use crate::types::{BlockNumber, Timestamp};

/// Rejected history append
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    /// The appended value equals the current one
    #[error("value {0:#x} equals the current value")]
    DuplicateAdjacentValue(U256),
    /// Block or timestamp moves backwards (or stalls, for strict logs)
    #[error(
        "block {block} / time {timestamp} does not advance past block {last_block} / time {last_timestamp}"
    )]
    ClockRegression {
        /// Block of the rejected entry
        block: BlockNumber,
        /// Timestamp of the rejected entry
        timestamp: Timestamp,
        /// Block of the current entry
        last_block: BlockNumber,
        /// Timestamp of the current entry
        last_timestamp: Timestamp,
    },
}

/// Rejected state transition. A rejected transition never mutates the registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// Identity zero is reserved
    #[error("ID should not be zero")]
    ZeroId,
    /// State zero is reserved for "no state"
    #[error("New state should not be zero")]
    ZeroNewState,
    /// The identity does not fit the tree depth
    #[error("ID requires {bits} bits but the GIST depth is {max_depth}")]
    DepthExceeded {
        /// Bits needed by the identity
        bits: usize,
        /// Configured GIST depth
        max_depth: usize,
    },
    /// Some identity already committed this state
    #[error("New state {0:#x} already exists")]
    StateAlreadyExists(U256),
    /// Genesis transition for an identity that already has states
    #[error("Old state is genesis but identity {0:#x} already exists")]
    GenesisButIdentityExists(U256),
    /// Non-genesis transition for an identity without states
    #[error("Old state is not genesis but identity {0:#x} does not yet exist")]
    OldStateNotGenesisButNoIdentity(U256),
    /// The claimed old state is not the identity's current state
    #[error("Old state {got:#x} does not match the latest state {expected:#x}")]
    OldStateMismatch {
        /// Current state of the identity
        expected: U256,
        /// Old state in the request
        got: U256,
    },
    /// The verifier rejected the proof or failed
    #[error("Zero-knowledge proof of state transition is not valid")]
    InvalidTransitionProof,
    /// A history log refused the append
    #[error(transparent)]
    History(#[from] HistoryError),
    /// Tree failure other than depth
    #[error("tree error: {0}")]
    Tree(SmtError),
}

impl From<SmtError> for TransitionError {
    fn from(err: SmtError) -> Self {
        match err {
            SmtError::DepthExceeded { bits, max_depth } => Self::DepthExceeded { bits, max_depth },
            other => Self::Tree(other),
        }
    }
}

/// Failed read. Reads never change registry state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// No entry matches the query
    #[error("not found")]
    NotFound,
    /// The root never appeared in the root history
    #[error("GIST root {0:#x} does not exist")]
    UnknownRoot(U256),
    /// The requested range is empty or runs past the end of the log
    #[error("range {start}..{start}+{count} is out of bounds for length {len}")]
    OutOfBounds {
        /// First requested position
        start: usize,
        /// Number of requested entries
        count: usize,
        /// Log length
        len: usize,
    },
    /// `count` exceeds the configured page length
    #[error("page of {count} entries exceeds the limit of {max}")]
    PageTooLarge {
        /// Number of requested entries
        count: usize,
        /// Configured page length
        max: usize,
    },
    /// The identity does not fit the tree depth
    #[error("ID requires {bits} bits but the GIST depth is {max_depth}")]
    DepthExceeded {
        /// Bits needed by the identity
        bits: usize,
        /// Configured GIST depth
        max_depth: usize,
    },
    /// Tree failure other than depth
    #[error("tree error: {0}")]
    Tree(SmtError),
}

impl From<SmtError> for QueryError {
    fn from(err: SmtError) -> Self {
        match err {
            SmtError::DepthExceeded { bits, max_depth } => Self::DepthExceeded { bits, max_depth },
            other => Self::Tree(other),
        }
    }
}

/// Stored history that does not reproduce itself
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntegrityError {
    /// Replaying the journal gave a different root
    #[error("replay produced root {actual:#x} at position {position}, log has {expected:#x}")]
    ReplayMismatch {
        /// Position in the root log
        position: usize,
        /// Root in the log
        expected: U256,
        /// Root produced by the replay
        actual: U256,
    },
    /// Journal and root log disagree on the number of transitions
    #[error("journal has {journal} transitions but the root log has {roots} roots")]
    LengthMismatch {
        /// Journal length
        journal: usize,
        /// Root log length
        roots: usize,
    },
    /// A state is owned by more than one history entry
    #[error("state {0:#x} is recorded more than once")]
    DuplicateState(U256),
    /// An identity is listed without states
    #[error("identity log for {0:#x} is empty")]
    EmptyIdentityLog(U256),
    /// An identity log disagrees with the journal or the root log
    #[error("history for {0:#x} is inconsistent")]
    BrokenHistory(U256),
    /// A node reachable from a recorded root is not stored
    #[error("node {0:#x} of a recorded root is missing")]
    MissingNode(U256),
    /// Tree failure while rebuilding or replaying
    #[error(transparent)]
    Tree(#[from] SmtError),
}
