//! Sparse Merkle Tree (SMT) for the global identity state tree
//!
//! This crate provides a compressed, persistent SMT over 256-bit keys.
//! Key features:
//! - Bounded depth: an index must fit in `max_depth` bits
//! - Compressed paths: a leaf sits at the shallowest depth that separates it
//! - Persistent: nodes are content addressed and never mutated, so every
//!   historical root stays provable
//! - Inclusion and non-inclusion proofs

mod hasher;
mod node;
mod proof;
mod tree;

pub use alloy_primitives::U256;
pub use hasher::{HashEngine, KeccakHasher, LEAF_SENTINEL};
pub use node::Node;
pub use proof::{Membership, SmtProof};
pub use tree::{PendingUpdate, SparseMerkleTree};

/// Hash of an empty subtree, and the root of an empty tree
pub const EMPTY_HASH: U256 = U256::ZERO;

/// Default tree depth (64-bit identity space)
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Largest depth a 256-bit index can use
pub const MAX_SUPPORTED_DEPTH: usize = 256;

/// SMT errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SmtError {
    /// The index needs more path bits than the tree has levels
    #[error("index requires {bits} bits but the tree depth is {max_depth}")]
    DepthExceeded {
        /// Bits needed by the index
        bits: usize,
        /// Configured tree depth
        max_depth: usize,
    },
    /// Configured depth is outside `1..=256`
    #[error("invalid tree depth {0}")]
    InvalidDepth(usize),
    /// A referenced node is not in the node store
    #[error("node {0:#x} not found")]
    MissingNode(U256),
    /// A prepared update was built on a root that is no longer current
    #[error("pending update built on root {expected:#x}, current root is {actual:#x}")]
    StaleUpdate {
        /// Root the update was prepared against
        expected: U256,
        /// Current root of the tree
        actual: U256,
    },
}
