//! SMT proof generation and verification

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::{hasher::HashEngine, EMPTY_HASH};

/// What the proof path ended on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Membership {
    /// The proven index is present with this value
    Included {
        /// Value stored at the index
        value: U256,
    },
    /// The path ends on a leaf for a different index sharing the same prefix
    ForeignLeaf {
        /// Index of the leaf found on the path
        index: U256,
        /// Value of the leaf found on the path
        value: U256,
    },
    /// The path ends on an empty subtree
    Empty,
}

/// SMT inclusion or non-inclusion proof
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtProof {
    /// Root the proof was generated against
    pub root: U256,
    /// The index being proven
    pub index: U256,
    /// Sibling hashes from the root down to the terminal node
    pub siblings: Vec<U256>,
    /// Outcome of the lookup
    pub membership: Membership,
}

impl SmtProof {
    /// True for an inclusion proof
    pub const fn existence(&self) -> bool {
        matches!(self.membership, Membership::Included { .. })
    }

    /// Value at the index, if included
    pub const fn value(&self) -> Option<U256> {
        match self.membership {
            Membership::Included { value } => Some(value),
            _ => None,
        }
    }

    /// Sibling hashes padded with empty hashes to `depth` entries
    pub fn padded_siblings(&self, depth: usize) -> Vec<U256> {
        let mut siblings = self.siblings.clone();
        if siblings.len() < depth {
            siblings.resize(depth, EMPTY_HASH);
        }
        siblings
    }

    /// Compute the root implied by this proof.
    ///
    /// Returns `None` for a malformed foreign-leaf proof: the foreign leaf must
    /// have a different index and share the proven index's path prefix.
    pub fn compute_root<H: HashEngine>(&self, hasher: &H) -> Option<U256> {
        let depth = self.siblings.len();
        let mut current_hash = match self.membership {
            Membership::Included { value } => hasher.hash_leaf(self.index, value),
            Membership::ForeignLeaf { index, value } => {
                if index == self.index || !shares_prefix(index, self.index, depth) {
                    return None;
                }
                hasher.hash_leaf(index, value)
            }
            Membership::Empty => EMPTY_HASH,
        };

        for (depth, sibling) in self.siblings.iter().enumerate().rev() {
            current_hash = if self.index.bit(depth) {
                hasher.hash_node(*sibling, current_hash)
            } else {
                hasher.hash_node(current_hash, *sibling)
            };
        }

        Some(current_hash)
    }

    /// Verify this proof against its own root
    pub fn verify<H: HashEngine>(&self, hasher: &H) -> bool {
        self.compute_root(hasher) == Some(self.root)
    }
}

fn shares_prefix(a: U256, b: U256, depth: usize) -> bool {
    (0..depth).all(|bit| a.bit(bit) == b.bit(bit))
}
