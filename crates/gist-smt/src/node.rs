//! SMT nodes

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::hasher::HashEngine;

/// A stored tree node. Empty subtrees are not stored; they hash to zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    /// Leaf holding the value of one index
    Leaf {
        /// Leaf index
        index: U256,
        /// Leaf value
        value: U256,
    },
    /// Middle node holding its children's hashes
    Middle {
        /// Left child hash
        left: U256,
        /// Right child hash
        right: U256,
    },
}

impl Node {
    /// Content hash used as the node's address
    pub fn hash<H: HashEngine>(&self, hasher: &H) -> U256 {
        match *self {
            Self::Leaf { index, value } => hasher.hash_leaf(index, value),
            Self::Middle { left, right } => hasher.hash_node(left, right),
        }
    }

    /// Middle node with `child` on the side selected by `bit`
    pub(crate) const fn branch(bit: bool, child: U256, sibling: U256) -> Self {
        if bit {
            Self::Middle { left: sibling, right: child }
        } else {
            Self::Middle { left: child, right: sibling }
        }
    }
}
