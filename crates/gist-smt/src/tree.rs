//! Sparse Merkle Tree implementation

use std::collections::HashMap;

use alloy_primitives::U256;
use tracing::debug;

use crate::{
    hasher::{HashEngine, KeccakHasher},
    node::Node,
    proof::{Membership, SmtProof},
    SmtError, DEFAULT_MAX_DEPTH, EMPTY_HASH, MAX_SUPPORTED_DEPTH,
};

/// Persistent sparse Merkle tree.
///
/// Nodes are stored by content hash and never overwritten, so any root the
/// tree has ever had can still be walked and proven against.
#[derive(Clone, Debug)]
pub struct SparseMerkleTree<H = KeccakHasher> {
    /// Node store: hash -> node
    nodes: HashMap<U256, Node>,
    /// Current root hash
    root: U256,
    /// Maximum number of path bits
    max_depth: usize,
    hasher: H,
}

/// A computed but not yet applied leaf write.
///
/// Produced by [`SparseMerkleTree::prepare`]; nothing in the tree changes
/// until it is passed to [`SparseMerkleTree::commit`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingUpdate {
    base_root: U256,
    root: U256,
    writes: Vec<(U256, Node)>,
}

impl PendingUpdate {
    /// Root the tree will have once the update is committed
    pub const fn root(&self) -> U256 {
        self.root
    }

    /// Root the update was computed against
    pub const fn base_root(&self) -> U256 {
        self.base_root
    }
}

impl SparseMerkleTree {
    /// Create a new empty SMT with the default depth
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            root: EMPTY_HASH,
            max_depth: DEFAULT_MAX_DEPTH,
            hasher: KeccakHasher,
        }
    }

    /// Create a new empty SMT with a custom depth
    pub fn with_max_depth(max_depth: usize) -> Result<Self, SmtError> {
        Self::with_hasher(max_depth, KeccakHasher)
    }
}

impl Default for SparseMerkleTree {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: HashEngine> SparseMerkleTree<H> {
    /// Create a new empty SMT using `hasher`
    pub fn with_hasher(max_depth: usize, hasher: H) -> Result<Self, SmtError> {
        if max_depth == 0 || max_depth > MAX_SUPPORTED_DEPTH {
            return Err(SmtError::InvalidDepth(max_depth));
        }
        Ok(Self { nodes: HashMap::new(), root: EMPTY_HASH, max_depth, hasher })
    }

    /// Rebuild a tree from a stored node set.
    ///
    /// Every node is re-hashed, so a tampered node set cannot smuggle in a
    /// node under a foreign address. `root` must be empty or present.
    pub fn from_nodes(
        max_depth: usize,
        hasher: H,
        nodes: impl IntoIterator<Item = Node>,
        root: U256,
    ) -> Result<Self, SmtError> {
        let mut tree = Self::with_hasher(max_depth, hasher)?;
        for node in nodes {
            let hash = node.hash(&tree.hasher);
            tree.nodes.insert(hash, node);
        }
        if !tree.contains_root(root) {
            return Err(SmtError::MissingNode(root));
        }
        tree.root = root;
        Ok(tree)
    }

    /// Get the root hash
    pub const fn root(&self) -> U256 {
        self.root
    }

    /// Get the configured depth
    pub const fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Hash engine used by this tree
    pub const fn hasher(&self) -> &H {
        &self.hasher
    }

    /// Number of stored nodes across all historical roots
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// All stored nodes
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Whether a node with this hash is stored
    pub fn contains_node(&self, hash: U256) -> bool {
        self.nodes.contains_key(&hash)
    }

    /// Whether `root` can be walked in this tree
    pub fn contains_root(&self, root: U256) -> bool {
        root == EMPTY_HASH || self.contains_node(root)
    }

    /// Fail with `DepthExceeded` if `index` does not fit the tree
    pub fn check_index(&self, index: U256) -> Result<(), SmtError> {
        let bits = index.bit_len();
        if bits > self.max_depth {
            return Err(SmtError::DepthExceeded { bits, max_depth: self.max_depth });
        }
        Ok(())
    }

    /// Insert or update a leaf and return the new root
    pub fn insert_or_update(&mut self, index: U256, value: U256) -> Result<U256, SmtError> {
        let update = self.prepare(index, value)?;
        self.commit(update)
    }

    /// Compute the writes for setting `index` to `value` without applying them
    pub fn prepare(&self, index: U256, value: U256) -> Result<PendingUpdate, SmtError> {
        self.check_index(index)?;

        let mut writes = Vec::new();
        let root = self.add_leaf(&mut writes, index, value, self.root, 0)?;

        Ok(PendingUpdate { base_root: self.root, root, writes })
    }

    /// Apply a prepared update
    pub fn commit(&mut self, update: PendingUpdate) -> Result<U256, SmtError> {
        if update.base_root != self.root {
            return Err(SmtError::StaleUpdate { expected: update.base_root, actual: self.root });
        }

        debug!(
            old_root = %self.root,
            new_root = %update.root,
            nodes = update.writes.len(),
            "committing SMT update"
        );

        self.nodes.extend(update.writes);
        self.root = update.root;
        Ok(self.root)
    }

    /// Value stored at `index` under `at_root`
    pub fn get(&self, index: U256, at_root: U256) -> Result<Option<U256>, SmtError> {
        Ok(self.generate_proof(index, at_root)?.value())
    }

    /// Generate an inclusion or non-inclusion proof for `index` at `at_root`
    pub fn generate_proof(&self, index: U256, at_root: U256) -> Result<SmtProof, SmtError> {
        self.check_index(index)?;

        let mut siblings = Vec::new();
        let mut next_hash = at_root;

        for depth in 0..=self.max_depth {
            if next_hash == EMPTY_HASH {
                return Ok(SmtProof { root: at_root, index, siblings, membership: Membership::Empty });
            }

            match self.node(next_hash)? {
                Node::Leaf { index: leaf_index, value } => {
                    let membership = if leaf_index == index {
                        Membership::Included { value }
                    } else {
                        Membership::ForeignLeaf { index: leaf_index, value }
                    };
                    return Ok(SmtProof { root: at_root, index, siblings, membership });
                }
                Node::Middle { left, right } => {
                    if index.bit(depth) {
                        siblings.push(left);
                        next_hash = right;
                    } else {
                        siblings.push(right);
                        next_hash = left;
                    }
                }
            }
        }

        Err(SmtError::DepthExceeded { bits: self.max_depth + 1, max_depth: self.max_depth })
    }

    fn node(&self, hash: U256) -> Result<Node, SmtError> {
        self.nodes.get(&hash).copied().ok_or(SmtError::MissingNode(hash))
    }

    fn write(&self, writes: &mut Vec<(U256, Node)>, node: Node) -> U256 {
        let hash = node.hash(&self.hasher);
        writes.push((hash, node));
        hash
    }

    /// Descend from `node_hash` and return the hash of the rewritten subtree
    fn add_leaf(
        &self,
        writes: &mut Vec<(U256, Node)>,
        index: U256,
        value: U256,
        node_hash: U256,
        depth: usize,
    ) -> Result<U256, SmtError> {
        if depth > self.max_depth {
            return Err(SmtError::DepthExceeded { bits: depth, max_depth: self.max_depth });
        }

        if node_hash == EMPTY_HASH {
            return Ok(self.write(writes, Node::Leaf { index, value }));
        }

        match self.node(node_hash)? {
            Node::Leaf { index: old_index, .. } if old_index == index => {
                Ok(self.write(writes, Node::Leaf { index, value }))
            }
            Node::Leaf { index: old_index, .. } => {
                self.push_leaf(writes, index, value, old_index, node_hash, depth)
            }
            Node::Middle { left, right } => {
                let bit = index.bit(depth);
                let (child, sibling) = if bit { (right, left) } else { (left, right) };
                let child = self.add_leaf(writes, index, value, child, depth + 1)?;
                Ok(self.write(writes, Node::branch(bit, child, sibling)))
            }
        }
    }

    /// Split an occupied leaf slot until the old and new leaf diverge
    fn push_leaf(
        &self,
        writes: &mut Vec<(U256, Node)>,
        index: U256,
        value: U256,
        old_index: U256,
        old_hash: U256,
        depth: usize,
    ) -> Result<U256, SmtError> {
        if depth >= self.max_depth {
            return Err(SmtError::DepthExceeded { bits: depth + 1, max_depth: self.max_depth });
        }

        let new_bit = index.bit(depth);
        if new_bit == old_index.bit(depth) {
            let child = self.push_leaf(writes, index, value, old_index, old_hash, depth + 1)?;
            return Ok(self.write(writes, Node::branch(new_bit, child, EMPTY_HASH)));
        }

        let leaf_hash = self.write(writes, Node::Leaf { index, value });
        Ok(self.write(writes, Node::branch(new_bit, leaf_hash, old_hash)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::{
        collection::{btree_map, vec},
        prelude::*,
        proptest,
    };

    fn u(n: u64) -> U256 {
        U256::from(n)
    }

    #[test]
    fn test_update_keeps_old_root_provable() {
        let mut tree = SparseMerkleTree::new();
        let first = tree.insert_or_update(u(1), u(100)).unwrap();
        let second = tree.insert_or_update(u(1), u(200)).unwrap();
        assert_ne!(first, second);

        let old = tree.generate_proof(u(1), first).unwrap();
        let new = tree.generate_proof(u(1), second).unwrap();
        assert_eq!(old.value(), Some(u(100)));
        assert_eq!(new.value(), Some(u(200)));
        assert!(old.verify(tree.hasher()));
        assert!(new.verify(tree.hasher()));
    }

    #[test]
    fn test_empty_tree_proof() {
        let tree = SparseMerkleTree::new();
        let proof = tree.generate_proof(u(42), EMPTY_HASH).unwrap();
        assert_eq!(proof.membership, Membership::Empty);
        assert!(proof.siblings.is_empty());
        assert!(proof.verify(tree.hasher()));
    }

    #[test]
    fn test_non_inclusion_empty_subtree() {
        let mut tree = SparseMerkleTree::new();
        // 1 = 0b01 and 3 = 0b11 share bit 0, so a middle node with an empty
        // left child is created at depth 0
        tree.insert_or_update(u(1), u(10)).unwrap();
        tree.insert_or_update(u(3), u(30)).unwrap();

        let proof = tree.generate_proof(u(2), tree.root()).unwrap();
        assert_eq!(proof.membership, Membership::Empty);
        assert_eq!(proof.siblings.len(), 1);
        assert!(proof.verify(tree.hasher()));
    }

    #[test]
    fn test_non_inclusion_foreign_leaf() {
        let mut tree = SparseMerkleTree::new();
        tree.insert_or_update(u(1), u(10)).unwrap();
        tree.insert_or_update(u(2), u(20)).unwrap();

        let proof = tree.generate_proof(u(5), tree.root()).unwrap();
        assert_eq!(proof.membership, Membership::ForeignLeaf { index: u(1), value: u(10) });
        assert!(!proof.existence());
        assert!(proof.verify(tree.hasher()));
    }

    #[test]
    fn test_depth_exceeded() {
        let mut tree = SparseMerkleTree::with_max_depth(8).unwrap();
        tree.insert_or_update(u(255), u(1)).unwrap();

        let err = tree.insert_or_update(u(256), u(1)).unwrap_err();
        assert_eq!(err, SmtError::DepthExceeded { bits: 9, max_depth: 8 });
        assert!(matches!(
            tree.generate_proof(u(256), tree.root()),
            Err(SmtError::DepthExceeded { .. })
        ));
    }

    #[test]
    fn test_full_depth_collision() {
        // 127 and 255 differ only in the last bit of an 8-level tree
        let mut tree = SparseMerkleTree::with_max_depth(8).unwrap();
        tree.insert_or_update(u(127), u(1)).unwrap();
        tree.insert_or_update(u(255), u(2)).unwrap();

        let proof = tree.generate_proof(u(255), tree.root()).unwrap();
        assert_eq!(proof.siblings.len(), 8);
        assert_eq!(proof.value(), Some(u(2)));
        assert!(proof.verify(tree.hasher()));
    }

    #[test]
    fn test_invalid_depth() {
        assert_eq!(SparseMerkleTree::with_max_depth(0).unwrap_err(), SmtError::InvalidDepth(0));
        assert_eq!(
            SparseMerkleTree::with_max_depth(257).unwrap_err(),
            SmtError::InvalidDepth(257)
        );
    }

    #[test]
    fn test_prepare_does_not_mutate() {
        let mut tree = SparseMerkleTree::new();
        tree.insert_or_update(u(1), u(10)).unwrap();
        let root = tree.root();
        let nodes = tree.node_count();

        let update = tree.prepare(u(2), u(20)).unwrap();
        assert_eq!(tree.root(), root);
        assert_eq!(tree.node_count(), nodes);
        assert_eq!(update.base_root(), root);

        let new_root = update.root();
        assert_eq!(tree.commit(update).unwrap(), new_root);
    }

    #[test]
    fn test_stale_update_rejected() {
        let mut tree = SparseMerkleTree::new();
        let update = tree.prepare(u(1), u(10)).unwrap();
        tree.insert_or_update(u(2), u(20)).unwrap();

        let err = tree.commit(update).unwrap_err();
        assert!(matches!(err, SmtError::StaleUpdate { .. }));
    }

    #[test]
    fn test_from_nodes_roundtrip() {
        let mut tree = SparseMerkleTree::new();
        for i in 1..20 {
            tree.insert_or_update(u(i), u(i * 7)).unwrap();
        }
        let nodes: Vec<Node> = tree.nodes().copied().collect();
        let restored =
            SparseMerkleTree::from_nodes(DEFAULT_MAX_DEPTH, KeccakHasher, nodes, tree.root())
                .unwrap();
        assert_eq!(restored.root(), tree.root());
        assert_eq!(restored.get(u(7), restored.root()).unwrap(), Some(u(49)));

        let err = SparseMerkleTree::from_nodes(DEFAULT_MAX_DEPTH, KeccakHasher, vec![], u(1))
            .unwrap_err();
        assert_eq!(err, SmtError::MissingNode(u(1)));
    }

    #[test]
    fn test_insertion_order_independent() {
        let mut a = SparseMerkleTree::new();
        let mut b = SparseMerkleTree::new();
        for i in [5u64, 9, 12, 1] {
            a.insert_or_update(u(i), u(i + 1000)).unwrap();
        }
        for i in [1u64, 12, 9, 5] {
            b.insert_or_update(u(i), u(i + 1000)).unwrap();
        }
        assert_eq!(a.root(), b.root());
    }

    proptest! {
        #[test]
        fn proptest_proof_soundness(
            entries in btree_map(any::<u16>(), 1..u64::MAX, 1..64),
            probes in vec(any::<u16>(), 1..32),
        ) {
            let mut tree = SparseMerkleTree::with_max_depth(16).unwrap();
            for (index, value) in &entries {
                tree.insert_or_update(U256::from(*index), U256::from(*value)).unwrap();
            }
            let root = tree.root();

            for (index, value) in &entries {
                let proof = tree.generate_proof(U256::from(*index), root).unwrap();
                prop_assert_eq!(proof.value(), Some(U256::from(*value)));
                prop_assert!(proof.verify(tree.hasher()));
            }

            for probe in probes {
                let proof = tree.generate_proof(U256::from(probe), root).unwrap();
                prop_assert!(proof.verify(tree.hasher()));
                prop_assert_eq!(proof.existence(), entries.contains_key(&probe));
            }
        }
    }
}
