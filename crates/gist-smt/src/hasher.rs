//! Hash engines for SMT nodes and leaves

use alloy_primitives::U256;
use tiny_keccak::{Hasher, Keccak};

/// Sentinel mixed into every leaf hash so a leaf can never be confused with a
/// middle node that happens to hash the same two words.
pub const LEAF_SENTINEL: U256 = U256::from_limbs([1, 0, 0, 0]);

/// Fixed-arity hash over field elements.
///
/// The tree only ever calls this with one, two or three inputs.
/// Implementations must be deterministic and free of side effects.
pub trait HashEngine {
    /// Hash a short sequence of elements
    fn hash(&self, inputs: &[U256]) -> U256;

    /// Hash of a middle node
    fn hash_node(&self, left: U256, right: U256) -> U256 {
        self.hash(&[left, right])
    }

    /// Hash of a leaf node
    fn hash_leaf(&self, index: U256, value: U256) -> U256 {
        self.hash(&[index, value, LEAF_SENTINEL])
    }
}

/// Keccak256 hash engine
#[derive(Clone, Copy, Debug, Default)]
pub struct KeccakHasher;

impl HashEngine for KeccakHasher {
    fn hash(&self, inputs: &[U256]) -> U256 {
        let mut hasher = Keccak::v256();
        for input in inputs {
            hasher.update(&input.to_be_bytes::<32>());
        }
        let mut output = [0u8; 32];
        hasher.finalize(&mut output);
        U256::from_be_bytes(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_pair() {
        let hasher = KeccakHasher;
        let hash = hasher.hash_node(U256::from(1), U256::from(2));
        assert_ne!(hash, U256::ZERO);
        assert_ne!(hash, hasher.hash_node(U256::from(2), U256::from(1)));
    }

    #[test]
    fn test_leaf_differs_from_node() {
        let hasher = KeccakHasher;
        let (index, value) = (U256::from(7), U256::from(9));
        assert_ne!(hasher.hash_leaf(index, value), hasher.hash_node(index, value));
        assert_eq!(
            hasher.hash_leaf(index, value),
            hasher.hash(&[index, value, U256::from(1)])
        );
    }

    #[test]
    fn test_arity_is_part_of_the_hash() {
        let hasher = KeccakHasher;
        let one = hasher.hash(&[U256::from(5)]);
        let two = hasher.hash(&[U256::from(5), U256::ZERO]);
        assert_ne!(one, two);
    }
}
