//! GIST proofs against current and historical roots

use alloy_primitives::U256;
use gist_smt::{HashEngine, SmtProof};
use tracing::debug;

use crate::{
    error::QueryError,
    registry::StateRegistry,
    types::{BlockNumber, Timestamp},
};

/// Read-only proof view over a [`StateRegistry`]
#[derive(Clone, Copy)]
pub struct GistProofService<'a, H> {
    registry: &'a StateRegistry<H>,
}

impl<H> std::fmt::Debug for GistProofService<'_, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GistProofService").finish_non_exhaustive()
    }
}

impl<'a, H: HashEngine> GistProofService<'a, H> {
    pub(crate) const fn new(registry: &'a StateRegistry<H>) -> Self {
        Self { registry }
    }

    /// Proof for `id` against the current root
    pub fn prove_current(&self, id: U256) -> Result<SmtProof, QueryError> {
        let tree = self.registry.tree();
        Ok(tree.generate_proof(id, tree.root())?)
    }

    /// Proof for `id` against a root from the root history
    pub fn prove_at_root(&self, id: U256, root: U256) -> Result<SmtProof, QueryError> {
        self.registry.root_entry(root)?;
        debug!(id = %id, root = %root, "Generating historical GIST proof");
        Ok(self.registry.tree().generate_proof(id, root)?)
    }

    /// Proof for `id` against the root in effect at `block_number`
    pub fn prove_at_block(
        &self,
        id: U256,
        block_number: BlockNumber,
    ) -> Result<SmtProof, QueryError> {
        let root = self.registry.roots().find_by_block(block_number)?.value;
        self.prove_at_root(id, root)
    }

    /// Proof for `id` against the root in effect at `timestamp`
    pub fn prove_at_time(&self, id: U256, timestamp: Timestamp) -> Result<SmtProof, QueryError> {
        let root = self.registry.roots().find_by_time(timestamp)?.value;
        self.prove_at_root(id, root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::RegistryConfig,
        types::TransitionRequest,
        verifier::{MockVerifier, TransitionProof},
    };
    use gist_smt::{KeccakHasher, Membership};

    fn u(n: u64) -> U256 {
        U256::from(n)
    }

    fn genesis(id: u64, state: u64) -> TransitionRequest {
        TransitionRequest {
            id: u(id),
            old_state: U256::ZERO,
            new_state: u(state),
            is_old_state_genesis: true,
            proof: TransitionProof::default(),
        }
    }

    #[test]
    fn test_prove_current_on_empty_registry() {
        let registry =
            StateRegistry::new(RegistryConfig::default(), Box::new(MockVerifier::accepting()))
                .unwrap();
        let proof = registry.gist().prove_current(u(1)).unwrap();
        assert_eq!(proof.root, U256::ZERO);
        assert_eq!(proof.membership, Membership::Empty);
        assert!(proof.verify(&KeccakHasher));
    }

    #[test]
    fn test_prove_at_block_and_time() {
        let mut registry =
            StateRegistry::new(RegistryConfig::default(), Box::new(MockVerifier::accepting()))
                .unwrap();
        let first = registry.transit_state(&genesis(1, 100), 10, 1_000).unwrap();
        let second = registry.transit_state(&genesis(2, 200), 20, 2_000).unwrap();

        let gist = registry.gist();
        let at_block = gist.prove_at_block(u(2), 15).unwrap();
        assert_eq!(at_block.root, first.root);
        assert!(!at_block.existence());
        assert!(at_block.verify(&KeccakHasher));

        let at_time = gist.prove_at_time(u(2), 2_000).unwrap();
        assert_eq!(at_time.root, second.root);
        assert_eq!(at_time.value(), Some(u(200)));

        assert_eq!(gist.prove_at_block(u(1), 9).unwrap_err(), QueryError::NotFound);
        assert_eq!(gist.prove_at_time(u(1), 999).unwrap_err(), QueryError::NotFound);
    }

    #[test]
    fn test_unknown_root() {
        let mut registry =
            StateRegistry::new(RegistryConfig::default(), Box::new(MockVerifier::accepting()))
                .unwrap();
        registry.transit_state(&genesis(1, 100), 1, 1).unwrap();

        // the empty root was never committed as a history entry
        assert_eq!(
            registry.gist().prove_at_root(u(1), U256::ZERO).unwrap_err(),
            QueryError::UnknownRoot(U256::ZERO)
        );
        assert_eq!(
            registry.gist().prove_at_root(u(1), u(7)).unwrap_err(),
            QueryError::UnknownRoot(u(7))
        );
    }
}
