//! Registry snapshots
//!
//! A snapshot is the registry's persisted layout: the SMT node set, the
//! root log, every identity log and the transition journal. Restoring
//! re-hashes the nodes, rebuilds the indices and replays the journal, so a
//! snapshot that does not reproduce its own history is refused.

use std::collections::HashMap;

use alloy_primitives::U256;
use gist_smt::{HashEngine, KeccakHasher, Node, SparseMerkleTree, EMPTY_HASH};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    config::RegistryConfig,
    error::IntegrityError,
    history::{ClockOrder, HistoryLog},
    registry::StateRegistry,
    types::{HistoryEntry, JournalEntry},
    verifier::StateTransitionVerifier,
};

/// Serializable registry state
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    /// Registry configuration
    pub config: RegistryConfig,
    /// SMT nodes of every recorded root, sorted by hash
    pub nodes: Vec<Node>,
    /// Root history
    pub roots: Vec<HistoryEntry>,
    /// Identity histories, sorted by id
    pub identities: Vec<IdentitySnapshot>,
    /// Committed transitions in order
    pub journal: Vec<JournalEntry>,
}

/// One identity's state history
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySnapshot {
    /// Identity
    pub id: U256,
    /// State history, oldest first
    pub states: Vec<HistoryEntry>,
}

impl StateRegistry {
    /// Restore a Keccak-hashed registry from a snapshot
    pub fn from_snapshot(
        snapshot: RegistrySnapshot,
        verifier: Box<dyn StateTransitionVerifier>,
    ) -> Result<Self, IntegrityError> {
        Self::from_snapshot_with_hasher(snapshot, KeccakHasher, verifier)
    }
}

impl<H: HashEngine> StateRegistry<H> {
    /// Capture the registry state. Output order is deterministic.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let hasher = self.tree.hasher();
        let mut nodes: Vec<Node> = self.tree.nodes().copied().collect();
        nodes.sort_by_cached_key(|node| node.hash(hasher));

        let mut identities: Vec<IdentitySnapshot> = self
            .identities
            .iter()
            .map(|(id, history)| IdentitySnapshot { id: *id, states: history.entries().to_vec() })
            .collect();
        identities.sort_by_key(|identity| identity.id);

        RegistrySnapshot {
            config: self.config.clone(),
            nodes,
            roots: self.roots.entries().to_vec(),
            identities,
            journal: self.journal.clone(),
        }
    }
}

impl<H: HashEngine + Clone> StateRegistry<H> {
    /// Restore a registry from a snapshot using `hasher`
    pub fn from_snapshot_with_hasher(
        snapshot: RegistrySnapshot,
        hasher: H,
        verifier: Box<dyn StateTransitionVerifier>,
    ) -> Result<Self, IntegrityError> {
        let RegistrySnapshot { config, nodes, roots, identities, journal } = snapshot;

        let root = roots.last().map_or(EMPTY_HASH, |entry| entry.value);
        let tree = SparseMerkleTree::from_nodes(config.max_depth, hasher, nodes, root)?;
        let mut registry = Self::from_parts(config, tree, verifier);

        registry.roots = rebuild_log(ClockOrder::NonDecreasing, &roots)
            .ok_or(IntegrityError::BrokenHistory(EMPTY_HASH))?;
        for (position, entry) in registry.roots.entries().iter().enumerate() {
            registry.root_positions.entry(entry.value).or_insert(position);
        }

        let mut journaled: HashMap<U256, Vec<U256>> = HashMap::new();
        for entry in &journal {
            journaled.entry(entry.id).or_default().push(entry.state);
        }

        for IdentitySnapshot { id, states } in identities {
            if states.is_empty() {
                return Err(IntegrityError::EmptyIdentityLog(id));
            }
            let history = rebuild_log(ClockOrder::Strict, &states)
                .ok_or(IntegrityError::BrokenHistory(id))?;

            let values: Vec<U256> = states.iter().map(|entry| entry.value).collect();
            if journaled.remove(&id).as_deref() != Some(values.as_slice()) {
                return Err(IntegrityError::BrokenHistory(id));
            }

            for (position, value) in values.into_iter().enumerate() {
                if registry.state_owners.insert(value, (id, position)).is_some() {
                    return Err(IntegrityError::DuplicateState(value));
                }
            }
            registry.identities.insert(id, history);
        }

        if let Some(id) = journaled.into_keys().next() {
            return Err(IntegrityError::BrokenHistory(id));
        }

        registry.journal = journal;
        registry.audit()?;

        // a transition's state entry and root entry carry the same clock
        for (position, entry) in registry.journal.iter().enumerate() {
            let state = registry
                .state_owners
                .get(&entry.state)
                .and_then(|(owner, index)| registry.identities.get(owner)?.get(*index));
            let root = registry.roots.get(position);
            match (state, root) {
                (Some(state), Some(root))
                    if state.created_at_block == root.created_at_block
                        && state.created_at_timestamp == root.created_at_timestamp => {}
                _ => return Err(IntegrityError::BrokenHistory(entry.id)),
            }
        }

        info!(
            identities = registry.identities.len(),
            transitions = registry.journal.len(),
            root = %registry.gist_root(),
            "Registry restored from snapshot"
        );
        Ok(registry)
    }
}

/// Re-append `entries` to a fresh log; `None` if they are not a valid history
fn rebuild_log(order: ClockOrder, entries: &[HistoryEntry]) -> Option<HistoryLog> {
    let mut log = HistoryLog::new(order);
    for entry in entries {
        log.append(entry.value, entry.created_at_block, entry.created_at_timestamp).ok()?;
    }
    (log.entries() == entries).then_some(log)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        types::TransitionRequest,
        verifier::{MockVerifier, TransitionProof},
    };

    fn u(n: u64) -> U256 {
        U256::from(n)
    }

    fn populated() -> StateRegistry {
        let mut registry =
            StateRegistry::new(RegistryConfig::default(), Box::new(MockVerifier::accepting()))
                .unwrap();
        let transitions = [(1, 0, 100, true), (2, 0, 200, true), (1, 100, 101, false)];
        for (block, (id, old, new, genesis)) in transitions.into_iter().enumerate() {
            let request = TransitionRequest {
                id: u(id),
                old_state: u(old),
                new_state: u(new),
                is_old_state_genesis: genesis,
                proof: TransitionProof::default(),
            };
            let block = block as u64 + 1;
            registry.transit_state(&request, block, block * 12).unwrap();
        }
        registry
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let registry = populated();
        let snapshot = registry.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let decoded: RegistrySnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, snapshot);

        let restored =
            StateRegistry::from_snapshot(decoded, Box::new(MockVerifier::accepting())).unwrap();
        assert_eq!(restored.gist_root(), registry.gist_root());
        assert_eq!(restored.state_info_by_id(u(1)).unwrap().state, u(101));
        assert!(restored.state_exists(u(1), u(100)));
        assert_eq!(restored.gist_root_history_length(), 3);
        assert_eq!(restored.snapshot(), snapshot);

        let proof = restored.gist().prove_at_block(u(1), 1).unwrap();
        assert_eq!(proof.value(), Some(u(100)));
    }

    #[test]
    fn test_empty_snapshot() {
        let registry =
            StateRegistry::new(RegistryConfig::default(), Box::new(MockVerifier::accepting()))
                .unwrap();
        let restored = StateRegistry::from_snapshot(
            registry.snapshot(),
            Box::new(MockVerifier::accepting()),
        )
        .unwrap();
        assert_eq!(restored.gist_root(), EMPTY_HASH);
    }

    #[test]
    fn test_tampered_journal_refused() {
        let mut snapshot = populated().snapshot();
        snapshot.journal.swap(0, 1);
        // per-identity order survives the swap, so only the replay catches it
        assert!(matches!(
            StateRegistry::from_snapshot(snapshot, Box::new(MockVerifier::accepting())),
            Err(IntegrityError::ReplayMismatch { position: 0, .. })
        ));
    }

    #[test]
    fn test_tampered_identity_refused() {
        let mut snapshot = populated().snapshot();
        snapshot.identities[0].states[1].value = u(999);
        assert!(matches!(
            StateRegistry::from_snapshot(snapshot, Box::new(MockVerifier::accepting())),
            Err(IntegrityError::BrokenHistory(_))
        ));
    }

    #[test]
    fn test_missing_historical_node_refused() {
        let mut snapshot = populated().snapshot();
        let before = snapshot.nodes.len();
        snapshot.nodes.retain(|node| *node != Node::Leaf { index: u(1), value: u(100) });
        assert_eq!(snapshot.nodes.len(), before - 1);

        // the current root is still walkable, only older roots lost a node
        let leaf = KeccakHasher.hash_leaf(u(1), u(100));
        assert_eq!(
            StateRegistry::from_snapshot(snapshot, Box::new(MockVerifier::accepting()))
                .unwrap_err(),
            IntegrityError::MissingNode(leaf)
        );
    }

    #[test]
    fn test_tampered_identity_clock_refused() {
        let mut snapshot = populated().snapshot();
        // still strictly increasing within the identity, but off the root log
        snapshot.identities[0].states[0].created_at_block = 0;
        snapshot.identities[0].states[0].created_at_timestamp = 5;
        assert_eq!(
            StateRegistry::from_snapshot(snapshot, Box::new(MockVerifier::accepting()))
                .unwrap_err(),
            IntegrityError::BrokenHistory(u(1))
        );
    }

    #[test]
    fn test_missing_nodes_refused() {
        let mut snapshot = populated().snapshot();
        snapshot.nodes.clear();
        assert!(matches!(
            StateRegistry::from_snapshot(snapshot, Box::new(MockVerifier::accepting())),
            Err(IntegrityError::Tree(_))
        ));
    }
}
