//! Identity state registry

use std::{collections::HashMap, fmt};

use alloy_primitives::U256;
use gist_smt::{HashEngine, KeccakHasher, SmtError, SparseMerkleTree};
use tracing::{debug, info, warn};

use crate::{
    config::RegistryConfig,
    error::{IntegrityError, QueryError, TransitionError},
    gist::GistProofService,
    history::{ClockOrder, HistoryLog},
    types::{
        BlockNumber, GistRootInfo, HistoryEntry, JournalEntry, StateInfo, StateUpdated, Timestamp,
        TransitionRequest,
    },
    verifier::{StateTransitionVerifier, TransitionInputs},
};

/// Registry of identity states committed to the GIST.
///
/// Writes go through [`StateRegistry::transit_state`] and are all-or-nothing.
/// The registry does no locking of its own; callers serialize writers.
pub struct StateRegistry<H = KeccakHasher> {
    pub(crate) config: RegistryConfig,
    /// GIST: identity -> current state
    pub(crate) tree: SparseMerkleTree<H>,
    /// Global root history, one entry per committed transition
    pub(crate) roots: HistoryLog,
    /// Per-identity state history
    pub(crate) identities: HashMap<U256, HistoryLog>,
    /// Every state ever committed -> (owner, position in the owner's log)
    pub(crate) state_owners: HashMap<U256, (U256, usize)>,
    /// Root -> position in the root log
    pub(crate) root_positions: HashMap<U256, usize>,
    /// Committed transitions in order
    pub(crate) journal: Vec<JournalEntry>,
    verifier: Box<dyn StateTransitionVerifier>,
}

impl StateRegistry {
    /// Create an empty registry using the Keccak hash engine
    pub fn new(
        config: RegistryConfig,
        verifier: Box<dyn StateTransitionVerifier>,
    ) -> Result<Self, SmtError> {
        Self::with_hasher(config, KeccakHasher, verifier)
    }
}

impl<H: HashEngine> StateRegistry<H> {
    /// Create an empty registry using `hasher`
    pub fn with_hasher(
        config: RegistryConfig,
        hasher: H,
        verifier: Box<dyn StateTransitionVerifier>,
    ) -> Result<Self, SmtError> {
        let tree = SparseMerkleTree::with_hasher(config.max_depth, hasher)?;
        Ok(Self::from_parts(config, tree, verifier))
    }

    pub(crate) fn from_parts(
        config: RegistryConfig,
        tree: SparseMerkleTree<H>,
        verifier: Box<dyn StateTransitionVerifier>,
    ) -> Self {
        Self {
            config,
            tree,
            roots: HistoryLog::new(ClockOrder::NonDecreasing),
            identities: HashMap::new(),
            state_owners: HashMap::new(),
            root_positions: HashMap::new(),
            journal: Vec::new(),
            verifier,
        }
    }

    /// Registry configuration
    pub const fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Replace the proof verifier
    pub fn set_verifier(&mut self, verifier: Box<dyn StateTransitionVerifier>) {
        info!("State transition verifier replaced");
        self.verifier = verifier;
    }

    /// Apply a state transition.
    ///
    /// Structural checks run first and the proof is verified last, so a
    /// request that is already inconsistent never reaches the verifier.
    pub fn transit_state(
        &mut self,
        request: &TransitionRequest,
        block_number: BlockNumber,
        timestamp: Timestamp,
    ) -> Result<StateUpdated, TransitionError> {
        let TransitionRequest { id, old_state, new_state, is_old_state_genesis, proof } = *request;

        if id.is_zero() {
            return Err(TransitionError::ZeroId);
        }
        if new_state.is_zero() {
            return Err(TransitionError::ZeroNewState);
        }
        self.tree.check_index(id)?;

        if self.state_owners.contains_key(&new_state) {
            return Err(TransitionError::StateAlreadyExists(new_state));
        }

        let history = self.identities.get(&id);
        match (is_old_state_genesis, history) {
            (true, Some(_)) => return Err(TransitionError::GenesisButIdentityExists(id)),
            (true, None) => {}
            (false, None) => return Err(TransitionError::OldStateNotGenesisButNoIdentity(id)),
            (false, Some(history)) => {
                let Some(latest) = history.current().map(|entry| entry.value) else {
                    return Err(TransitionError::OldStateNotGenesisButNoIdentity(id));
                };
                if latest != old_state {
                    return Err(TransitionError::OldStateMismatch {
                        expected: latest,
                        got: old_state,
                    });
                }
            }
        }

        if let Some(history) = history {
            history.check_append(new_state, block_number, timestamp)?;
        }
        self.roots.check_clock(block_number, timestamp)?;

        let inputs = TransitionInputs { id, old_state, new_state, is_old_state_genesis };
        match self.verifier.verify(&inputs, &proof) {
            Ok(true) => {}
            Ok(false) => {
                warn!(id = %id, "State transition proof rejected");
                return Err(TransitionError::InvalidTransitionProof);
            }
            Err(err) => {
                warn!(id = %id, error = %err, "State transition proof verification failed");
                return Err(TransitionError::InvalidTransitionProof);
            }
        }

        let update = self.tree.prepare(id, new_state)?;
        let root = update.root();
        self.roots.check_append(root, block_number, timestamp)?;

        // Everything fallible has been checked; from here on the writes land together.
        self.tree.commit(update)?;
        let position = self
            .identities
            .entry(id)
            .or_insert_with(|| HistoryLog::new(ClockOrder::Strict))
            .append(new_state, block_number, timestamp)?;
        self.state_owners.insert(new_state, (id, position));
        let root_position = self.roots.append(root, block_number, timestamp)?;
        self.root_positions.entry(root).or_insert(root_position);
        self.journal.push(JournalEntry { id, state: new_state });

        info!(
            id = %id,
            state = %new_state,
            root = %root,
            block = block_number,
            timestamp,
            genesis = is_old_state_genesis,
            "State transition committed"
        );

        Ok(StateUpdated { id, block_number, timestamp, state: new_state, root })
    }

    /// Whether `id` has at least one committed state
    pub fn id_exists(&self, id: U256) -> bool {
        self.identities.contains_key(&id)
    }

    /// Whether `state` was ever committed for `id`
    pub fn state_exists(&self, id: U256, state: U256) -> bool {
        self.state_owners.get(&state).is_some_and(|(owner, _)| *owner == id)
    }

    /// Current state of `id`
    pub fn state_info_by_id(&self, id: U256) -> Result<StateInfo, QueryError> {
        let entry = self.history(id)?.current().ok_or(QueryError::NotFound)?;
        Ok(StateInfo::from_entry(id, entry))
    }

    /// A specific committed state of `id`
    pub fn state_info_by_id_and_state(
        &self,
        id: U256,
        state: U256,
    ) -> Result<StateInfo, QueryError> {
        let (owner, position) = self.state_owners.get(&state).ok_or(QueryError::NotFound)?;
        if *owner != id {
            return Err(QueryError::NotFound);
        }
        let entry = self.history(id)?.get(*position).ok_or(QueryError::NotFound)?;
        Ok(StateInfo::from_entry(id, entry))
    }

    /// Number of committed states of `id`; zero for unknown identities
    pub fn state_history_length(&self, id: U256) -> usize {
        self.identities.get(&id).map_or(0, HistoryLog::len)
    }

    /// `count` states of `id` starting at `start`, oldest first
    pub fn state_history(
        &self,
        id: U256,
        start: usize,
        count: usize,
    ) -> Result<Vec<StateInfo>, QueryError> {
        self.check_page(count)?;
        let entries = match self.identities.get(&id) {
            Some(history) => history.range(start, count)?,
            None => return Err(QueryError::OutOfBounds { start, count, len: 0 }),
        };
        Ok(entries.iter().map(|entry| StateInfo::from_entry(id, entry)).collect())
    }

    /// State of `id` in effect at `block_number`
    pub fn state_info_by_block(
        &self,
        id: U256,
        block_number: BlockNumber,
    ) -> Result<StateInfo, QueryError> {
        let entry = self.history(id)?.find_by_block(block_number)?;
        Ok(StateInfo::from_entry(id, entry))
    }

    /// State of `id` in effect at `timestamp`
    pub fn state_info_by_time(
        &self,
        id: U256,
        timestamp: Timestamp,
    ) -> Result<StateInfo, QueryError> {
        let entry = self.history(id)?.find_by_time(timestamp)?;
        Ok(StateInfo::from_entry(id, entry))
    }

    /// Current GIST root
    pub const fn gist_root(&self) -> U256 {
        self.tree.root()
    }

    /// Number of committed roots
    pub fn gist_root_history_length(&self) -> usize {
        self.roots.len()
    }

    /// `count` roots starting at `start`, oldest first
    pub fn gist_root_history(
        &self,
        start: usize,
        count: usize,
    ) -> Result<Vec<GistRootInfo>, QueryError> {
        self.check_page(count)?;
        Ok(self.roots.range(start, count)?.iter().map(GistRootInfo::from).collect())
    }

    /// Record of a root that was once current
    pub fn gist_root_info(&self, root: U256) -> Result<GistRootInfo, QueryError> {
        self.root_entry(root).map(GistRootInfo::from)
    }

    /// Root in effect at `block_number`
    pub fn gist_root_info_by_block(
        &self,
        block_number: BlockNumber,
    ) -> Result<GistRootInfo, QueryError> {
        self.roots.find_by_block(block_number).map(GistRootInfo::from)
    }

    /// Root in effect at `timestamp`
    pub fn gist_root_info_by_time(&self, timestamp: Timestamp) -> Result<GistRootInfo, QueryError> {
        self.roots.find_by_time(timestamp).map(GistRootInfo::from)
    }

    /// Proof service over the current and historical roots
    pub const fn gist(&self) -> GistProofService<'_, H> {
        GistProofService::new(self)
    }

    /// Committed transitions in order
    pub fn journal(&self) -> &[JournalEntry] {
        &self.journal
    }

    pub(crate) const fn tree(&self) -> &SparseMerkleTree<H> {
        &self.tree
    }

    pub(crate) fn root_entry(&self, root: U256) -> Result<&HistoryEntry, QueryError> {
        self.root_positions
            .get(&root)
            .and_then(|position| self.roots.get(*position))
            .ok_or(QueryError::UnknownRoot(root))
    }

    pub(crate) const fn roots(&self) -> &HistoryLog {
        &self.roots
    }

    fn history(&self, id: U256) -> Result<&HistoryLog, QueryError> {
        self.identities.get(&id).ok_or(QueryError::NotFound)
    }

    fn check_page(&self, count: usize) -> Result<(), QueryError> {
        if count > self.config.max_page_length {
            return Err(QueryError::PageTooLarge { count, max: self.config.max_page_length });
        }
        Ok(())
    }
}

impl<H: HashEngine + Clone> StateRegistry<H> {
    /// Rebuild the GIST from the journal on a fresh tree and return the root
    /// after every transition
    pub fn replay_roots(&self) -> Result<Vec<U256>, SmtError> {
        self.replay().map(|(_, roots)| roots)
    }

    fn replay(&self) -> Result<(SparseMerkleTree<H>, Vec<U256>), SmtError> {
        let mut tree =
            SparseMerkleTree::with_hasher(self.tree.max_depth(), self.tree.hasher().clone())?;
        let roots = self
            .journal
            .iter()
            .map(|entry| tree.insert_or_update(entry.id, entry.state))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((tree, roots))
    }

    /// Check that replaying the journal reproduces the root history and that
    /// every recorded root can still be walked
    pub fn audit(&self) -> Result<(), IntegrityError> {
        let (replay_tree, replayed) = self.replay()?;
        if replayed.len() != self.roots.len() {
            return Err(IntegrityError::LengthMismatch {
                journal: replayed.len(),
                roots: self.roots.len(),
            });
        }

        for (position, (actual, entry)) in replayed.iter().zip(self.roots.entries()).enumerate() {
            if *actual != entry.value {
                return Err(IntegrityError::ReplayMismatch {
                    position,
                    expected: entry.value,
                    actual: *actual,
                });
            }
        }

        let hasher = replay_tree.hasher();
        if let Some(missing) = replay_tree
            .nodes()
            .map(|node| node.hash(hasher))
            .find(|hash| !self.tree.contains_node(*hash))
        {
            return Err(IntegrityError::MissingNode(missing));
        }

        debug!(transitions = replayed.len(), "GIST replay matches root history");
        Ok(())
    }
}

impl<H: HashEngine> fmt::Debug for StateRegistry<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateRegistry")
            .field("config", &self.config)
            .field("root", &self.tree.root())
            .field("identities", &self.identities.len())
            .field("transitions", &self.journal.len())
            .finish_non_exhaustive()
    }
}
