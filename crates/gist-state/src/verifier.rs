//! State transition proof verification

use alloy_primitives::U256;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Public inputs of the state transition circuit
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionInputs {
    /// Identity being transitioned
    pub id: U256,
    /// State the identity claims to leave
    pub old_state: U256,
    /// State the identity moves to
    pub new_state: U256,
    /// Whether `old_state` is the identity's genesis state
    pub is_old_state_genesis: bool,
}

impl TransitionInputs {
    /// Public signals in circuit order: id, old state, new state, genesis flag
    pub fn public_signals(&self) -> [U256; 4] {
        [self.id, self.old_state, self.new_state, U256::from(self.is_old_state_genesis as u8)]
    }
}

/// Groth16 proof points
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionProof {
    /// G1 point A
    pub a: [U256; 2],
    /// G2 point B
    pub b: [[U256; 2]; 2],
    /// G1 point C
    pub c: [U256; 2],
}

/// Checks state transition proofs.
///
/// `Ok(false)` and `Err(_)` are both treated as a rejected proof.
pub trait StateTransitionVerifier: Send + Sync {
    /// Verify `proof` against the transition's public inputs
    fn verify(&self, inputs: &TransitionInputs, proof: &TransitionProof) -> Result<bool>;
}

/// Mock verifier (no actual proof checking)
#[derive(Clone, Copy, Debug)]
pub struct MockVerifier {
    accept: bool,
}

impl MockVerifier {
    /// Accepts every proof
    pub fn accepting() -> Self {
        info!("Using mock verifier: every transition proof is accepted");
        Self { accept: true }
    }

    /// Rejects every proof
    pub fn rejecting() -> Self {
        info!("Using mock verifier: every transition proof is rejected");
        Self { accept: false }
    }
}

impl Default for MockVerifier {
    fn default() -> Self {
        Self::accepting()
    }
}

impl StateTransitionVerifier for MockVerifier {
    fn verify(&self, inputs: &TransitionInputs, _proof: &TransitionProof) -> Result<bool> {
        debug!(signals = ?inputs.public_signals(), accept = self.accept, "Mock proof verification");
        Ok(self.accept)
    }
}
