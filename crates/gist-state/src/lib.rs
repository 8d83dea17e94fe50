//! Identity state registry over the global identity state tree (GIST)
//!
//! This crate contains the state transition engine:
//! - Append-only root and per-identity state history with block/time lookup
//! - The transition state machine (genesis and non-genesis rules)
//! - GIST inclusion proofs against current and historical roots
//! - Snapshots of the whole registry

pub mod config;
pub mod error;
pub mod gist;
pub mod history;
pub mod registry;
pub mod snapshot;
pub mod types;
pub mod verifier;

pub use config::RegistryConfig;
pub use error::{HistoryError, IntegrityError, QueryError, TransitionError};
pub use gist::GistProofService;
pub use gist_smt::{KeccakHasher, Membership, SmtProof, U256};
pub use history::{ClockOrder, HistoryLog};
pub use registry::StateRegistry;
pub use snapshot::{IdentitySnapshot, RegistrySnapshot};
pub use types::*;
pub use verifier::{MockVerifier, StateTransitionVerifier, TransitionInputs, TransitionProof};
