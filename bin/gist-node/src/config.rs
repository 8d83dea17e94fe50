//! Node configuration

use std::{env, path::PathBuf};

use gist_state::{MockVerifier, RegistryConfig, StateTransitionVerifier};
use serde::{Deserialize, Serialize};

/// Which transition proof verifier the node runs with
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub(crate) enum VerifierMode {
    /// Accept every proof (development only)
    #[default]
    Mock,
    /// Reject every proof (read-only node)
    Reject,
}

impl From<&str> for VerifierMode {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "reject" | "readonly" | "read-only" => Self::Reject,
            _ => Self::Mock,
        }
    }
}

impl VerifierMode {
    pub(crate) fn build(self) -> Box<dyn StateTransitionVerifier> {
        match self {
            Self::Mock => Box::new(MockVerifier::accepting()),
            Self::Reject => Box::new(MockVerifier::rejecting()),
        }
    }
}

/// Node configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct NodeConfig {
    /// JSON-RPC listen address
    pub(crate) rpc_addr: String,
    /// Registry snapshot loaded at startup and written on shutdown
    pub(crate) snapshot_path: Option<PathBuf>,
    pub(crate) verifier: VerifierMode,
    pub(crate) registry: RegistryConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            rpc_addr: "0.0.0.0:8547".to_string(),
            snapshot_path: None,
            verifier: VerifierMode::Mock,
            registry: RegistryConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Load from environment variables
    pub(crate) fn from_env() -> Self {
        Self {
            rpc_addr: env::var("GIST_RPC_ADDR").unwrap_or_else(|_| "0.0.0.0:8547".to_string()),
            snapshot_path: env::var("GIST_SNAPSHOT_PATH").ok().map(PathBuf::from),
            verifier: env::var("GIST_VERIFIER")
                .map(|s| VerifierMode::from(s.as_str()))
                .unwrap_or_default(),
            registry: RegistryConfig::from_env(),
        }
    }
}
