//! Configuration

use serde::{Deserialize, Serialize};
use std::env;

use gist_smt::DEFAULT_MAX_DEPTH;

/// Default upper bound on entries returned by one history range query
pub const DEFAULT_MAX_PAGE_LENGTH: usize = 1000;

/// Registry configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// GIST depth; identities must fit in this many bits
    pub max_depth: usize,
    /// Largest `count` accepted by history range queries
    pub max_page_length: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { max_depth: DEFAULT_MAX_DEPTH, max_page_length: DEFAULT_MAX_PAGE_LENGTH }
    }
}

impl RegistryConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        Self {
            max_depth: env::var("GIST_MAX_DEPTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_DEPTH),
            max_page_length: env::var("GIST_MAX_PAGE_LENGTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_PAGE_LENGTH),
        }
    }
}
