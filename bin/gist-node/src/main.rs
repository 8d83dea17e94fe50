//! GIST Node
//!
//! A JSON-RPC node that:
//! - Accepts identity state transitions (gist_transitState)
//! - Serves current and historical state, root and proof queries
//! - Restores its registry from a snapshot at startup and writes one on shutdown

mod config;
mod rpc;

use std::{
    fs,
    path::Path,
    sync::{Arc, PoisonError, RwLock},
};

use anyhow::Context;
use axum::{routing::get, Router};
use gist_state::{RegistrySnapshot, StateRegistry};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::{
    config::NodeConfig,
    rpc::{rpc_handler, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    info!("Starting GIST node...");

    let config = NodeConfig::from_env();
    info!("  Verifier: {:?}", config.verifier);
    info!("  GIST depth: {}", config.registry.max_depth);
    info!("  Max page length: {}", config.registry.max_page_length);

    let registry = load_registry(&config)?;
    let state: SharedState = Arc::new(RwLock::new(registry));

    let app = Router::new()
        .route("/", get(health).post(rpc_handler))
        .route("/health", get(health))
        .with_state(state.clone());

    info!("RPC server listening on {}", config.rpc_addr);
    let listener = tokio::net::TcpListener::bind(&config.rpc_addr)
        .await
        .with_context(|| format!("binding {}", config.rpc_addr))?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    if let Some(path) = &config.snapshot_path {
        let registry = state.read().unwrap_or_else(PoisonError::into_inner);
        save_snapshot(&registry, path)?;
    }

    info!("GIST node stopped");
    Ok(())
}

/// Restore the registry from the configured snapshot, or start empty
fn load_registry(config: &NodeConfig) -> anyhow::Result<StateRegistry> {
    let verifier = config.verifier.build();

    let Some(path) = config.snapshot_path.as_deref().filter(|path| path.exists()) else {
        return Ok(StateRegistry::new(config.registry.clone(), verifier)?);
    };

    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading snapshot {}", path.display()))?;
    let snapshot: RegistrySnapshot = serde_json::from_str(&raw)
        .with_context(|| format!("decoding snapshot {}", path.display()))?;

    if snapshot.config != config.registry {
        warn!(
            snapshot = ?snapshot.config,
            env = ?config.registry,
            "Snapshot registry config differs from environment, keeping snapshot config"
        );
    }

    let registry = StateRegistry::from_snapshot(snapshot, verifier)
        .with_context(|| format!("restoring snapshot {}", path.display()))?;
    info!("Loaded snapshot from {}", path.display());
    Ok(registry)
}

/// Write the snapshot next to `path` first, then move it into place
fn save_snapshot(registry: &StateRegistry, path: &Path) -> anyhow::Result<()> {
    let json = serde_json::to_vec(&registry.snapshot())?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, json).with_context(|| format!("writing snapshot {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("replacing snapshot {}", path.display()))?;
    info!(
        transitions = registry.journal().len(),
        root = %registry.gist_root(),
        "Snapshot saved to {}",
        path.display()
    );
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Health check endpoint
async fn health() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use gist_state::{MockVerifier, RegistryConfig, TransitionProof, TransitionRequest, U256};

    #[test]
    fn test_snapshot_save_and_load() {
        let path = std::env::temp_dir().join(format!("gist-node-{}.json", std::process::id()));
        let mut registry =
            StateRegistry::new(RegistryConfig::default(), Box::new(MockVerifier::accepting()))
                .unwrap();
        let request = TransitionRequest {
            id: U256::from(1),
            old_state: U256::ZERO,
            new_state: U256::from(100),
            is_old_state_genesis: true,
            proof: TransitionProof::default(),
        };
        registry.transit_state(&request, 1, 12).unwrap();
        save_snapshot(&registry, &path).unwrap();

        let config = NodeConfig { snapshot_path: Some(path.clone()), ..NodeConfig::default() };
        let restored = load_registry(&config).unwrap();
        assert_eq!(restored.gist_root(), registry.gist_root());
        assert!(restored.id_exists(U256::from(1)));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_snapshot_starts_empty() {
        let config = NodeConfig {
            snapshot_path: Some(std::env::temp_dir().join("gist-node-does-not-exist.json")),
            ..NodeConfig::default()
        };
        let registry = load_registry(&config).unwrap();
        assert_eq!(registry.gist_root_history_length(), 0);
    }
}
