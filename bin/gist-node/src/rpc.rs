//! JSON-RPC surface
//!
//! One POST endpoint, positional params. Transitions take the write lock,
//! everything else shares the read lock.

use std::sync::{Arc, PoisonError, RwLock};

use axum::{extract::State as AxumState, Json};
use gist_state::{
    BlockNumber, QueryError, SmtProof, StateRegistry, Timestamp, TransitionError,
    TransitionProof, TransitionRequest, U256,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

pub(crate) type SharedState = Arc<RwLock<StateRegistry>>;

/// Unknown method
pub(crate) const METHOD_NOT_FOUND: i64 = -32601;
/// Params did not decode
pub(crate) const INVALID_PARAMS: i64 = -32602;
/// Result did not encode
pub(crate) const INTERNAL_ERROR: i64 = -32603;
/// State transition rejected by the registry
pub(crate) const TRANSITION_REJECTED: i64 = -32000;
/// Query failed (not found, unknown root, bad range)
pub(crate) const QUERY_FAILED: i64 = -32001;

/// JSON-RPC request
#[derive(Debug, Deserialize)]
pub(crate) struct RpcRequest {
    #[serde(default)]
    pub(crate) jsonrpc: String,
    pub(crate) method: String,
    #[serde(default)]
    pub(crate) params: Option<Value>,
    #[serde(default)]
    pub(crate) id: Value,
}

/// JSON-RPC response
#[derive(Debug, Serialize)]
pub(crate) struct RpcResponse {
    pub(crate) jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<RpcError>,
    pub(crate) id: Value,
}

/// JSON-RPC error object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct RpcError {
    pub(crate) code: i64,
    pub(crate) message: String,
}

impl RpcError {
    fn new(code: i64, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

impl From<TransitionError> for RpcError {
    fn from(err: TransitionError) -> Self {
        Self::new(TRANSITION_REJECTED, err.to_string())
    }
}

impl From<QueryError> for RpcError {
    fn from(err: QueryError) -> Self {
        Self::new(QUERY_FAILED, err.to_string())
    }
}

/// Params of `gist_transitState`
#[derive(Debug, Deserialize)]
struct TransitParams {
    id: U256,
    old_state: U256,
    new_state: U256,
    is_old_state_genesis: bool,
    #[serde(default)]
    proof: TransitionProof,
    block_number: BlockNumber,
    timestamp: Timestamp,
}

impl TransitParams {
    const fn request(&self) -> TransitionRequest {
        TransitionRequest {
            id: self.id,
            old_state: self.old_state,
            new_state: self.new_state,
            is_old_state_genesis: self.is_old_state_genesis,
            proof: self.proof,
        }
    }
}

/// GIST proof as returned over RPC
#[derive(Debug, Serialize)]
struct GistProof {
    #[serde(flatten)]
    proof: SmtProof,
    /// Siblings padded with empty hashes to the GIST depth
    padded_siblings: Vec<U256>,
}

impl GistProof {
    fn new(proof: SmtProof, depth: usize) -> Self {
        let padded_siblings = proof.padded_siblings(depth);
        Self { proof, padded_siblings }
    }
}

/// RPC handler
pub(crate) async fn rpc_handler(
    AxumState(state): AxumState<SharedState>,
    Json(req): Json<RpcRequest>,
) -> Json<RpcResponse> {
    Json(dispatch(&state, req))
}

/// Execute one request against the registry
pub(crate) fn dispatch(state: &SharedState, req: RpcRequest) -> RpcResponse {
    if !req.jsonrpc.is_empty() && req.jsonrpc != "2.0" {
        debug!(version = %req.jsonrpc, "Non-2.0 JSON-RPC request");
    }

    let (result, error) = match call(state, &req.method, req.params) {
        Ok(result) => (Some(result), None),
        Err(err) => {
            if err.code == TRANSITION_REJECTED {
                warn!(method = %req.method, error = %err.message, "Transition rejected");
            } else {
                debug!(method = %req.method, code = err.code, error = %err.message, "RPC error");
            }
            (None, Some(err))
        }
    };

    RpcResponse { jsonrpc: "2.0".to_string(), result, error, id: req.id }
}

fn call(state: &SharedState, method: &str, params: Option<Value>) -> Result<Value, RpcError> {
    if method == "gist_transitState" {
        let (transit,): (TransitParams,) = parse(params)?;
        let mut registry = state.write().unwrap_or_else(PoisonError::into_inner);
        let event =
            registry.transit_state(&transit.request(), transit.block_number, transit.timestamp)?;
        return encode(event);
    }

    let registry = state.read().unwrap_or_else(PoisonError::into_inner);
    let depth = registry.config().max_depth;
    match method {
        "gist_idExists" => {
            let (id,): (U256,) = parse(params)?;
            encode(registry.id_exists(id))
        }
        "gist_stateExists" => {
            let (id, state): (U256, U256) = parse(params)?;
            encode(registry.state_exists(id, state))
        }
        "gist_getStateInfoById" => {
            let (id,): (U256,) = parse(params)?;
            encode(registry.state_info_by_id(id)?)
        }
        "gist_getStateInfoByIdAndState" => {
            let (id, state): (U256, U256) = parse(params)?;
            encode(registry.state_info_by_id_and_state(id, state)?)
        }
        "gist_getStateInfoHistoryLengthById" => {
            let (id,): (U256,) = parse(params)?;
            encode(registry.state_history_length(id))
        }
        "gist_getStateInfoHistoryById" => {
            let (id, start, count): (U256, usize, usize) = parse(params)?;
            encode(registry.state_history(id, start, count)?)
        }
        "gist_getStateInfoByBlock" => {
            let (id, block): (U256, BlockNumber) = parse(params)?;
            encode(registry.state_info_by_block(id, block)?)
        }
        "gist_getStateInfoByTime" => {
            let (id, timestamp): (U256, Timestamp) = parse(params)?;
            encode(registry.state_info_by_time(id, timestamp)?)
        }
        "gist_getGISTRoot" => encode(registry.gist_root()),
        "gist_getGISTRootHistoryLength" => encode(registry.gist_root_history_length()),
        "gist_getGISTRootHistory" => {
            let (start, count): (usize, usize) = parse(params)?;
            encode(registry.gist_root_history(start, count)?)
        }
        "gist_getGISTRootInfo" => {
            let (root,): (U256,) = parse(params)?;
            encode(registry.gist_root_info(root)?)
        }
        "gist_getGISTRootInfoByBlock" => {
            let (block,): (BlockNumber,) = parse(params)?;
            encode(registry.gist_root_info_by_block(block)?)
        }
        "gist_getGISTRootInfoByTime" => {
            let (timestamp,): (Timestamp,) = parse(params)?;
            encode(registry.gist_root_info_by_time(timestamp)?)
        }
        "gist_getGISTProof" => {
            let (id,): (U256,) = parse(params)?;
            encode(GistProof::new(registry.gist().prove_current(id)?, depth))
        }
        "gist_getGISTProofByRoot" => {
            let (id, root): (U256, U256) = parse(params)?;
            encode(GistProof::new(registry.gist().prove_at_root(id, root)?, depth))
        }
        "gist_getGISTProofByBlock" => {
            let (id, block): (U256, BlockNumber) = parse(params)?;
            encode(GistProof::new(registry.gist().prove_at_block(id, block)?, depth))
        }
        "gist_getGISTProofByTime" => {
            let (id, timestamp): (U256, Timestamp) = parse(params)?;
            encode(GistProof::new(registry.gist().prove_at_time(id, timestamp)?, depth))
        }
        _ => Err(RpcError::new(METHOD_NOT_FOUND, format!("method {method} not found"))),
    }
}

fn parse<T: DeserializeOwned>(params: Option<Value>) -> Result<T, RpcError> {
    serde_json::from_value(params.unwrap_or_else(|| Value::Array(Vec::new())))
        .map_err(|err| RpcError::new(INVALID_PARAMS, format!("invalid params: {err}")))
}

fn encode<T: Serialize>(value: T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|err| RpcError::new(INTERNAL_ERROR, err.to_string()))
}
