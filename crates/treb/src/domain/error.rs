//! Per-component error taxonomy. Each component owns
//! a narrow `thiserror` enum; only [`ProjectionError`] and I/O failures are
//! allowed to abort a run outright, everything else is absorbed by its
//! caller and surfaced as a log line.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SenderConfigError {
    #[error("sender {name:?} of kind {kind:?} has no configured account")]
    MissingAccount { name: String, kind: &'static str },
    #[error("safe sender {name:?} references proposer {proposer:?}, which is itself a safe")]
    NestedSafeProposer { name: String, proposer: String },
    #[error("safe sender {name:?} references unknown proposer {proposer:?}")]
    UnknownProposer { name: String, proposer: String },
}

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("I/O error reading script output: {0}")]
    Io(#[from] std::io::Error),
    #[error("line exceeded the {limit} byte buffer limit")]
    LineTooLong { limit: usize },
}

#[derive(Debug, Error)]
#[error("failed to decode event with signature {signature}: {cause}")]
pub struct EventDecodeError {
    pub signature: alloy_primitives::B256,
    pub cause: String,
}

#[derive(Debug, Error)]
pub enum HydrateError {
    #[error("failed to read broadcast file {path}: {source}")]
    BroadcastRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse broadcast file {path}: {source}")]
    BroadcastParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("deployment {id} already exists in the registry")]
    DeploymentAlreadyExists { id: String },
    #[error("I/O error persisting registry: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize registry document: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("I/O error during snapshot operation on {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("blockchain probe failed: {0}")]
    Rpc(String),
    #[error("blockchain probe timed out after {0:?}")]
    Timeout(std::time::Duration),
}
