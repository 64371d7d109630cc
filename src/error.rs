//! Error types for the wire codec, network wiring, and protocol invariants.

use thiserror::Error;

/// Errors raised while wiring the initial neighbor graph, before any node starts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("node id {0} is already registered")]
    DuplicateNodeId(u64),
    #[error("holder {holder} for node {id} was not registered before it")]
    UnknownHolderId { id: u64, holder: u64 },
}

/// Errors raised while decoding a wire frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("frame is missing the '*' separated fields it needs")]
    Truncated,
    #[error("unknown message type code {0:?}")]
    UnknownType(char),
    #[error("sender id {0:?} is not a valid integer")]
    InvalidSenderId(String),
    #[error("advise body {0:?} does not have the 3 comma-separated fields it needs")]
    MalformedAdviseBody(String),
    #[error("advise boolean {0:?} is neither 'True' nor 'False'")]
    InvalidBool(String),
}

/// A violation of a protocol invariant: always a bug, never recoverable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NodeError {
    #[error("node {id} received ASSIGN from {from} while already holding the token")]
    AssignWhileHolder { id: u64, from: u64 },
    #[error("node {id} received {kind} from {from}, which is not a neighbor")]
    MessageFromNonNeighbor { id: u64, from: u64, kind: &'static str },
}
