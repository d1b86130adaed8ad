use crate::{chain::Stage, sync::Peer, Hash};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons a block or a candidate chain is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("bad index: expected {expected}, got {found}")]
    BadIndex { expected: u64, found: u64 },
    #[error("block {index}: previous hash {found} does not match tip {expected}")]
    BadPreviousHash {
        index: u64,
        expected: Hash,
        found: Hash,
    },
    #[error("block {index}: stored hash {found} does not match recomputed {expected}")]
    HashMismatch {
        index: u64,
        expected: Hash,
        found: Hash,
    },
    #[error("block {index}: hash does not have {difficulty} leading zeros")]
    ProofOfWorkInvalid { index: u64, difficulty: u32 },
    #[error("block {index}: difficulty {difficulty} is below the accepted minimum {minimum}")]
    DifficultyTooLow {
        index: u64,
        difficulty: u32,
        minimum: u32,
    },
    #[error("chain is empty")]
    EmptyChain,
    #[error("chain is {actual:?}, expected {expected:?}")]
    WrongStage { expected: Stage, actual: Stage },
}

impl ChainError {
    /// True when the block was well formed but raced a tip change.
    pub fn is_stale_tip(&self) -> bool {
        matches!(
            self,
            ChainError::BadIndex { .. } | ChainError::BadPreviousHash { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustReason {
    SpaceExhausted,
    DeadlineElapsed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("mining stopped ({reason:?}) after {attempts} nonces")]
pub struct MiningExhausted {
    pub reason: ExhaustReason,
    pub attempts: u64,
}

/// Malformed chain or block documents.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("declared length {declared} but {actual} blocks present")]
    LengthMismatch { declared: u64, actual: usize },
    #[error("block key {0:?} is not an index")]
    BadIndexKey(String),
    #[error("block {index} appears more than once")]
    DuplicateIndex { index: u64 },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Mining(#[from] MiningExhausted),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("peer {peer} unreachable: {reason}")]
    PeerUnreachable { peer: Peer, reason: String },
    #[error("none of {candidates} peer chains passed validation")]
    NoValidPeerChain { candidates: usize },
}

/// Coarse error category, shared with front ends over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Chain,
    MiningExhausted,
    Wire,
    PeerUnreachable,
    NoValidPeerChain,
}

impl ErrorKind {
    /// Process exit code a CLI front end reports for this category.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::Chain => 2,
            ErrorKind::MiningExhausted => 3,
            ErrorKind::PeerUnreachable => 4,
            ErrorKind::NoValidPeerChain => 5,
            ErrorKind::Wire => 6,
        }
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Chain(_) => ErrorKind::Chain,
            Error::Mining(_) => ErrorKind::MiningExhausted,
            Error::Wire(_) => ErrorKind::Wire,
            Error::PeerUnreachable { .. } => ErrorKind::PeerUnreachable,
            Error::NoValidPeerChain { .. } => ErrorKind::NoValidPeerChain,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }
}
