use thiserror::Error;

use crate::slots::{LocalSlot, SlotKind, SlotParseError};

/// Fatal protocol violations. None of these are recovered from internally;
/// the host is expected to treat the peer channel (or the whole component)
/// as corrupted.
#[derive(Debug, Error)]
pub enum CommsError {
    #[error("unknown {space} identifier '{id}'")]
    UnknownIdentifier { space: &'static str, id: String },
    #[error("{space} identifier '{id}' is already in use")]
    IdentifierInUse { space: &'static str, id: String },
    #[error("unknown message target {0}")]
    UnknownTarget(LocalSlot),
    #[error("unknown remote '{0}'")]
    UnknownRemote(String),
    #[error("duplicate remote '{0}'")]
    DuplicateRemote(String),
    #[error("promise {0} is already resolved")]
    AlreadyResolved(LocalSlot),
    #[error("promise {0} is not resolved")]
    NotResolved(LocalSlot),
    #[error("promise {promise} decider is {found}, expected {expected}")]
    WrongDecider {
        promise: LocalSlot,
        expected: String,
        found: String,
    },
    #[error("slot '{slot}' is not a {expected}")]
    WrongSlotKind { slot: String, expected: SlotKind },
    #[error("illegal method name '{0}'")]
    IllegalMethodName(String),
    #[error("unexpected seqNum '{found}' from remote '{remote}', expected {expected}")]
    SequenceError {
        remote: String,
        expected: u64,
        found: String,
    },
    #[error("unordered message from remote '{0}' rejected")]
    UnorderedRejected(String),
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    #[error("unrecognized command '{0}' in received message")]
    UnknownCommand(String),
    #[error("resolution batch is empty")]
    EmptyResolutionBatch,
    #[error(transparent)]
    InvalidSlot(#[from] SlotParseError),
    #[error("resolution chain exceeds depth limit {0}")]
    ResolutionTooDeep(usize),
    #[error("snapshot error: {0}")]
    Snapshot(String),
}

impl From<serde_cbor::Error> for CommsError {
    fn from(err: serde_cbor::Error) -> Self {
        CommsError::Snapshot(err.to_string())
    }
}
