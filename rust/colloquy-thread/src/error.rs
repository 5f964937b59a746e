use colloquy_encoding::AlphadecimalError;
use thiserror::Error;

use crate::{LockError, NodeId};

/// The common error type used by this crate
#[derive(Error, Debug)]
pub enum ThreadError {
    /// An integer could not be represented in a thread key
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A thread key (or one of its segments) is not well formed
    #[error("Malformed thread key {key:?}: {reason}")]
    MalformedKey {
        /// The rejected key
        key: String,
        /// What is wrong with it
        reason: String,
    },

    /// The observed maximum key does not sit at the depth implied by the
    /// parent key
    #[error("Depth mismatch: {0}")]
    DepthMismatch(String),

    /// A writer asked for a second key while its previous reservation was
    /// still outstanding
    #[error("Writer already holds an outstanding reservation")]
    DoubleAllocation,

    /// The thread index could not be queried
    #[error("Thread index unavailable: {0}")]
    StoreUnavailable(String),

    /// The lock service could not be reached or refused to operate
    #[error("Lock service unavailable: {0}")]
    LockServiceUnavailable(String),

    /// The parent node of a new node is not known to the thread index
    #[error("Parent node {0} is not known to the thread index")]
    UnknownParent(NodeId),

    /// There is no integer after the last one used at this depth
    #[error("No thread key follows {0}")]
    KeySpaceExhausted(String),

    /// A minted key does not fit the configured maximum length
    #[error("Thread key {key} exceeds the maximum length of {limit}")]
    KeyTooLong {
        /// The candidate key
        key: String,
        /// The configured limit
        limit: usize,
    },

    /// A node with the same identity or position already exists
    #[error("Node conflicts with an existing node: {0}")]
    DuplicateNode(String),

    /// Configuration could not be loaded
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl From<AlphadecimalError> for ThreadError {
    fn from(value: AlphadecimalError) -> Self {
        match value {
            AlphadecimalError::InvalidArgument(value) => {
                ThreadError::InvalidArgument(format!("cannot encode negative integer {value}"))
            }
            AlphadecimalError::MalformedKey { input, reason } => ThreadError::MalformedKey {
                key: input,
                reason: reason.to_string(),
            },
        }
    }
}

impl From<LockError> for ThreadError {
    fn from(value: LockError) -> Self {
        ThreadError::LockServiceUnavailable(value.to_string())
    }
}

impl From<serde_json::Error> for ThreadError {
    fn from(value: serde_json::Error) -> Self {
        ThreadError::Configuration(value.to_string())
    }
}
