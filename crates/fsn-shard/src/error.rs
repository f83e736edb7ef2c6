use fsn_types::{Address, PayloadRange, SplitInfo, TypeError};

/// Errors from shard operations.
#[derive(Debug, thiserror::Error)]
pub enum ShardError {
    /// No object is stored under the address.
    #[error("object not found: {0}")]
    NotFound(Address),

    /// The address is in the graveyard.
    #[error("object already removed: {0}")]
    AlreadyRemoved(Address),

    /// The address names a virtual object; follow the chain instead.
    #[error("object is split: {0:?}")]
    SplitInfo(SplitInfo),

    #[error("range {range:?} is out of bounds for payload of {size} bytes")]
    OutOfRange { range: PayloadRange, size: u64 },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data cannot be decoded.
    #[error("corrupt record {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

impl From<TypeError> for ShardError {
    fn from(e: TypeError) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<bincode::Error> for ShardError {
    fn from(e: bincode::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result alias for shard operations.
pub type ShardResult<T> = Result<T, ShardError>;
