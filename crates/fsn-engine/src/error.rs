use fsn_shard::{ShardError, ShardId};
use fsn_types::{Address, PayloadRange, SplitInfo};

/// Errors from storage engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No shard holds the address.
    #[error("object not found: {0}")]
    NotFound(Address),

    /// The address is tombstoned.
    #[error("object already removed: {0}")]
    AlreadyRemoved(Address),

    /// The object is virtual; the merged split info says where to look.
    #[error("object is split: {0:?}")]
    SplitInfo(SplitInfo),

    #[error("range {range:?} is out of bounds for payload of {size} bytes")]
    OutOfRange { range: PayloadRange, size: u64 },

    #[error("engine has no shards")]
    NoShards,

    #[error("shard not found: {0}")]
    ShardNotFound(ShardId),

    #[error("shard already attached: {0}")]
    DuplicateShard(ShardId),

    #[error("shard error: {0}")]
    Shard(ShardError),
}

impl From<ShardError> for EngineError {
    fn from(e: ShardError) -> Self {
        match e {
            ShardError::NotFound(a) => Self::NotFound(a),
            ShardError::AlreadyRemoved(a) => Self::AlreadyRemoved(a),
            ShardError::SplitInfo(info) => Self::SplitInfo(info),
            ShardError::OutOfRange { range, size } => Self::OutOfRange { range, size },
            other => Self::Shard(other),
        }
    }
}

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
