use fsn_crypto::HasherError;
use fsn_engine::EngineError;
use fsn_types::{Address, ChecksumType, ObjectId, PayloadRange, SplitInfo};

/// Errors from object formatting, writing and assembly.
#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    #[error("object not found: {0}")]
    NotFound(Address),

    #[error("object already removed: {0}")]
    AlreadyRemoved(Address),

    #[error("object is split: {0:?}")]
    SplitInfo(SplitInfo),

    #[error("range {range:?} is out of bounds for payload of {size} bytes")]
    OutOfRange { range: PayloadRange, size: u64 },

    #[error("header must be written before payload")]
    HeaderNotWritten,

    #[error("header already written")]
    HeaderAlreadyWritten,

    #[error("target already closed")]
    Closed,

    #[error("malformed object: {0}")]
    Malformed(String),

    #[error("{kind:?} checksum mismatch")]
    ChecksumMismatch { kind: ChecksumType },

    #[error("object id mismatch: header hashes to {computed}, object claims {claimed}")]
    IdMismatch { claimed: ObjectId, computed: ObjectId },

    #[error("split chain broken: expected {expected}, got {actual}")]
    ChainBroken { expected: ObjectId, actual: ObjectId },

    /// A distributed write ran out of placement candidates.
    #[error("incomplete object put for {address}: {reason}")]
    IncompleteOperation { address: Address, reason: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("object sink failed: {0}")]
    Sink(String),

    #[error("hash error: {0}")]
    Hash(#[from] HasherError),

    #[error("engine error: {0}")]
    Engine(EngineError),
}

impl From<EngineError> for ObjectError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::NotFound(a) => Self::NotFound(a),
            EngineError::AlreadyRemoved(a) => Self::AlreadyRemoved(a),
            EngineError::SplitInfo(info) => Self::SplitInfo(info),
            EngineError::OutOfRange { range, size } => Self::OutOfRange { range, size },
            other => Self::Engine(other),
        }
    }
}

/// Result alias for object operations.
pub type ObjectResult<T> = Result<T, ObjectError>;
