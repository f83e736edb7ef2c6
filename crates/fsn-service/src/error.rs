use fsn_crypto::HasherError;
use fsn_engine::EngineError;
use fsn_object::ObjectError;
use fsn_placement::PlacementError;
use fsn_types::{Address, PayloadRange, SplitInfo};

/// Errors from distributed object operations.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("object not found: {0}")]
    NotFound(Address),

    #[error("object already removed: {0}")]
    AlreadyRemoved(Address),

    #[error("object is split: {0:?}")]
    SplitInfo(SplitInfo),

    #[error("range {range:?} is out of bounds for payload of {size} bytes")]
    OutOfRange { range: PayloadRange, size: u64 },

    /// Placement groups ran out before the success threshold was met.
    #[error("incomplete operation on {address}: {reason}")]
    IncompleteOperation { address: Address, reason: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("node {0} is unreachable")]
    Unreachable(String),

    #[error("node answered with {0}")]
    UnexpectedAnswer(&'static str),

    #[error("hash error: {0}")]
    Hash(#[from] HasherError),

    #[error("placement error: {0}")]
    Placement(#[from] PlacementError),

    #[error("object error: {0}")]
    Object(ObjectError),

    #[error("engine error: {0}")]
    Engine(EngineError),
}

impl From<EngineError> for ServiceError {
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

impl From<ObjectError> for ServiceError {
    fn from(e: ObjectError) -> Self {
        match e {
            ObjectError::NotFound(a) => Self::NotFound(a),
            ObjectError::AlreadyRemoved(a) => Self::AlreadyRemoved(a),
            ObjectError::SplitInfo(info) => Self::SplitInfo(info),
            ObjectError::OutOfRange { range, size } => Self::OutOfRange { range, size },
            ObjectError::IncompleteOperation { address, reason } => {
                Self::IncompleteOperation { address, reason }
            }
            ObjectError::Cancelled => Self::Cancelled,
            ObjectError::Engine(e) => e.into(),
            other => Self::Object(other),
        }
    }
}

impl From<ServiceError> for ObjectError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::NotFound(a) => Self::NotFound(a),
            ServiceError::AlreadyRemoved(a) => Self::AlreadyRemoved(a),
            ServiceError::SplitInfo(info) => Self::SplitInfo(info),
            ServiceError::OutOfRange { range, size } => Self::OutOfRange { range, size },
            ServiceError::IncompleteOperation { address, reason } => {
                Self::IncompleteOperation { address, reason }
            }
            ServiceError::Cancelled => Self::Cancelled,
            ServiceError::Object(e) => e,
            ServiceError::Engine(e) => e.into(),
            other => Self::Sink(other.to_string()),
        }
    }
}

/// Result alias for distributed operations.
pub type ServiceResult<T> = Result<T, ServiceError>;
