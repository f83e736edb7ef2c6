use fsn_engine::EngineError;
use fsn_placement::PlacementError;
use fsn_service::ServiceError;

/// Errors raised while policing a single object.
#[derive(Debug, thiserror::Error)]
pub enum PolicerError {
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("placement error: {0}")]
    Placement(#[from] PlacementError),

    #[error("service error: {0}")]
    Service(#[from] ServiceError),

    #[error("replication queue closed")]
    ReplicatorClosed,
}

/// Result alias for policer operations.
pub type PolicerResult<T> = Result<T, PolicerError>;
