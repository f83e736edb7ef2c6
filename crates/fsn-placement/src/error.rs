use fsn_types::ContainerId;

/// Errors from placement computation.
#[derive(Debug, thiserror::Error)]
pub enum PlacementError {
    #[error("container not found: {0}")]
    ContainerNotFound(ContainerId),

    #[error("local node is outside of object placement")]
    LocalNodeNotFound,

    #[error("replica {index} needs {needed} nodes, network map has {available}")]
    NotEnoughNodes {
        index: usize,
        needed: usize,
        available: usize,
    },

    #[error("placement policy has no replicas")]
    EmptyPolicy,

    #[error("network map unavailable: {0}")]
    NetmapUnavailable(String),
}

/// Result alias for placement operations.
pub type PlacementResult<T> = Result<T, PlacementError>;
