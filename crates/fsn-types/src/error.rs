/// Errors from type construction, parsing, and encoding.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid address {0:?}: expected <container>/<object>")]
    InvalidAddress(String),

    #[error("invalid split id: {0}")]
    InvalidSplitId(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
