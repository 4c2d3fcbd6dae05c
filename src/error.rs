use thiserror::Error;

/// Error types for the multiexp-rs library.
#[derive(Error, Debug)]
pub enum MultiExpError {
    /// Error indicating a mismatch in array dimensions.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Error for parameter-related problems.
    #[error("Parameter error: {0}")]
    ParameterError(String),

    /// Error during residual evaluation.
    #[error("Function evaluation error: {0}")]
    FunctionEvaluation(String),

    /// Invalid input data.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Linear algebra error.
    #[error("Linear algebra error: {0}")]
    LinearAlgebraError(String),

    /// I/O error wrapper.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl From<crate::parameters::ParameterError> for MultiExpError {
    fn from(err: crate::parameters::ParameterError) -> Self {
        MultiExpError::ParameterError(err.to_string())
    }
}

impl From<crate::parameters::SerializationError> for MultiExpError {
    fn from(err: crate::parameters::SerializationError) -> Self {
        use crate::parameters::SerializationError;
        match err {
            SerializationError::IoError(e) => MultiExpError::IoError(e),
            SerializationError::JsonError(e) => MultiExpError::JsonError(e),
        }
    }
}

/// Result type alias for multiexp-rs operations.
pub type Result<T> = std::result::Result<T, MultiExpError>;
