//! Error types for fastcam.

use thiserror::Error;

/// Result type alias using [`SaliencyError`].
pub type Result<T> = std::result::Result<T, SaliencyError>;

/// Broad class of a [`SaliencyError`].
///
/// Configuration errors are raised at construction, shape and
/// precondition errors at call time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Wrong tensor rank, size or content.
    Shape,
    /// Invalid construction parameters.
    Config,
    /// The call cannot be served in the current state.
    Precondition,
}

/// Errors raised while building or running a saliency pipeline.
#[derive(Error, Debug)]
pub enum SaliencyError {
    /// Invalid tensor shape provided.
    #[error("Invalid shape: expected {expected}, got {got}")]
    InvalidShape {
        /// Expected shape description.
        expected: String,
        /// Actual shape description.
        got: String,
    },

    /// Shape mismatch between tensors.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Tensor data could not be read back as numbers.
    #[error("Invalid tensor data: {0}")]
    InvalidTensor(String),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Layer name not exposed by the classifier.
    #[error("Unknown layer: {0}")]
    UnknownLayer(String),

    /// Method variant string that does not name a variant.
    #[error("Unsupported method variant: {0}")]
    UnsupportedMethod(String),

    /// Gradient pooling string that does not name a strategy.
    #[error("Unsupported gradient pooling: {0}")]
    UnsupportedPooling(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A required capture or state is missing.
    #[error("Precondition violated: {0}")]
    Precondition(String),

    /// Batched gradient saliency requested.
    #[error("Gradient saliency supports a single example per call, got batch size {0}")]
    BatchNotSupported(usize),

    /// Target class outside the logits range.
    #[error("Class index {index} out of range for {num_classes} classes")]
    ClassOutOfRange {
        /// Requested class index.
        index: usize,
        /// Number of classes produced by the classifier.
        num_classes: usize,
    },
}

impl SaliencyError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidShape { .. } | Self::ShapeMismatch(_) | Self::InvalidTensor(_) => {
                ErrorKind::Shape
            }
            Self::InvalidConfig(_)
            | Self::UnknownLayer(_)
            | Self::UnsupportedMethod(_)
            | Self::UnsupportedPooling(_)
            | Self::SerializationError(_) => ErrorKind::Config,
            Self::Precondition(_) | Self::BatchNotSupported(_) | Self::ClassOutOfRange { .. } => {
                ErrorKind::Precondition
            }
        }
    }
}
