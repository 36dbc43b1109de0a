use crate::backend::BackendError;
use crate::input::DecodeError;
use crate::matcher::MatchError;
use crate::objects::ObjectDetectorError;
use crate::store::StoreError;
use thiserror::Error;

/// Failure of an engine operation before it is mapped to a safe default.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("input decode: {0}")]
    InputDecode(#[from] DecodeError),
    #[error("no face detected")]
    NoFaceDetected,
    #[error("only {accepted} samples accepted, {required} required")]
    InsufficientSamples { accepted: usize, required: usize },
    #[error("probe embedding has {probe} values, template holds {stored:?}")]
    DimensionalityMismatch { probe: usize, stored: Vec<usize> },
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("no template enrolled")]
    NoTemplate,
    #[error("no usable similarity score")]
    NoValidScores,
    #[error("face backend: {0}")]
    Backend(BackendError),
    #[error("object detector: {0}")]
    Objects(#[from] ObjectDetectorError),
    #[error("template store: {0}")]
    Store(#[from] StoreError),
    #[error("internal panic: {0}")]
    Panicked(String),
}

impl EngineError {
    /// Whether this is an ordinary non-match rather than a fault.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::NoTemplate
                | Self::NoFaceDetected
                | Self::DimensionalityMismatch { .. }
                | Self::NoValidScores
                | Self::ModelUnavailable(_)
                | Self::InputDecode(_)
        )
    }
}

impl From<BackendError> for EngineError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Unavailable(reason) => Self::ModelUnavailable(reason),
            other => Self::Backend(other),
        }
    }
}

impl From<MatchError> for EngineError {
    fn from(err: MatchError) -> Self {
        match err {
            MatchError::EmptyTemplate => Self::NoTemplate,
            MatchError::DimensionalityMismatch { probe, stored } => {
                Self::DimensionalityMismatch { probe, stored }
            }
            MatchError::NoValidScores => Self::NoValidScores,
        }
    }
}
