use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Everything that can go wrong between a raw amplitude array and a label.
///
/// `ModelLoad` and `Configuration` are raised while the classifier is being
/// built and stop the process from serving. The rest are per-request and end
/// up inside a [`crate::PredictionResult::Err`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("invalid waveform shape: {0}")]
    Shape(String),

    #[error("expected {expected} samples, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("signal of {len} samples is shorter than the {min_len} the filter needs")]
    Filter { len: usize, min_len: usize },

    #[error("signal has no variance (std {std:e})")]
    DegenerateSignal { std: f64 },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to load {artifact}: {message}")]
    ModelLoad { artifact: String, message: String },

    #[error("class index {index} has no label ({known} labels known)")]
    UnknownClass { index: usize, known: usize },

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("prediction took {elapsed_ms} ms, deadline is {deadline_ms} ms")]
    Deadline { elapsed_ms: u128, deadline_ms: u128 },

    #[error("cannot read {path}: {message}")]
    Input { path: String, message: String },
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Shape(_) => ErrorKind::Shape,
            PipelineError::LengthMismatch { .. } => ErrorKind::LengthMismatch,
            PipelineError::Filter { .. } => ErrorKind::Filter,
            PipelineError::DegenerateSignal { .. } => ErrorKind::DegenerateSignal,
            PipelineError::Configuration(_) => ErrorKind::Configuration,
            PipelineError::ModelLoad { .. } => ErrorKind::ModelLoad,
            PipelineError::UnknownClass { .. } => ErrorKind::UnknownClass,
            PipelineError::Inference(_) => ErrorKind::Inference,
            PipelineError::Deadline { .. } => ErrorKind::Deadline,
            PipelineError::Input { .. } => ErrorKind::Input,
        }
    }

    pub(crate) fn model_load(artifact: impl fmt::Display, message: impl fmt::Display) -> Self {
        PipelineError::ModelLoad {
            artifact: artifact.to_string(),
            message: message.to_string(),
        }
    }
}

/// Coarse error category carried by failed predictions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Shape,
    LengthMismatch,
    Filter,
    DegenerateSignal,
    Configuration,
    ModelLoad,
    UnknownClass,
    Inference,
    Deadline,
    Input,
}

impl ErrorKind {
    /// Short reason shown after the `Error: ` prefix.
    pub fn reason(&self) -> &'static str {
        match self {
            ErrorKind::Shape => "Invalid shape",
            ErrorKind::LengthMismatch => "Length mismatch",
            ErrorKind::Filter => "Filter failure",
            ErrorKind::DegenerateSignal => "Degenerate signal",
            ErrorKind::Configuration => "Configuration error",
            ErrorKind::ModelLoad => "Model load failure",
            ErrorKind::UnknownClass => "Unknown class",
            ErrorKind::Inference => "Inference failure",
            ErrorKind::Deadline => "Deadline exceeded",
            ErrorKind::Input => "Unreadable input",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}
