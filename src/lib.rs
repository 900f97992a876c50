pub mod config;
pub mod data_loading;
pub mod error;
pub mod labels;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod preprocessing;
pub mod validation;

pub use config::PipelineConfig;
pub use error::{ErrorKind, PipelineError};
pub use labels::LabelEncoder;
pub use model::{Classifier, ClassScores, DenseNetwork, ScoreKind};
pub use pipeline::{HeartbeatClassifier, Stage};

use serde::Serialize;
use std::borrow::Cow;

/// Prefix of the rendered label of a failed prediction.
pub const ERROR_PREFIX: &str = "Error: ";

/// Outcome of classifying one beat.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PredictionResult {
    Ok {
        label: String,
        confidence: f64,
    },
    Err {
        kind: ErrorKind,
        stage: Stage,
        message: String,
    },
}

impl PredictionResult {
    pub fn from_error(err: &PipelineError, stage: Stage) -> Self {
        PredictionResult::Err {
            kind: err.kind(),
            stage,
            message: err.to_string(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, PredictionResult::Ok { .. })
    }

    /// Class name, or `Error: <reason>` for a failed prediction.
    pub fn label(&self) -> Cow<'_, str> {
        match self {
            PredictionResult::Ok { label, .. } => Cow::Borrowed(label),
            PredictionResult::Err { kind, .. } => Cow::Owned(format!("{}{}", ERROR_PREFIX, kind)),
        }
    }

    pub fn confidence(&self) -> Option<f64> {
        match self {
            PredictionResult::Ok { confidence, .. } => Some(*confidence),
            PredictionResult::Err { .. } => None,
        }
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            PredictionResult::Ok { .. } => None,
            PredictionResult::Err { kind, .. } => Some(*kind),
        }
    }
}
