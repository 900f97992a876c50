use crate::model::{ClassScores, ScoreKind};
use crate::PipelineError;
use log::debug;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Fixed index-to-name mapping established when the model was trained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

// Accepts a bare `["Fusion", "Normal", ...]` or `{ "classes": [...] }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum EncoderArtifact {
    Bare(Vec<String>),
    Wrapped { classes: Vec<String> },
}

impl<'de> Deserialize<'de> for LabelEncoder {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let classes = match EncoderArtifact::deserialize(deserializer)? {
            EncoderArtifact::Bare(classes) => classes,
            EncoderArtifact::Wrapped { classes } => classes,
        };
        LabelEncoder::new(classes).map_err(serde::de::Error::custom)
    }
}

impl LabelEncoder {
    pub fn new(classes: Vec<String>) -> Result<Self, PipelineError> {
        if classes.is_empty() {
            return Err(PipelineError::model_load("label encoder", "no classes"));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = classes.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(PipelineError::model_load(
                "label encoder",
                format!("duplicate class {:?}", dup),
            ));
        }
        Ok(Self { classes })
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.classes.get(index).map(String::as_str)
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn contains(&self, label: &str) -> bool {
        self.classes.iter().any(|c| c == label)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub index: usize,
    pub label: String,
    pub confidence: f64,
}

/// Numerically stable softmax.
pub fn softmax(logits: &Array1<f64>) -> Array1<f64> {
    let max = logits.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    let exp = logits.mapv(|x| (x - max).exp());
    let sum = exp.sum();
    exp / sum
}

fn to_probabilities(scores: &ClassScores) -> Result<Array1<f64>, PipelineError> {
    if scores.values.is_empty() {
        return Err(PipelineError::Inference("model returned no scores".into()));
    }
    if scores.values.iter().any(|v| !v.is_finite()) {
        return Err(PipelineError::Inference("non-finite class score".into()));
    }

    match scores.kind {
        ScoreKind::Logits => Ok(softmax(&scores.values)),
        ScoreKind::Probabilities => {
            if scores.values.iter().any(|&p| p < 0.0) {
                return Err(PipelineError::Inference("negative class probability".into()));
            }
            let sum = scores.values.sum();
            if sum <= 0.0 {
                return Err(PipelineError::Inference("class probabilities sum to zero".into()));
            }
            if (sum - 1.0).abs() > 1e-6 {
                debug!("Renormalizing class probabilities summing to {}", sum);
                return Ok(&scores.values / sum);
            }
            Ok(scores.values.clone())
        }
    }
}

/// Picks the best class (lowest index wins ties) and names it.
pub fn resolve(scores: &ClassScores, encoder: &LabelEncoder) -> Result<Resolution, PipelineError> {
    let probs = to_probabilities(scores)?;

    let mut best = 0;
    for (i, &p) in probs.iter().enumerate().skip(1) {
        if p > probs[best] {
            best = i;
        }
    }

    let label = encoder.name(best).ok_or(PipelineError::UnknownClass {
        index: best,
        known: encoder.len(),
    })?;

    Ok(Resolution {
        index: best,
        label: label.to_string(),
        confidence: probs[best].clamp(0.0, 1.0),
    })
}
