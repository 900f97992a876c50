use crate::config::PipelineConfig;
use crate::data_loading;
use crate::labels::{self, LabelEncoder};
use crate::model::{self, Classifier};
use crate::preprocessing::{self, BandPassFilter};
use crate::validation;
use crate::{PipelineError, PredictionResult};
use log::{debug, info, warn};
use ndarray::{ArrayView1, ArrayViewD};
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Where a prediction currently is, or where it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validating,
    Filtering,
    Normalizing,
    Adapting,
    Inferring,
    Resolving,
    Done,
    Errored,
}

/// Sequences validation, filtering, normalization, inference and label
/// resolution for one beat at a time.
///
/// The model and label encoder are loaded once and shared read-only, so a
/// single instance can serve any number of threads.
pub struct HeartbeatClassifier {
    config: PipelineConfig,
    filter: BandPassFilter,
    model: Arc<dyn Classifier>,
    encoder: Arc<LabelEncoder>,
}

impl HeartbeatClassifier {
    /// Fails if the model, encoder and configuration disagree with each other;
    /// such a classifier must never serve requests.
    pub fn new(
        config: PipelineConfig,
        model: Arc<dyn Classifier>,
        encoder: Arc<LabelEncoder>,
    ) -> Result<Self, PipelineError> {
        config.check()?;
        if model.input_len() != config.beat_len {
            return Err(PipelineError::Configuration(format!(
                "model takes {} samples per beat, configured beat length is {}",
                model.input_len(),
                config.beat_len
            )));
        }
        if model.num_classes() != encoder.len() {
            return Err(PipelineError::Configuration(format!(
                "model scores {} classes, label encoder knows {}",
                model.num_classes(),
                encoder.len()
            )));
        }
        let filter = BandPassFilter::design(&config.filter)?;

        Ok(Self {
            config,
            filter,
            model,
            encoder,
        })
    }

    /// Loads the model and label encoder artifacts and builds the classifier.
    pub fn from_artifacts(
        config: PipelineConfig,
        model_path: &Path,
        labels_path: &Path,
    ) -> Result<Self, PipelineError> {
        let model = data_loading::load_model(model_path)?;
        let encoder = data_loading::load_label_encoder(labels_path)?;
        let classifier = Self::new(config, Arc::new(model), Arc::new(encoder))?;
        info!(
            "Classifier ready: {} samples per beat, classes {:?}",
            classifier.config.beat_len,
            classifier.encoder.classes()
        );
        Ok(classifier)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn encoder(&self) -> &LabelEncoder {
        &self.encoder
    }

    /// Classifies one beat. Never panics and never returns early with an
    /// error: every failure comes back as [`PredictionResult::Err`].
    pub fn predict_heartbeat(&self, input: ArrayViewD<'_, f64>) -> PredictionResult {
        let started = Instant::now();
        let mut stage = Stage::Validating;

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run(input, &mut stage)))
            .unwrap_or_else(|payload| {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "model runtime panicked".to_string());
                Err(PipelineError::Inference(message))
            });

        let outcome = outcome.and_then(|res| match self.config.deadline {
            Some(deadline) if started.elapsed() > deadline => Err(PipelineError::Deadline {
                elapsed_ms: started.elapsed().as_millis(),
                deadline_ms: deadline.as_millis(),
            }),
            _ => Ok(res),
        });

        match outcome {
            Ok(res) => {
                debug!("{:?} -> {:?}", stage, Stage::Done);
                PredictionResult::Ok {
                    label: res.label,
                    confidence: res.confidence,
                }
            }
            Err(err) => {
                warn!("Prediction failed while {:?}: {}", stage, err);
                debug!("{:?} -> {:?}", stage, Stage::Errored);
                PredictionResult::from_error(&err, stage)
            }
        }
    }

    /// Convenience for in-memory samples.
    pub fn predict_samples(&self, samples: &[f64]) -> PredictionResult {
        self.predict_heartbeat(ArrayView1::from(samples).into_dyn())
    }

    /// Loads a beat from disk and classifies it; unreadable or non-numeric
    /// files come back as failed predictions.
    pub fn predict_file(&self, path: &Path) -> PredictionResult {
        match data_loading::load_waveform(path) {
            Ok(arr) => self.predict_heartbeat(arr.view()),
            Err(err) => {
                warn!("Could not load {}: {}", path.display(), err);
                PredictionResult::from_error(&err, Stage::Validating)
            }
        }
    }

    fn enter(stage: &mut Stage, next: Stage) {
        debug!("{:?} -> {:?}", stage, next);
        *stage = next;
    }

    fn run(
        &self,
        input: ArrayViewD<'_, f64>,
        stage: &mut Stage,
    ) -> Result<labels::Resolution, PipelineError> {
        let validated =
            validation::validate(input, self.config.beat_len, self.config.length_policy)?;

        // unit peak keeps the filter and statistics finite for any amplitude
        let validated = preprocessing::unit_peak(&validated);

        Self::enter(stage, Stage::Filtering);
        let filtered = match self.filter.apply(&validated) {
            Ok(filtered) => filtered,
            Err(err @ PipelineError::Filter { .. }) => {
                warn!("{}; continuing with the unfiltered beat", err);
                validated.clone()
            }
            Err(err) => return Err(err),
        };

        Self::enter(stage, Stage::Normalizing);
        preprocessing::ensure_variance(&validated)?;
        let normalized = preprocessing::normalize(&filtered, self.config.normalization)?;

        Self::enter(stage, Stage::Adapting);
        let input = model::to_model_input(&normalized, self.model.input_len())?;

        Self::enter(stage, Stage::Inferring);
        let scores = self.model.infer(input.view())?;

        Self::enter(stage, Stage::Resolving);
        let resolution = labels::resolve(&scores, &self.encoder)?;
        debug!(
            "Resolved class {} ({}) with confidence {:.4}",
            resolution.index, resolution.label, resolution.confidence
        );
        Ok(resolution)
    }
}
