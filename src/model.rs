//! Classifier seam and the dense network the pipeline ships with.
//!
//! Inference runs through [`Classifier`], which takes `&self` so one loaded
//! model can be shared by every caller without locking. Runtimes that keep
//! mutable scratch state implement [`ExclusiveClassifier`] instead and are
//! wrapped in [`Serialized`], which queues callers on a single mutex.

use crate::PipelineError;
use log::trace;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Whether class scores are already probabilities or still raw logits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreKind {
    Probabilities,
    Logits,
}

/// One score per known class, in label-encoder index order.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassScores {
    pub values: Array1<f64>,
    pub kind: ScoreKind,
}

pub trait Classifier: Send + Sync {
    /// Samples per beat the model consumes
    fn input_len(&self) -> usize;
    fn num_classes(&self) -> usize;
    /// Scores a `(1, input_len)` batch.
    fn infer(&self, input: ArrayView2<'_, f64>) -> Result<ClassScores, PipelineError>;
}

/// A model runtime that is not reentrant.
pub trait ExclusiveClassifier: Send {
    fn input_len(&self) -> usize;
    fn num_classes(&self) -> usize;
    fn infer_mut(&mut self, input: ArrayView2<'_, f64>) -> Result<ClassScores, PipelineError>;
}

/// Serializes all predictions through one inference slot.
pub struct Serialized<C> {
    input_len: usize,
    num_classes: usize,
    inner: Mutex<C>,
}

impl<C: ExclusiveClassifier> Serialized<C> {
    pub fn new(inner: C) -> Self {
        Self {
            input_len: inner.input_len(),
            num_classes: inner.num_classes(),
            inner: Mutex::new(inner),
        }
    }

    pub fn into_inner(self) -> C {
        self.inner.into_inner()
    }
}

impl<C: ExclusiveClassifier> Classifier for Serialized<C> {
    fn input_len(&self) -> usize {
        self.input_len
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn infer(&self, input: ArrayView2<'_, f64>) -> Result<ClassScores, PipelineError> {
        self.inner.lock().infer_mut(input)
    }
}

/// Reshapes a processed beat into the `(batch = 1, samples)` layout the
/// classifier consumes. A length that disagrees with the model means the
/// deployment is misconfigured.
pub fn to_model_input(beat: &Array1<f64>, input_len: usize) -> Result<Array2<f64>, PipelineError> {
    if beat.len() != input_len {
        return Err(PipelineError::Configuration(format!(
            "model expects {} samples per beat, pipeline produced {}",
            input_len,
            beat.len()
        )));
    }
    Ok(beat.view().insert_axis(Axis(0)).to_owned())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Linear,
    Relu,
    Sigmoid,
    Tanh,
    Softmax,
}

impl Activation {
    fn apply(&self, z: &mut Array2<f64>) {
        match self {
            Activation::Linear => {}
            Activation::Relu => z.mapv_inplace(|x| x.max(0.0)),
            Activation::Sigmoid => z.mapv_inplace(|x| 1.0 / (1.0 + (-x).exp())),
            Activation::Tanh => z.mapv_inplace(f64::tanh),
            Activation::Softmax => {
                for mut row in z.rows_mut() {
                    let max = row.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
                    row.mapv_inplace(|x| (x - max).exp());
                    let sum = row.sum();
                    row.mapv_inplace(|x| x / sum);
                }
            }
        }
    }
}

/// On-disk form of a [`DenseNetwork`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub input_len: usize,
    pub layers: Vec<LayerArtifact>,
}

/// `weights` holds one row per unit, each row as long as the layer's input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerArtifact {
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
    #[serde(default)]
    pub activation: Activation,
}

#[derive(Debug, Clone)]
struct DenseLayer {
    weights: Array2<f64>, // (units, inputs)
    bias: Array1<f64>,
    activation: Activation,
}

/// Feed-forward network evaluated with plain matrix products.
#[derive(Debug, Clone)]
pub struct DenseNetwork {
    input_len: usize,
    layers: Vec<DenseLayer>,
}

impl DenseNetwork {
    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self, PipelineError> {
        let corrupt = |msg: String| PipelineError::model_load("model", msg);

        if artifact.input_len == 0 {
            return Err(corrupt("input_len is zero".into()));
        }
        if artifact.layers.is_empty() {
            return Err(corrupt("model has no layers".into()));
        }

        let mut width = artifact.input_len;
        let mut layers = Vec::with_capacity(artifact.layers.len());
        for (idx, layer) in artifact.layers.into_iter().enumerate() {
            let units = layer.weights.len();
            if units == 0 || layer.bias.len() != units {
                return Err(corrupt(format!(
                    "layer {}: {} weight rows but {} biases",
                    idx,
                    units,
                    layer.bias.len()
                )));
            }
            if let Some(row) = layer.weights.iter().position(|r| r.len() != width) {
                return Err(corrupt(format!(
                    "layer {}: row {} has {} weights, expected {}",
                    idx,
                    row,
                    layer.weights[row].len(),
                    width
                )));
            }
            let flat: Vec<f64> = layer.weights.into_iter().flatten().collect();
            if flat.iter().chain(layer.bias.iter()).any(|x| !x.is_finite()) {
                return Err(corrupt(format!("layer {}: non-finite parameter", idx)));
            }
            let weights = Array2::from_shape_vec((units, width), flat)
                .map_err(|e| corrupt(format!("layer {}: {}", idx, e)))?;

            layers.push(DenseLayer {
                weights,
                bias: Array1::from(layer.bias),
                activation: layer.activation,
            });
            width = units;
        }

        Ok(Self {
            input_len: artifact.input_len,
            layers,
        })
    }

    pub fn to_artifact(&self) -> ModelArtifact {
        ModelArtifact {
            input_len: self.input_len,
            layers: self
                .layers
                .iter()
                .map(|l| LayerArtifact {
                    weights: l.weights.rows().into_iter().map(|r| r.to_vec()).collect(),
                    bias: l.bias.to_vec(),
                    activation: l.activation,
                })
                .collect(),
        }
    }

    fn score_kind(&self) -> ScoreKind {
        match self.layers.last().map(|l| l.activation) {
            Some(Activation::Softmax) => ScoreKind::Probabilities,
            _ => ScoreKind::Logits,
        }
    }
}

impl Classifier for DenseNetwork {
    fn input_len(&self) -> usize {
        self.input_len
    }

    fn num_classes(&self) -> usize {
        self.layers.last().map_or(0, |l| l.bias.len())
    }

    fn infer(&self, input: ArrayView2<'_, f64>) -> Result<ClassScores, PipelineError> {
        if input.nrows() != 1 || input.ncols() != self.input_len {
            return Err(PipelineError::Inference(format!(
                "malformed input tensor {:?}, expected [1, {}]",
                input.shape(),
                self.input_len
            )));
        }

        let mut x = input.to_owned();
        for layer in &self.layers {
            let mut z = x.dot(&layer.weights.t()) + &layer.bias;
            layer.activation.apply(&mut z);
            x = z;
        }
        trace!("Network output {:?}", x);

        let values = x.row(0).to_owned();
        if values.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::Inference(
                "network produced non-finite scores".into(),
            ));
        }
        Ok(ClassScores {
            values,
            kind: self.score_kind(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    fn tiny_network(last: Activation) -> DenseNetwork {
        DenseNetwork::from_artifact(ModelArtifact {
            input_len: 3,
            layers: vec![
                LayerArtifact {
                    weights: vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, -1.0]],
                    bias: vec![0.0, 0.5],
                    activation: Activation::Relu,
                },
                LayerArtifact {
                    weights: vec![vec![2.0, 0.0], vec![0.0, 1.0]],
                    bias: vec![0.0, 0.0],
                    activation: last,
                },
            ],
        })
        .unwrap()
    }

    #[test]
    fn forward_pass_matches_hand_computation() {
        let net = tiny_network(Activation::Linear);
        let scores = net.infer(arr2(&[[1.0, 2.0, 3.0]]).view()).unwrap();
        // hidden = relu([1, 2 - 3 + 0.5]) = [1, 0]
        assert_eq!(scores.values.to_vec(), vec![2.0, 0.0]);
        assert_eq!(scores.kind, ScoreKind::Logits);
    }

    #[test]
    fn softmax_head_yields_probabilities() {
        let net = tiny_network(Activation::Softmax);
        let scores = net.infer(arr2(&[[1.0, 2.0, 3.0]]).view()).unwrap();
        assert_eq!(scores.kind, ScoreKind::Probabilities);
        assert!((scores.values.sum() - 1.0).abs() < 1e-12);
        assert!(scores.values[0] > scores.values[1]);
    }

    #[test]
    fn malformed_tensor_is_an_inference_error() {
        let net = tiny_network(Activation::Linear);
        let err = net.infer(arr2(&[[1.0, 2.0]]).view()).unwrap_err();
        assert!(matches!(err, PipelineError::Inference(_)));
    }

    #[test]
    fn inconsistent_artifact_fails_to_load() {
        let mut artifact = tiny_network(Activation::Linear).to_artifact();
        artifact.layers[1].weights[0].push(1.0);
        let err = DenseNetwork::from_artifact(artifact).unwrap_err();
        assert!(matches!(err, PipelineError::ModelLoad { .. }));

        let empty = ModelArtifact {
            input_len: 3,
            layers: vec![],
        };
        assert!(DenseNetwork::from_artifact(empty).is_err());
    }

    #[test]
    fn adapter_adds_batch_axis() {
        let beat = Array1::from(vec![0.1, 0.2, 0.3]);
        let input = to_model_input(&beat, 3).unwrap();
        assert_eq!(input.shape(), &[1, 3]);
        assert!(matches!(
            to_model_input(&beat, 4),
            Err(PipelineError::Configuration(_))
        ));
    }

    struct CountingRuntime {
        calls: usize,
    }

    impl ExclusiveClassifier for CountingRuntime {
        fn input_len(&self) -> usize {
            2
        }

        fn num_classes(&self) -> usize {
            2
        }

        fn infer_mut(&mut self, _input: ArrayView2<'_, f64>) -> Result<ClassScores, PipelineError> {
            self.calls += 1;
            Ok(ClassScores {
                values: Array1::from(vec![0.25, 0.75]),
                kind: ScoreKind::Probabilities,
            })
        }
    }

    #[test]
    fn serialized_runtime_sees_every_call() {
        let model = Serialized::new(CountingRuntime { calls: 0 });
        let input = arr2(&[[0.0, 1.0]]);
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..25 {
                        model.infer(input.view()).unwrap();
                    }
                });
            }
        });
        assert_eq!(model.into_inner().calls, 100);
    }
}
