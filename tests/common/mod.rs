#![allow(dead_code)]

use heartbeat_classifier::config::PipelineConfig;
use heartbeat_classifier::model::{Activation, LayerArtifact, ModelArtifact};
use heartbeat_classifier::preprocessing::{normalize, BandPassFilter};
use heartbeat_classifier::LabelEncoder;
use ndarray::Array1;

pub const BEAT_LEN: usize = 187;
pub const SAMPLE_RATE: f64 = 125.0;

/// Class order of the fixture encoder, as a label encoder sorts them.
pub const CLASSES: [&str; 3] = ["Fusion", "Normal", "PVC"];

// (amplitude mV, center s, width s)
type Wave = (f64, f64, f64);

fn synthesize(waves: &[Wave], offset: f64, drift: f64) -> Vec<f64> {
    (0..BEAT_LEN)
        .map(|i| {
            let t = i as f64 / SAMPLE_RATE;
            let shape: f64 = waves
                .iter()
                .map(|&(amp, center, width)| amp * (-((t - center) / width).powi(2) / 2.0).exp())
                .sum();
            shape + offset + drift * t
        })
        .collect()
}

/// P, narrow QRS, upright T, with a baseline offset and slow drift.
pub fn normal_beat() -> Vec<f64> {
    synthesize(
        &[
            (0.15, 0.25, 0.025),
            (-0.10, 0.36, 0.010),
            (1.00, 0.40, 0.012),
            (-0.25, 0.44, 0.012),
            (0.30, 0.65, 0.050),
        ],
        0.3,
        0.1,
    )
}

/// No P wave, wide tall QRS, deep S and an inverted T.
pub fn pvc_beat() -> Vec<f64> {
    synthesize(
        &[
            (1.40, 0.42, 0.045),
            (-0.60, 0.53, 0.045),
            (-0.40, 0.85, 0.080),
        ],
        -0.2,
        0.0,
    )
}

/// Somewhere between the two: small P, moderately wide QRS, flat T.
pub fn fusion_beat() -> Vec<f64> {
    synthesize(
        &[
            (0.08, 0.25, 0.025),
            (1.20, 0.41, 0.028),
            (-0.40, 0.48, 0.028),
            (0.10, 0.72, 0.060),
        ],
        0.0,
        0.05,
    )
}

pub fn encoder() -> LabelEncoder {
    LabelEncoder::new(CLASSES.iter().map(|c| c.to_string()).collect()).unwrap()
}

/// Single linear layer scoring each class by negative squared distance to
/// that class's processed fixture beat, so each fixture is nearest to itself.
pub fn template_model(config: &PipelineConfig) -> ModelArtifact {
    let filter = BandPassFilter::design(&config.filter).unwrap();
    let scale = 50.0 / config.beat_len as f64;

    let templates: Vec<Array1<f64>> = [fusion_beat(), normal_beat(), pvc_beat()]
        .into_iter()
        .map(|beat| {
            let filtered = filter.apply(&Array1::from(beat)).unwrap();
            normalize(&filtered, config.normalization).unwrap()
        })
        .collect();

    // -scale/2 * |x - t|^2 up to a term shared by all classes
    let weights = templates
        .iter()
        .map(|t| t.iter().map(|x| x * scale).collect())
        .collect();
    let bias = templates
        .iter()
        .map(|t| -0.5 * scale * t.dot(t))
        .collect();

    ModelArtifact {
        input_len: config.beat_len,
        layers: vec![LayerArtifact {
            weights,
            bias,
            activation: Activation::Linear,
        }],
    }
}
