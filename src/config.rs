use clap::Parser;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// What to do with a beat whose length differs from the model's window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthPolicy {
    Strict,        // reject anything that is not exactly beat_len (default)
    PadOrTruncate, // zero-pad the tail or cut it off
    Resample,      // Fourier resampling to beat_len
}

impl FromStr for LengthPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strict" => Ok(LengthPolicy::Strict),
            "pad" | "pad-or-truncate" => Ok(LengthPolicy::PadOrTruncate),
            "resample" => Ok(LengthPolicy::Resample),
            _ => Err(format!(
                "Invalid length policy: {}. Use strict (default), pad or resample",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalization {
    ZScore, // per-segment mean 0, std 1 (default)
    MinMax, // per-segment min/max mapped to [-1, 1]
}

impl FromStr for Normalization {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "zscore" | "z-score" => Ok(Normalization::ZScore),
            "minmax" | "min-max" => Ok(Normalization::MinMax),
            _ => Err(format!(
                "Invalid normalization: {}. Use zscore (default) or minmax",
                s
            )),
        }
    }
}

/// Band-pass settings for the zero-phase Butterworth filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterConfig {
    pub sample_rate: f64,
    pub low_cut: f64,
    pub high_cut: f64,
    pub order: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            sample_rate: 125.0,
            low_cut: 0.5,
            high_cut: 40.0,
            order: 2,
        }
    }
}

/// Everything the pipeline needs besides the model and the label encoder.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Samples per beat window the model was trained on
    pub beat_len: usize,
    pub length_policy: LengthPolicy,
    pub filter: FilterConfig,
    pub normalization: Normalization,
    /// Per-call deadline; a prediction that finishes later is reported as failed
    pub deadline: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            beat_len: 187,
            length_policy: LengthPolicy::Strict,
            filter: FilterConfig::default(),
            normalization: Normalization::ZScore,
            deadline: None,
        }
    }
}

impl PipelineConfig {
    /// Rejects settings the filter designer or the validator cannot work with.
    pub fn check(&self) -> Result<(), crate::PipelineError> {
        let f = &self.filter;
        let nyquist = f.sample_rate / 2.0;
        if self.beat_len == 0 {
            return Err(crate::PipelineError::Configuration(
                "beat_len must be positive".into(),
            ));
        }
        if f.order == 0 {
            return Err(crate::PipelineError::Configuration(
                "filter order must be positive".into(),
            ));
        }
        if !(f.low_cut > 0.0 && f.low_cut < f.high_cut && f.high_cut < nyquist) {
            return Err(crate::PipelineError::Configuration(format!(
                "band {}-{} Hz does not fit below the {} Hz Nyquist frequency",
                f.low_cut, f.high_cut, nyquist
            )));
        }
        Ok(())
    }
}

/// Classify ECG heartbeat segments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Beat files (.npy or .csv) or directories containing them
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Trained model artifact (.json or .cbor)
    #[arg(long, env = "HEARTBEAT_MODEL")]
    pub model: PathBuf,

    /// Label encoder artifact (.json or .cbor)
    #[arg(long, env = "HEARTBEAT_LABELS")]
    pub labels: PathBuf,

    /// Samples per beat expected by the model
    #[arg(long, default_value = "187")]
    pub beat_len: usize,

    /// How to handle beats of the wrong length (strict, pad, resample)
    #[arg(long, default_value = "strict")]
    pub length_policy: LengthPolicy,

    /// Sampling rate of the beats in Hz
    #[arg(long, default_value = "125.0")]
    pub sample_rate: f64,

    /// Band-pass lower cutoff in Hz
    #[arg(long, default_value = "0.5")]
    pub low_cut: f64,

    /// Band-pass upper cutoff in Hz
    #[arg(long, default_value = "40.0")]
    pub high_cut: f64,

    /// Butterworth filter order
    #[arg(long, default_value = "2")]
    pub filter_order: usize,

    /// Amplitude normalization the model was trained with (zscore, minmax)
    #[arg(long, default_value = "zscore")]
    pub normalization: Normalization,

    /// Per-prediction deadline in milliseconds
    #[arg(long)]
    pub deadline_ms: Option<u64>,

    /// Print one JSON object per input instead of plain text
    #[arg(long)]
    pub json: bool,

    /// Write a CSV report of all predictions to this path
    #[arg(long)]
    pub csv_output: Option<PathBuf>,
}

impl Args {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            beat_len: self.beat_len,
            length_policy: self.length_policy,
            filter: FilterConfig {
                sample_rate: self.sample_rate,
                low_cut: self.low_cut,
                high_cut: self.high_cut,
                order: self.filter_order,
            },
            normalization: self.normalization,
            deadline: self.deadline_ms.map(Duration::from_millis),
        }
    }
}
