use crate::config::{FilterConfig, Normalization};
use crate::PipelineError;
use log::{debug, trace};
use ndarray::Array1;
use sci_rs::signal::filter::design::{
    butter_dyn, DigitalFilter, FilterBandType, FilterOutputType, Sos, SosFormatFilter,
};
use sci_rs::signal::filter::sosfiltfilt_dyn;

/// Spread below this fraction of the peak amplitude is a flat line.
pub const DEGENERATE_EPSILON: f64 = 1e-9;

/// High-pass time constants of mirrored signal added on each side of a beat.
const EDGE_TIME_CONSTANTS: f64 = 8.0;

/// Zero-phase Butterworth band-pass, designed once and reused for every beat.
pub struct BandPassFilter {
    sos: Vec<Sos<f64>>,
    min_len: usize,
    // samples of mirror extension added on each side before filtering
    edge_pad: usize,
}

impl BandPassFilter {
    pub fn design(config: &FilterConfig) -> Result<Self, PipelineError> {
        let filter = butter_dyn(
            config.order,
            vec![config.low_cut, config.high_cut],
            Some(FilterBandType::Bandpass),
            Some(false),
            Some(FilterOutputType::Sos),
            Some(config.sample_rate),
        );
        let DigitalFilter::Sos(SosFormatFilter { sos }) = filter else {
            return Err(PipelineError::Configuration(
                "filter design did not produce second-order sections".into(),
            ));
        };

        // forward-backward filtering pads 3 * ntaps samples on each side by odd
        // extension and needs strictly more input than that
        let ntaps = 2 * sos.len() + 1;
        let min_len = 3 * ntaps + 1;
        // the high-pass edge transient needs several time constants to die
        // out, far more than the built-in pad on a short beat
        let time_constant = config.sample_rate / (2.0 * std::f64::consts::PI * config.low_cut);
        let edge_pad = (EDGE_TIME_CONSTANTS * time_constant).ceil() as usize;
        debug!(
            "Designed order {} band-pass {}-{} Hz at {} Hz: {} sections, min length {}, edge pad {}",
            config.order,
            config.low_cut,
            config.high_cut,
            config.sample_rate,
            sos.len(),
            min_len,
            edge_pad
        );

        Ok(Self {
            sos,
            min_len,
            edge_pad,
        })
    }

    /// Shortest input `apply` accepts.
    pub fn min_len(&self) -> usize {
        self.min_len
    }

    /// Filters forward and backward so QRS peaks keep their position.
    pub fn apply(&self, data: &Array1<f64>) -> Result<Array1<f64>, PipelineError> {
        if data.len() < self.min_len {
            return Err(PipelineError::Filter {
                len: data.len(),
                min_len: self.min_len,
            });
        }
        let n = data.len();
        let pad = self.edge_pad;
        let extended = mirror_extend(data, pad);
        let filtered = sosfiltfilt_dyn(extended.iter(), &self.sos);
        trace!("Filtered {} samples ({} padded)", n, extended.len());
        Ok(Array1::from(filtered[pad..pad + n].to_vec()))
    }
}

/// Reflects the beat about its end samples, repeating the reflection when
/// `pad` exceeds the beat. No level step appears at the edges, unlike an odd
/// extension. Needs at least two samples.
fn mirror_extend(data: &Array1<f64>, pad: usize) -> Vec<f64> {
    let n = data.len() as isize;
    let period = 2 * (n - 1);
    let pad = pad as isize;
    (-pad..n + pad)
        .map(|j| {
            let j = j.rem_euclid(period);
            data[(if j < n { j } else { period - j }) as usize]
        })
        .collect()
}

/// Largest absolute sample, or `None` if there is nothing finite to scale by.
fn peak_amplitude(data: &Array1<f64>) -> Option<f64> {
    let peak = data.iter().fold(0.0f64, |a, &b| a.max(b.abs()));
    (peak.is_finite() && peak > 0.0).then_some(peak)
}

/// Divides by the peak amplitude so later statistics cannot overflow.
/// Filtering and both normalizations are scale invariant, so the result
/// classifies the same as the original.
pub fn unit_peak(data: &Array1<f64>) -> Array1<f64> {
    match peak_amplitude(data) {
        Some(peak) => data.mapv(|x| x / peak),
        None => data.clone(),
    }
}

/// Fails on a flat line, before or after filtering.
pub fn ensure_variance(data: &Array1<f64>) -> Result<(), PipelineError> {
    let Some(peak) = peak_amplitude(data) else {
        return Err(PipelineError::DegenerateSignal { std: 0.0 });
    };
    let min_val = data.iter().fold(f64::INFINITY, |a, &b| a.min(b / peak));
    let max_val = data.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b / peak));
    if max_val - min_val < DEGENERATE_EPSILON {
        return Err(PipelineError::DegenerateSignal { std: 0.0 });
    }
    Ok(())
}

/// Rescales a filtered beat to the amplitude range the model was trained on.
pub fn normalize(data: &Array1<f64>, method: Normalization) -> Result<Array1<f64>, PipelineError> {
    let n = data.len() as f64;
    if peak_amplitude(data).is_none() {
        return Err(PipelineError::DegenerateSignal { std: 0.0 });
    }
    // statistics on the unit-peak copy: thresholds become relative and
    // sums of squares stay finite for huge amplitudes
    let data = unit_peak(data);

    let mean = data.sum() / n;
    let std = (data.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / n).sqrt();
    if !mean.is_finite() || !std.is_finite() {
        return Err(PipelineError::DegenerateSignal { std });
    }

    match method {
        Normalization::ZScore => {
            if std < DEGENERATE_EPSILON {
                return Err(PipelineError::DegenerateSignal { std });
            }
            Ok(data.mapv(|x| (x - mean) / std))
        }
        Normalization::MinMax => {
            let min_val = data.iter().fold(f64::INFINITY, |a, &b| a.min(b));
            let max_val = data.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
            let range = max_val - min_val;
            if !range.is_finite() || range < DEGENERATE_EPSILON {
                return Err(PipelineError::DegenerateSignal { std });
            }
            Ok(data.mapv(|x| 2.0 * (x - min_val) / range - 1.0))
        }
    }
}
