use crate::config::LengthPolicy;
use crate::PipelineError;
use log::debug;
use ndarray::{Array1, ArrayViewD, Ix1};
use rustfft::{num_complex::Complex, FftPlanner};

/// Checks that the input is a non-empty 1-D array of finite samples and
/// brings it to `beat_len` according to `policy`.
///
/// With a correctly sized input the samples come back unchanged.
pub fn validate(
    input: ArrayViewD<'_, f64>,
    beat_len: usize,
    policy: LengthPolicy,
) -> Result<Array1<f64>, PipelineError> {
    if input.ndim() != 1 {
        return Err(PipelineError::Shape(format!(
            "expected a 1-D array, got shape {:?}",
            input.shape()
        )));
    }
    let samples = input
        .into_dimensionality::<Ix1>()
        .map_err(|e| PipelineError::Shape(e.to_string()))?;

    if samples.is_empty() {
        return Err(PipelineError::Shape("waveform is empty".into()));
    }
    if let Some(idx) = samples.iter().position(|x| !x.is_finite()) {
        return Err(PipelineError::Shape(format!(
            "sample {} is not a finite number",
            idx
        )));
    }

    let len = samples.len();
    if len == beat_len {
        return Ok(samples.to_owned());
    }

    match policy {
        LengthPolicy::Strict => Err(PipelineError::LengthMismatch {
            expected: beat_len,
            actual: len,
        }),
        LengthPolicy::PadOrTruncate => {
            debug!("Padding/truncating beat from {} to {} samples", len, beat_len);
            let slice = samples.to_vec();
            Ok(pad_or_truncate(&slice, beat_len))
        }
        LengthPolicy::Resample => {
            debug!("Resampling beat from {} to {} samples", len, beat_len);
            let slice = samples.to_vec();
            Ok(resample(&slice, beat_len))
        }
    }
}

/// Zero-pads the tail or cuts it off, like the beat dataset's own padding.
pub fn pad_or_truncate(data: &[f64], len: usize) -> Array1<f64> {
    let mut out = vec![0.0; len];
    let n = data.len().min(len);
    out[..n].copy_from_slice(&data[..n]);
    Array1::from(out)
}

/// Fourier-domain resampling to `num` samples, matching `scipy.signal.resample`.
///
/// The signal is assumed periodic; the spectrum is truncated or zero-padded
/// and the Nyquist bin is split or folded so the result stays real.
pub fn resample(data: &[f64], num: usize) -> Array1<f64> {
    let n = data.len();
    if n == num || n == 0 || num == 0 {
        let mut out = data.to_vec();
        out.resize(num, 0.0);
        return Array1::from(out);
    }

    let mut planner = FftPlanner::<f64>::new();
    let mut spectrum: Vec<Complex<f64>> = data.iter().map(|&x| Complex::new(x, 0.0)).collect();
    planner.plan_fft_forward(n).process(&mut spectrum);

    let mut resized = vec![Complex::new(0.0, 0.0); num];
    let m = n.min(num);
    // positive and negative frequencies strictly below the shared Nyquist bin
    let half = (m - 1) / 2;
    resized[0] = spectrum[0];
    for k in 1..=half {
        resized[k] = spectrum[k];
        resized[num - k] = spectrum[n - k];
    }
    if m % 2 == 0 {
        let nyq = m / 2;
        if num < n {
            // fold both sides of the dropped band edge into one real bin
            resized[nyq] = spectrum[nyq] + spectrum[n - nyq];
        } else {
            let split = spectrum[nyq] * 0.5;
            resized[nyq] = split;
            resized[num - nyq] = split;
        }
    }

    planner.plan_fft_inverse(num).process(&mut resized);
    // unnormalized inverse: 1/num, times num/n to keep amplitude
    let scale = 1.0 / n as f64;
    resized.iter().map(|c| c.re * scale).collect()
}
