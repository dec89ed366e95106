//! Audio effects: convolution, gain, mixing, peak normalization, edge ramps.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use crate::audio::analysis::peak;

/// Linear convolution of `signal` with `kernel`, keeping the first `out_len`
/// samples of the full `signal.len() + kernel.len() - 1` result.
///
/// Computed in the frequency domain.
pub fn convolve_truncated(signal: &[f64], kernel: &[f64], out_len: usize) -> Vec<f64> {
    if signal.is_empty() || kernel.is_empty() {
        return vec![0.0; out_len];
    }

    let full_len = signal.len() + kernel.len() - 1;
    let n = full_len.next_power_of_two();

    let mut planner = FftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(n);
    let inverse = planner.plan_fft_inverse(n);

    let mut a: Vec<Complex<f64>> = signal.iter().map(|&v| Complex::new(v, 0.0)).collect();
    a.resize(n, Complex::new(0.0, 0.0));
    let mut b: Vec<Complex<f64>> = kernel.iter().map(|&v| Complex::new(v, 0.0)).collect();
    b.resize(n, Complex::new(0.0, 0.0));

    forward.process(&mut a);
    forward.process(&mut b);
    for (x, y) in a.iter_mut().zip(b.iter()) {
        *x *= *y;
    }
    inverse.process(&mut a);

    let norm = 1.0 / n as f64;
    let mut out: Vec<f64> = a.iter().take(full_len.min(out_len)).map(|c| c.re * norm).collect();
    out.resize(out_len, 0.0);
    out
}

/// Multiply every sample by a linear gain. Modifies samples in place.
pub fn apply_gain(samples: &mut [f64], gain: f64) {
    for sample in samples.iter_mut() {
        *sample *= gain;
    }
}

/// `primary + gain * secondary`, sample by sample.
///
/// Output duration matches the primary; a shorter secondary leaves the
/// remaining primary samples untouched.
pub fn mix_scaled(primary: &[f64], secondary: &[f64], gain: f64) -> Vec<f64> {
    let mut result = primary.to_vec();
    for (sample, &s) in result.iter_mut().zip(secondary.iter()) {
        *sample += gain * s;
    }
    result
}

/// Rescale by the peak if it exceeds 1.0. Returns whether samples changed.
pub fn normalize_peak(samples: &mut [f64]) -> bool {
    let p = peak(samples);
    if p > 1.0 {
        for v in samples.iter_mut() {
            *v /= p;
        }
        true
    } else {
        false
    }
}

/// Number of ramp samples for `ramp_ms` at `sr`.
pub fn ramp_samples(ramp_ms: f64, sr: u32) -> usize {
    (ramp_ms / 1000.0 * sr as f64).round() as usize
}

/// `n` evenly spaced values from 0.0 to 1.0 inclusive.
pub fn linear_ramp(n: usize) -> Vec<f64> {
    match n {
        0 => vec![],
        1 => vec![0.0],
        _ => (0..n).map(|i| i as f64 / (n - 1) as f64).collect(),
    }
}

/// Fade in over the first `ramp.len()` samples and out over the last,
/// multiplying in place.
pub fn apply_ramps(samples: &mut [f64], ramp: &[f64]) {
    let n = ramp.len().min(samples.len());
    if n == 0 {
        return;
    }
    for (v, r) in samples[..n].iter_mut().zip(ramp.iter()) {
        *v *= r;
    }
    let tail = samples.len() - n;
    for (v, r) in samples[tail..].iter_mut().zip(ramp[..n].iter().rev()) {
        *v *= r;
    }
}
