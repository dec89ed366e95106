//! ITU-R BS.1770 integrated loudness measurement.
//!
//! K-weighting (high shelf + high pass), 400 ms gating blocks with 75 %
//! overlap, an absolute gate at -70 LUFS and a relative gate 10 LU below the
//! absolute-gated loudness.

use anyhow::Result;

use crate::error::SynthError;

/// Gating block length in seconds.
const BLOCK_SIZE_S: f64 = 0.4;
/// Overlap between consecutive gating blocks.
const BLOCK_OVERLAP: f64 = 0.75;
const ABSOLUTE_GATE_LUFS: f64 = -70.0;
const RELATIVE_GATE_OFFSET_LU: f64 = -10.0;
const LUFS_REFERENCE_OFFSET: f64 = -0.691;

/// Normalized biquad coefficients (direct form I).
#[derive(Debug, Clone)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Biquad {
    fn from_raw(b: [f64; 3], a: [f64; 3]) -> Self {
        Self {
            b0: b[0] / a[0],
            b1: b[1] / a[0],
            b2: b[2] / a[0],
            a1: a[1] / a[0],
            a2: a[2] / a[0],
        }
    }

    /// RBJ high shelf with gain `gain_db` at `fc`.
    fn high_shelf(gain_db: f64, q: f64, fc: f64, rate: f64) -> Self {
        let a = 10f64.powf(gain_db / 40.0);
        let w0 = 2.0 * std::f64::consts::PI * (fc / rate);
        let alpha = w0.sin() / (2.0 * q);
        let cos = w0.cos();
        let sqrt_a = a.sqrt();
        Self::from_raw(
            [
                a * ((a + 1.0) + (a - 1.0) * cos + 2.0 * sqrt_a * alpha),
                -2.0 * a * ((a - 1.0) + (a + 1.0) * cos),
                a * ((a + 1.0) + (a - 1.0) * cos - 2.0 * sqrt_a * alpha),
            ],
            [
                (a + 1.0) - (a - 1.0) * cos + 2.0 * sqrt_a * alpha,
                2.0 * ((a - 1.0) - (a + 1.0) * cos),
                (a + 1.0) - (a - 1.0) * cos - 2.0 * sqrt_a * alpha,
            ],
        )
    }

    /// RBJ second-order high pass at `fc`.
    fn high_pass(q: f64, fc: f64, rate: f64) -> Self {
        let w0 = 2.0 * std::f64::consts::PI * (fc / rate);
        let alpha = w0.sin() / (2.0 * q);
        let cos = w0.cos();
        Self::from_raw(
            [(1.0 + cos) / 2.0, -(1.0 + cos), (1.0 + cos) / 2.0],
            [1.0 + alpha, -2.0 * cos, 1.0 - alpha],
        )
    }

    fn apply(&self, input: &[f64]) -> Vec<f64> {
        let (mut x1, mut x2, mut y1, mut y2) = (0.0, 0.0, 0.0, 0.0);
        input
            .iter()
            .map(|&x| {
                let y = self.b0 * x + self.b1 * x1 + self.b2 * x2 - self.a1 * y1 - self.a2 * y2;
                x2 = x1;
                x1 = x;
                y2 = y1;
                y1 = y;
                y
            })
            .collect()
    }
}

/// Integrated loudness meter for mono signals at a fixed sample rate.
#[derive(Debug, Clone)]
pub struct LoudnessMeter {
    rate: u32,
    shelf: Biquad,
    high_pass: Biquad,
}

impl LoudnessMeter {
    pub fn new(rate: u32) -> Self {
        let fs = rate as f64;
        Self {
            rate,
            shelf: Biquad::high_shelf(4.0, std::f64::consts::FRAC_1_SQRT_2, 1500.0, fs),
            high_pass: Biquad::high_pass(0.5, 38.0, fs),
        }
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    /// Samples in one gating block.
    pub fn block_samples(&self) -> usize {
        (BLOCK_SIZE_S * self.rate as f64) as usize
    }

    /// Integrated loudness in LUFS.
    ///
    /// Silent input measures as negative infinity. Input shorter than one
    /// gating block is an error.
    pub fn integrated_loudness(&self, samples: &[f64]) -> Result<f64> {
        let required = self.block_samples();
        if samples.len() < required {
            return Err(SynthError::SignalTooShort { samples: samples.len(), required }.into());
        }

        let weighted = self.high_pass.apply(&self.shelf.apply(samples));

        let rate = self.rate as f64;
        let duration = samples.len() as f64 / rate;
        let step = 1.0 - BLOCK_OVERLAP;
        let num_blocks = ((duration - BLOCK_SIZE_S) / (BLOCK_SIZE_S * step)).round_ties_even() as usize + 1;
        let norm = 1.0 / (BLOCK_SIZE_S * rate);

        let z: Vec<f64> = (0..num_blocks)
            .map(|j| {
                let lower = (BLOCK_SIZE_S * (j as f64 * step) * rate) as usize;
                let upper = (BLOCK_SIZE_S * (j as f64 * step + 1.0) * rate) as usize;
                let lower = lower.min(weighted.len());
                let upper = upper.min(weighted.len());
                norm * weighted[lower..upper].iter().map(|v| v * v).sum::<f64>()
            })
            .collect();

        let block_lufs = |ms: f64| LUFS_REFERENCE_OFFSET + 10.0 * ms.log10();

        let abs_gated: Vec<f64> = z
            .iter()
            .copied()
            .filter(|&ms| block_lufs(ms) >= ABSOLUTE_GATE_LUFS)
            .collect();
        if abs_gated.is_empty() {
            return Ok(f64::NEG_INFINITY);
        }

        let abs_mean = abs_gated.iter().sum::<f64>() / abs_gated.len() as f64;
        let relative_gate = block_lufs(abs_mean) + RELATIVE_GATE_OFFSET_LU;

        let gated: Vec<f64> = z
            .iter()
            .copied()
            .filter(|&ms| {
                let l = block_lufs(ms);
                l > relative_gate && l > ABSOLUTE_GATE_LUFS
            })
            .collect();
        if gated.is_empty() {
            return Ok(f64::NEG_INFINITY);
        }

        let mean = gated.iter().sum::<f64>() / gated.len() as f64;
        Ok(block_lufs(mean))
    }
}
