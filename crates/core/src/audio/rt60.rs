//! Reverberation time estimation with Schroeder's backward integration.
//!
//! M. R. Schroeder, "New Method of Measuring Reverberation Time,"
//! J. Acoust. Soc. Am., vol. 37, no. 3, pp. 409-412, 1965.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Floor added before the logarithm of the decay curve.
const DECAY_FLOOR: f64 = 1e-20;

/// Largest distance in dB between a regression bound and the curve sample
/// chosen for it.
const LEVEL_TOLERANCE_DB: f64 = 1.0;

/// Which part of the decay curve the regression is fitted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rt60Variant {
    #[default]
    T30,
    T20,
    T10,
    Edt,
}

impl Rt60Variant {
    /// (init dB, end dB, factor to extrapolate to 60 dB)
    pub fn params(&self) -> (f64, f64, f64) {
        match self {
            Rt60Variant::T30 => (-5.0, -35.0, 2.0),
            Rt60Variant::T20 => (-5.0, -25.0, 3.0),
            Rt60Variant::T10 => (-5.0, -15.0, 6.0),
            Rt60Variant::Edt => (0.0, -10.0, 6.0),
        }
    }
}

impl FromStr for Rt60Variant {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "t30" => Ok(Rt60Variant::T30),
            "t20" => Ok(Rt60Variant::T20),
            "t10" => Ok(Rt60Variant::T10),
            "edt" => Ok(Rt60Variant::Edt),
            other => anyhow::bail!("unknown RT60 variant: {}", other),
        }
    }
}

impl fmt::Display for Rt60Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Rt60Variant::T30 => "t30",
            Rt60Variant::T20 => "t20",
            Rt60Variant::T10 => "t10",
            Rt60Variant::Edt => "edt",
        };
        f.write_str(s)
    }
}

/// Energy decay curve in dB relative to its own maximum.
///
/// Returns `None` when the response has no energy.
pub fn schroeder_curve_db(ir: &[f64]) -> Option<Vec<f64>> {
    let max_abs = ir.iter().map(|v| v.abs()).fold(0.0f64, f64::max);
    if ir.is_empty() || max_abs == 0.0 || !max_abs.is_finite() {
        return None;
    }

    let mut sch = vec![0.0; ir.len()];
    let mut acc = 0.0;
    for i in (0..ir.len()).rev() {
        let v = ir[i].abs() / max_abs;
        acc += v * v;
        sch[i] = acc;
    }

    let sch_max = sch.iter().cloned().fold(0.0f64, f64::max);
    Some(
        sch.iter()
            .map(|&e| 10.0 * (e / sch_max + DECAY_FLOOR).log10())
            .collect(),
    )
}

/// Index of the first curve value closest to `target_db`.
fn closest_index(curve: &[f64], target_db: f64) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, &v) in curve.iter().enumerate() {
        let d = (v - target_db).abs();
        if d < best_dist {
            best_dist = d;
            best = i;
        }
    }
    best
}

/// Estimate the reverberation time of `ir` in seconds.
///
/// Fits a least-squares line to the decay curve between the samples closest
/// to the variant's init and end levels, then extrapolates to 60 dB.
/// Degenerate responses (silent, too short, or a decay that never spans the
/// window) yield `f64::INFINITY` so they never pass an RT60 ceiling.
pub fn estimate_rt60(ir: &[f64], sample_rate: u32, variant: Rt60Variant) -> f64 {
    let (init, end, factor) = variant.params();

    let curve = match schroeder_curve_db(ir) {
        Some(c) => c,
        None => return f64::INFINITY,
    };

    let init_sample = closest_index(&curve, init);
    let end_sample = closest_index(&curve, end);
    if end_sample <= init_sample {
        return f64::INFINITY;
    }
    // The decay never reaches one of the levels
    if (curve[init_sample] - init).abs() > LEVEL_TOLERANCE_DB
        || (curve[end_sample] - end).abs() > LEVEL_TOLERANCE_DB
    {
        return f64::INFINITY;
    }

    let sr = sample_rate as f64;
    let n = (end_sample - init_sample + 1) as f64;
    let window = &curve[init_sample..=end_sample];

    let mean_x = (init_sample..=end_sample).map(|i| i as f64 / sr).sum::<f64>() / n;
    let mean_y = window.iter().sum::<f64>() / n;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for (offset, &y) in window.iter().enumerate() {
        let dx = (init_sample + offset) as f64 / sr - mean_x;
        sxx += dx * dx;
        sxy += dx * (y - mean_y);
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;
    if !slope.is_finite() || slope == 0.0 {
        return f64::INFINITY;
    }

    let t_init = (init - intercept) / slope;
    let t_end = (end - intercept) / slope;
    let rt = factor * (t_end - t_init);
    if rt.is_finite() {
        rt
    } else {
        f64::INFINITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Unit impulse followed by noise whose amplitude falls 60 dB in `t60` seconds.
    fn synthetic_rir(t60: f64, sr: u32, duration_s: f64, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let n = (duration_s * sr as f64) as usize;
        // 60 dB amplitude decay: exp(-k t) with k = ln(1000) / t60
        let k = 1000f64.ln() / t60;
        let mut ir: Vec<f64> = (0..n)
            .map(|i| {
                let t = i as f64 / sr as f64;
                rng.gen_range(-1.0..1.0) * (-k * t).exp()
            })
            .collect();
        ir[0] = 1.0;
        ir
    }

    #[test]
    fn test_variant_params() {
        assert_eq!(Rt60Variant::T30.params(), (-5.0, -35.0, 2.0));
        assert_eq!(Rt60Variant::T20.params(), (-5.0, -25.0, 3.0));
        assert_eq!(Rt60Variant::T10.params(), (-5.0, -15.0, 6.0));
        assert_eq!(Rt60Variant::Edt.params(), (0.0, -10.0, 6.0));
        assert_eq!(Rt60Variant::default(), Rt60Variant::T30);
        assert_eq!("EDT".parse::<Rt60Variant>().unwrap(), Rt60Variant::Edt);
        assert!("t60".parse::<Rt60Variant>().is_err());
    }

    #[test]
    fn test_recovers_known_decay_t30() {
        let sr = 16000;
        for &t60 in &[0.3, 0.8, 1.5] {
            let ir = synthetic_rir(t60, sr, t60 * 3.0, 7);
            let rt = estimate_rt60(&ir, sr, Rt60Variant::T30);
            assert!((rt - t60).abs() < 0.05 * t60 + 0.01,
                "T30 for t60={} estimated {}", t60, rt);
        }
    }

    #[test]
    fn test_recovers_known_decay_other_variants() {
        let sr = 16000;
        let ir = synthetic_rir(0.6, sr, 2.0, 11);
        for variant in [Rt60Variant::T20, Rt60Variant::T10, Rt60Variant::Edt] {
            let rt = estimate_rt60(&ir, sr, variant);
            assert!((rt - 0.6).abs() < 0.08, "{} estimated {}", variant, rt);
        }
    }

    #[test]
    fn test_pure_exponential_is_exact() {
        let sr = 8000;
        let t60 = 0.5;
        let k = 1000f64.ln() / t60;
        let ir: Vec<f64> = (0..sr * 2).map(|i| (-k * i as f64 / sr as f64).exp()).collect();
        let rt = estimate_rt60(&ir, sr as u32, Rt60Variant::T30);
        assert!((rt - t60).abs() < 0.005, "estimated {}", rt);
    }

    #[test]
    fn test_gain_invariant() {
        let sr = 16000;
        let ir = synthetic_rir(0.4, sr, 1.2, 3);
        let scaled: Vec<f64> = ir.iter().map(|v| v * 0.1).collect();
        let a = estimate_rt60(&ir, sr, Rt60Variant::T30);
        let b = estimate_rt60(&scaled, sr, Rt60Variant::T30);
        assert!((a - b).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_responses_are_infinite() {
        assert_eq!(estimate_rt60(&[], 16000, Rt60Variant::T30), f64::INFINITY);
        assert_eq!(estimate_rt60(&[0.0; 100], 16000, Rt60Variant::T30), f64::INFINITY);
        assert_eq!(estimate_rt60(&[1.0], 16000, Rt60Variant::T30), f64::INFINITY);
    }

    #[test]
    fn test_unreachable_end_level_is_infinite() {
        // Slow linear fade over 8 samples bottoms out near -11 dB, far above -35 dB
        let ir: Vec<f64> = (0..8).map(|i| 1.0 - 0.05 * i as f64).collect();
        let curve = schroeder_curve_db(&ir).unwrap();
        assert!(*curve.last().unwrap() > -35.0);
        assert_eq!(estimate_rt60(&ir, 48000, Rt60Variant::T30), f64::INFINITY);
        assert!(estimate_rt60(&ir, 48000, Rt60Variant::T30) > 2.0);
    }

    #[test]
    fn test_curve_starts_at_zero_db_and_decreases() {
        let ir = synthetic_rir(0.3, 8000, 0.5, 5);
        let curve = schroeder_curve_db(&ir).unwrap();
        assert!(curve[0].abs() < 1e-9);
        for w in curve.windows(2) {
            assert!(w[1] <= w[0] + 1e-9);
        }
        assert!(schroeder_curve_db(&[0.0, 0.0]).is_none());
    }

    #[test]
    fn test_closest_index_first_occurrence() {
        let curve = [0.0, -4.0, -6.0, -6.0];
        assert_eq!(closest_index(&curve, -5.0), 1);
        assert_eq!(closest_index(&curve, -6.0), 2);
    }
}
