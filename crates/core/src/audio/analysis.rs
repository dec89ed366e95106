//! Audio analysis: peak level and impulse-response alignment.

/// Largest absolute sample value, 0.0 for an empty signal.
pub fn peak(samples: &[f64]) -> f64 {
    samples.iter().map(|v| v.abs()).fold(0.0f64, f64::max)
}

/// Index of the first sample with the largest absolute value.
pub fn argmax_abs(samples: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, v) in samples.iter().enumerate() {
        let a = v.abs();
        match best {
            Some((_, b)) if a <= b => {}
            _ => best = Some((i, a)),
        }
    }
    best.map(|(i, _)| i)
}

/// Lower bound for the peak of a prepared impulse response.
pub const RIR_MIN_PEAK: f64 = 0.1;
/// Upper bound for the peak of a prepared impulse response.
pub const RIR_MAX_PEAK: f64 = 0.7;

/// Align an impulse response so its direct path sits at time zero, then
/// bring its peak into [`RIR_MIN_PEAK`, `RIR_MAX_PEAK`].
///
/// Samples before the largest absolute value are dropped. An all-zero
/// response is returned truncated but unscaled.
pub fn prepare_impulse_response(rir: &[f64]) -> Vec<f64> {
    let start = argmax_abs(rir).unwrap_or(0);
    let mut out = rir[start..].to_vec();

    let p = peak(&out);
    if p == 0.0 {
        return out;
    }
    let target = if p < RIR_MIN_PEAK {
        RIR_MIN_PEAK
    } else if p > RIR_MAX_PEAK {
        RIR_MAX_PEAK
    } else {
        return out;
    };
    for v in out.iter_mut() {
        *v = target * *v / p;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak() {
        assert_eq!(peak(&[]), 0.0);
        assert_eq!(peak(&[0.1, -0.8, 0.5]), 0.8);
    }

    #[test]
    fn test_argmax_abs_first_wins() {
        assert_eq!(argmax_abs(&[]), None);
        assert_eq!(argmax_abs(&[0.0, -0.5, 0.5, 0.2]), Some(1));
        assert_eq!(argmax_abs(&[0.0, 0.0]), Some(0));
    }

    #[test]
    fn test_prepare_truncates_at_direct_path() {
        let rir = vec![0.01, 0.02, 0.5, 0.25, 0.1];
        let out = prepare_impulse_response(&rir);
        assert_eq!(out, vec![0.5, 0.25, 0.1]);
    }

    #[test]
    fn test_prepare_boosts_quiet_response() {
        let rir = vec![0.0, -0.02, 0.01];
        let out = prepare_impulse_response(&rir);
        assert_eq!(out.len(), 2);
        assert!((out[0] + 0.1).abs() < 1e-12);
        assert!((out[1] - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_prepare_attenuates_loud_response() {
        let rir = vec![1.4, 0.7];
        let out = prepare_impulse_response(&rir);
        assert!((peak(&out) - 0.7).abs() < 1e-12);
        assert!((out[1] - 0.35).abs() < 1e-12);
    }

    #[test]
    fn test_prepare_all_zero_is_noop() {
        let out = prepare_impulse_response(&[0.0; 8]);
        assert_eq!(out, vec![0.0; 8]);
        assert!(prepare_impulse_response(&[]).is_empty());
    }
}
