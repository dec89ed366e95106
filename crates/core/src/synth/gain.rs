//! Loudness-based gain solving for reverberant and noisy mixtures.

use anyhow::Result;

use crate::audio::analysis::peak;
use crate::audio::effects::{apply_gain, mix_scaled};
use crate::audio::loudness::LoudnessMeter;

/// Upper bound on 1 dB SNR increments in the clip-avoidance loop.
pub const MAX_SNR_STEPS: usize = 120;

/// Peak a mixture is rescaled to when SNR increments cannot prevent clipping.
pub const FALLBACK_PEAK: f64 = 0.99;

pub fn db_to_gain(db: f64) -> f64 {
    10f64.powf(db / 20.0)
}

/// Linear gain that brings `signal` to the integrated loudness of `reference`.
///
/// Infinite or NaN when either signal is silent.
pub fn loudness_match_gain(meter: &LoudnessMeter, reference: &[f64], signal: &[f64]) -> Result<f64> {
    let l_ref = meter.integrated_loudness(reference)?;
    let l_sig = meter.integrated_loudness(signal)?;
    Ok(db_to_gain(l_ref - l_sig))
}

/// Noise gain that places the noise `snr_db` below the speech loudness.
pub fn snr_gain(speech_lufs: f64, noise_lufs: f64, snr_db: f64) -> f64 {
    db_to_gain(speech_lufs - snr_db - noise_lufs)
}

/// Result of mixing speech and noise at a target SNR.
#[derive(Debug, Clone)]
pub struct NoisyMix {
    pub mixture: Vec<f64>,
    /// SNR after clip-avoidance increments
    pub snr_db: f64,
    pub gain: f64,
    pub steps: usize,
    /// Whether the mixture had to be rescaled after exhausting the increments
    pub rescaled: bool,
}

/// Mix `noise` into `speech` at `snr_db`, raising the SNR in 1 dB steps
/// until the mixture peak drops below 1.0.
///
/// When the speech alone clips, no SNR helps: after [`MAX_SNR_STEPS`]
/// increments the mixture is scaled to a [`FALLBACK_PEAK`] peak.
/// Returns `None` when the gain is not finite.
pub fn mix_at_snr(speech: &[f64], noise: &[f64], speech_lufs: f64, noise_lufs: f64, snr_db: f64) -> Option<NoisyMix> {
    let mut snr = snr_db;
    let mut gain = snr_gain(speech_lufs, noise_lufs, snr);
    if !gain.is_finite() {
        return None;
    }
    let mut mixture = mix_scaled(speech, noise, gain);

    let mut steps = 0;
    while peak(&mixture) >= 1.0 && steps < MAX_SNR_STEPS {
        snr += 1.0;
        steps += 1;
        gain = snr_gain(speech_lufs, noise_lufs, snr);
        mixture = mix_scaled(speech, noise, gain);
    }

    let mut rescaled = false;
    let p = peak(&mixture);
    if p >= 1.0 {
        log::warn!("Mixture still peaks at {:.3} after {} SNR steps, rescaling", p, steps);
        apply_gain(&mut mixture, FALLBACK_PEAK / p);
        rescaled = true;
    }

    Some(NoisyMix { mixture, snr_db: snr, gain, steps, rescaled })
}
