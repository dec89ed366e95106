//! Reverberant mixtures: draw impulse responses until one meets the RT60
//! ceiling and yields a finite loudness-match gain.

use anyhow::Result;
use rand::rngs::StdRng;

use super::gain::loudness_match_gain;
use super::Rejection;
use crate::audio::analysis::prepare_impulse_response;
use crate::audio::effects::{apply_gain, convolve_truncated, normalize_peak};
use crate::audio::loudness::LoudnessMeter;
use crate::audio::rt60::{estimate_rt60, Rt60Variant};
use crate::corpus::loader::SignalSource;
use crate::corpus::{CorpusEntry, CorpusIndex};
use crate::error::SynthError;
use crate::types::AcousticMetric;

/// An accepted reverberant mixture.
#[derive(Debug, Clone)]
pub struct ReverbDraw {
    pub mixture: Vec<f64>,
    pub entry: CorpusEntry,
    pub channel: usize,
    /// Loudness-match gain before peak normalization
    pub gain: f64,
    pub rt60: f64,
    pub variant: Rt60Variant,
    /// Whether the mixture was rescaled to keep its peak at 1.0
    pub normalized: bool,
    pub attempts: usize,
}

impl ReverbDraw {
    pub fn metric(&self) -> AcousticMetric {
        AcousticMetric::Rt60 { seconds: self.rt60, variant: self.variant }
    }
}

struct Candidate {
    mixture: Vec<f64>,
    channel: usize,
    gain: f64,
    rt60: f64,
}

pub struct ReverbSampler {
    index: CorpusIndex,
    source: Box<dyn SignalSource>,
    meter: LoudnessMeter,
    max_rt60: f64,
    variant: Rt60Variant,
    max_draws: usize,
    rejections: usize,
}

impl ReverbSampler {
    pub fn new(
        index: CorpusIndex,
        source: Box<dyn SignalSource>,
        sample_rate: u32,
        max_rt60: f64,
        variant: Rt60Variant,
        max_draws: usize,
    ) -> Self {
        Self {
            index,
            source,
            meter: LoudnessMeter::new(sample_rate),
            max_rt60,
            variant,
            max_draws,
            rejections: 0,
        }
    }

    /// Total rejected draws so far.
    pub fn rejections(&self) -> usize {
        self.rejections
    }

    /// Convolve `speech` with one drawn impulse response.
    fn try_entry(&mut self, speech: &[f64], entry: &CorpusEntry, rng: &mut StdRng) -> Result<Result<Candidate, Rejection>> {
        let sr = self.meter.rate();
        let signal = self.source.load(entry, sr, rng)?;
        let ir = prepare_impulse_response(&signal.samples);

        let rt60 = estimate_rt60(&ir, sr, self.variant);
        if rt60 > self.max_rt60 {
            return Ok(Err(Rejection::Rt60TooHigh { rt60, max: self.max_rt60 }));
        }

        let mut mixture = convolve_truncated(speech, &ir, speech.len());
        let gain = loudness_match_gain(&self.meter, speech, &mixture)?;
        if !gain.is_finite() {
            return Ok(Err(Rejection::NonFiniteGain));
        }
        apply_gain(&mut mixture, gain);
        Ok(Ok(Candidate { mixture, channel: signal.channel, gain, rt60 }))
    }

    /// Draw until a combination is accepted or `max_draws` is reached.
    ///
    /// The returned mixture matches the speech length and peaks at most 1.0.
    pub fn sample(&mut self, speech: &[f64], speech_file: &str, rng: &mut StdRng) -> Result<ReverbDraw> {
        for attempt in 1..=self.max_draws {
            let entry = match self.index.draw(rng) {
                Some(e) => e.clone(),
                None => return Err(SynthError::EmptyCorpus(self.index.name().to_string()).into()),
            };

            match self.try_entry(speech, &entry, rng)? {
                Ok(Candidate { mut mixture, channel, gain, rt60 }) => {
                    let normalized = normalize_peak(&mut mixture);
                    let draw = ReverbDraw {
                        mixture,
                        entry,
                        channel,
                        gain,
                        rt60,
                        variant: self.variant,
                        normalized,
                        attempts: attempt,
                    };
                    log::debug!(
                        "{}: accepted {} ch {} ({}, gain {:.3}) after {} draws",
                        speech_file,
                        draw.entry.path.display(),
                        draw.channel,
                        draw.metric(),
                        draw.gain,
                        attempt
                    );
                    return Ok(draw);
                }
                Err(rejection) => {
                    self.rejections += 1;
                    log::debug!("{}: rejected {}: {}", speech_file, entry.path.display(), rejection);
                }
            }
        }

        Err(SynthError::CorpusExhausted {
            speech_file: speech_file.to_string(),
            attempts: self.max_draws,
        }
        .into())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::audio::analysis::peak;
    use crate::types::{DegradationSignal, FormatFamily};
    use rand::{Rng, SeedableRng};
    use std::collections::HashMap;
    use std::path::PathBuf;

    /// In-memory corpus keyed by path; the channel is drawn like [`Loader`](crate::corpus::loader::Loader).
    pub(crate) struct MemorySource(pub HashMap<PathBuf, Vec<Vec<f64>>>);

    impl SignalSource for MemorySource {
        fn load(&mut self, entry: &CorpusEntry, expected_sr: u32, rng: &mut StdRng) -> Result<DegradationSignal> {
            let channels = self
                .0
                .get(&entry.path)
                .ok_or_else(|| anyhow::anyhow!("unknown entry {}", entry.path.display()))?;
            let channel = rng.gen_range(0..channels.len());
            Ok(DegradationSignal {
                samples: channels[channel].clone(),
                sample_rate: expected_sr,
                channel,
                format: entry.format,
                collection: entry.collection.clone(),
                path: entry.path.clone(),
            })
        }
    }

    /// Exponentially decaying noise burst with the given RT60.
    pub(crate) fn decaying_ir(t60: f64, sr: u32, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let k = 1000f64.ln() / t60;
        let n = (t60 * 1.5 * sr as f64) as usize;
        let mut ir: Vec<f64> = (0..n)
            .map(|i| rng.gen_range(-1.0..1.0) * (-k * i as f64 / sr as f64).exp())
            .collect();
        ir[0] = 1.0;
        ir
    }

    pub(crate) fn speech_like(sr: u32, seconds: f64, amp: f64) -> Vec<f64> {
        (0..(sr as f64 * seconds) as usize)
            .map(|i| {
                let t = i as f64 / sr as f64;
                amp * (2.0 * std::f64::consts::PI * 220.0 * t).sin() * (0.6 + 0.4 * (2.0 * std::f64::consts::PI * 3.0 * t).sin())
            })
            .collect()
    }

    fn sampler(irs: Vec<(&str, Vec<Vec<f64>>)>, max_rt60: f64, max_draws: usize) -> ReverbSampler {
        let mut map = HashMap::new();
        let mut entries = Vec::new();
        for (name, channels) in irs {
            let path = PathBuf::from(format!("/rir/{}.wav", name));
            entries.push(CorpusEntry::new(path.clone(), FormatFamily::Wav, "test"));
            map.insert(path, channels);
        }
        ReverbSampler::new(
            CorpusIndex::new("impulse response", entries),
            Box::new(MemorySource(map)),
            16000,
            max_rt60,
            Rt60Variant::T30,
            max_draws,
        )
    }

    #[test]
    fn test_accepts_short_reverb_and_matches_loudness() {
        let sr = 16000;
        let mut s = sampler(vec![("short", vec![decaying_ir(0.3, sr, 1)])], 2.0, 10);
        let speech = speech_like(sr, 2.0, 0.3);
        let draw = s.sample(&speech, "p001/regular", &mut StdRng::seed_from_u64(42)).unwrap();

        assert_eq!(draw.mixture.len(), speech.len());
        assert!(draw.rt60 <= 2.0 && (draw.rt60 - 0.3).abs() < 0.05, "RT60 {}", draw.rt60);
        assert_eq!(draw.metric(), AcousticMetric::Rt60 { seconds: draw.rt60, variant: Rt60Variant::T30 });
        assert!(draw.gain.is_finite() && draw.gain > 0.0);
        assert!(peak(&draw.mixture) <= 1.0);
        assert_eq!(draw.attempts, 1);

        if !draw.normalized {
            let meter = LoudnessMeter::new(sr);
            let ls = meter.integrated_loudness(&speech).unwrap();
            let lm = meter.integrated_loudness(&draw.mixture).unwrap();
            assert!((ls - lm).abs() < 1e-6, "{} vs {}", ls, lm);
        }
    }

    #[test]
    fn test_rejects_long_reverb_until_exhausted() {
        let sr = 16000;
        let mut s = sampler(vec![("hall", vec![decaying_ir(1.2, sr, 2)])], 0.5, 5);
        let speech = speech_like(sr, 1.0, 0.3);
        let err = s.sample(&speech, "p001/regular", &mut StdRng::seed_from_u64(42)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SynthError>(),
            Some(SynthError::CorpusExhausted { attempts: 5, .. })
        ));
        assert_eq!(s.rejections(), 5);
    }

    #[test]
    fn test_mixed_corpus_only_accepts_below_ceiling() {
        let sr = 16000;
        let mut s = sampler(
            vec![("hall", vec![decaying_ir(1.5, sr, 3)]), ("booth", vec![decaying_ir(0.2, sr, 4)])],
            0.8,
            200,
        );
        let speech = speech_like(sr, 1.0, 0.3);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..5 {
            let draw = s.sample(&speech, "p001/regular", &mut rng).unwrap();
            assert!(draw.entry.path.ends_with("booth.wav"));
            assert!(draw.rt60 <= 0.8);
        }
    }

    #[test]
    fn test_silent_ir_is_rejected() {
        let sr = 16000;
        let mut s = sampler(vec![("silent", vec![vec![0.0; 800]])], 2.0, 3);
        let speech = speech_like(sr, 1.0, 0.3);
        assert!(s.sample(&speech, "p001/regular", &mut StdRng::seed_from_u64(1)).is_err());
        assert_eq!(s.rejections(), 3);
    }

    #[test]
    fn test_loud_mixture_is_peak_normalized() {
        let sr = 16000;
        let mut s = sampler(vec![("short", vec![decaying_ir(0.3, sr, 5)])], 2.0, 10);
        // Speech peaking close to full scale makes the matched mixture clip
        let mut speech = speech_like(sr, 1.0, 0.2);
        speech[8000] = 0.999;
        let draw = s.sample(&speech, "p001/regular", &mut StdRng::seed_from_u64(3)).unwrap();
        assert!(peak(&draw.mixture) <= 1.0 + 1e-12);
    }

    #[test]
    fn test_same_seed_same_draws() {
        let sr = 16000;
        let irs = || {
            vec![
                ("a", vec![decaying_ir(0.3, sr, 1), decaying_ir(0.4, sr, 2)]),
                ("b", vec![decaying_ir(0.5, sr, 3)]),
            ]
        };
        let speech = speech_like(sr, 1.0, 0.3);
        let mut s1 = sampler(irs(), 2.0, 10);
        let mut s2 = sampler(irs(), 2.0, 10);
        let mut r1 = StdRng::seed_from_u64(42);
        let mut r2 = StdRng::seed_from_u64(42);
        for _ in 0..4 {
            let a = s1.sample(&speech, "x", &mut r1).unwrap();
            let b = s2.sample(&speech, "x", &mut r2).unwrap();
            assert_eq!(a.entry, b.entry);
            assert_eq!(a.channel, b.channel);
            assert_eq!(a.mixture, b.mixture);
        }
    }
}
