//! Noisy mixtures: draw a noise recording long enough to cover the speech,
//! cut a random excerpt and mix it in at a target SNR.

use anyhow::Result;
use rand::rngs::StdRng;
use rand::Rng;

use super::gain::{mix_at_snr, NoisyMix};
use super::policy::SnrSampler;
use super::Rejection;
use crate::audio::loudness::LoudnessMeter;
use crate::corpus::loader::SignalSource;
use crate::corpus::CorpusIndex;
use crate::error::SynthError;
use crate::types::{AcousticMetric, DegradationSignal};

/// An accepted noisy mixture.
#[derive(Debug, Clone)]
pub struct NoiseDraw {
    pub mixture: Vec<f64>,
    /// Noise file stem
    pub noise_file: String,
    pub channel: usize,
    /// Excerpt offset within the noise channel
    pub noise_start: usize,
    /// SNR after clip-avoidance increments
    pub snr_db: f64,
    pub gain: f64,
    pub attempts: usize,
}

impl NoiseDraw {
    pub fn metric(&self) -> AcousticMetric {
        AcousticMetric::Snr { db: self.snr_db }
    }
}

pub struct NoiseSampler {
    index: CorpusIndex,
    source: Box<dyn SignalSource>,
    meter: LoudnessMeter,
    max_draws: usize,
    rejections: usize,
}

impl NoiseSampler {
    pub fn new(index: CorpusIndex, source: Box<dyn SignalSource>, sample_rate: u32, max_draws: usize) -> Self {
        Self {
            index,
            source,
            meter: LoudnessMeter::new(sample_rate),
            max_draws,
            rejections: 0,
        }
    }

    pub fn rejections(&self) -> usize {
        self.rejections
    }

    fn draw_noise(&mut self, rng: &mut StdRng) -> Result<DegradationSignal> {
        let entry = match self.index.draw(rng) {
            Some(e) => e.clone(),
            None => return Err(SynthError::EmptyCorpus(self.index.name().to_string()).into()),
        };
        self.source.load(&entry, self.meter.rate(), rng)
    }

    /// Mix `speech` with a random excerpt of `noise` at an SNR from `snr`.
    fn mix_excerpt(
        &self,
        speech: &[f64],
        noise: &DegradationSignal,
        stem: &str,
        snr: &mut SnrSampler,
        rng: &mut StdRng,
    ) -> Result<Result<(NoisyMix, usize), Rejection>> {
        let noise_start = rng.gen_range(0..=noise.samples.len() - speech.len());
        let excerpt = &noise.samples[noise_start..noise_start + speech.len()];

        let speech_lufs = self.meter.integrated_loudness(speech)?;
        let noise_lufs = self.meter.integrated_loudness(excerpt)?;
        if !noise_lufs.is_finite() {
            return Ok(Err(Rejection::SilentNoise));
        }

        let snr_db = snr.draw(stem, rng);
        match mix_at_snr(speech, excerpt, speech_lufs, noise_lufs, snr_db) {
            Some(mix) => Ok(Ok((mix, noise_start))),
            None => Ok(Err(Rejection::NonFiniteGain)),
        }
    }

    /// Draw until a noise excerpt is accepted or `max_draws` is reached.
    ///
    /// `current` carries the noise signal between calls: it is reused while
    /// it covers the speech and replaced by a fresh draw otherwise. Pass
    /// `None` to force a new draw.
    pub fn sample(
        &mut self,
        speech: &[f64],
        speech_file: &str,
        stem: &str,
        current: &mut Option<DegradationSignal>,
        snr: &mut SnrSampler,
        rng: &mut StdRng,
    ) -> Result<NoiseDraw> {
        for attempt in 1..=self.max_draws {
            let noise = match current.take() {
                Some(n) if n.samples.len() >= speech.len() => n,
                _ => self.draw_noise(rng)?,
            };

            if noise.samples.len() < speech.len() {
                self.rejections += 1;
                log::debug!(
                    "{}: rejected {}: {}",
                    speech_file,
                    noise.path.display(),
                    Rejection::NoiseTooShort { noise: noise.samples.len(), speech: speech.len() }
                );
                continue;
            }

            match self.mix_excerpt(speech, &noise, stem, snr, rng)? {
                Ok((mix, noise_start)) => {
                    let draw = NoiseDraw {
                        mixture: mix.mixture,
                        noise_file: noise.stem(),
                        channel: noise.channel,
                        noise_start,
                        snr_db: mix.snr_db,
                        gain: mix.gain,
                        attempts: attempt,
                    };
                    log::debug!(
                        "{}: accepted {} ch {} at {} ({}) after {} draws",
                        speech_file,
                        draw.noise_file,
                        draw.channel,
                        draw.noise_start,
                        draw.metric(),
                        attempt
                    );
                    *current = Some(noise);
                    return Ok(draw);
                }
                Err(rejection) => {
                    self.rejections += 1;
                    log::debug!("{}: rejected {}: {}", speech_file, noise.path.display(), rejection);
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
mod tests {
    use super::*;
    use crate::audio::analysis::peak;
    use crate::corpus::CorpusEntry;
    use crate::synth::reverb::tests::{speech_like, MemorySource};
    use crate::types::FormatFamily;
    use rand::SeedableRng;
    use std::collections::HashMap;
    use std::path::PathBuf;

    const SR: u32 = 16000;

    fn white(n: usize, amp: f64, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n).map(|_| rng.gen_range(-amp..amp)).collect()
    }

    fn sampler(noises: Vec<(&str, Vec<Vec<f64>>)>, max_draws: usize) -> NoiseSampler {
        let mut map = HashMap::new();
        let mut entries = Vec::new();
        for (name, channels) in noises {
            let path = PathBuf::from(format!("/wham/{}.wav", name));
            entries.push(CorpusEntry::new(path.clone(), FormatFamily::Wav, "WHAM"));
            map.insert(path, channels);
        }
        NoiseSampler::new(CorpusIndex::new("noise", entries), Box::new(MemorySource(map)), SR, max_draws)
    }

    #[test]
    fn test_short_noise_rejected_long_accepted() {
        let mut s = sampler(
            vec![("short", vec![white(SR as usize / 2, 0.1, 1)]), ("long", vec![white(3 * SR as usize, 0.1, 2)])],
            100,
        );
        let speech = speech_like(SR, 1.0, 0.3);
        let mut snr = SnrSampler::uniform(0.0, 10.0);
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..5 {
            let mut current = None;
            let draw = s.sample(&speech, "p001/regular", "regular", &mut current, &mut snr, &mut rng).unwrap();
            assert_eq!(draw.noise_file, "long");
            assert_eq!(draw.mixture.len(), speech.len());
            assert!(draw.noise_start + speech.len() <= 3 * SR as usize);
            assert!(current.is_some());
        }
    }

    #[test]
    fn test_all_noise_too_short_exhausts() {
        let mut s = sampler(vec![("short", vec![white(100, 0.1, 1)])], 4);
        let speech = speech_like(SR, 1.0, 0.3);
        let mut snr = SnrSampler::uniform(0.0, 10.0);
        let err = s
            .sample(&speech, "p001/regular", "regular", &mut None, &mut snr, &mut StdRng::seed_from_u64(0))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SynthError>(),
            Some(SynthError::CorpusExhausted { attempts: 4, .. })
        ));
        assert_eq!(s.rejections(), 4);
    }

    #[test]
    fn test_current_noise_is_reused() {
        let mut s = sampler(
            vec![("a", vec![white(3 * SR as usize, 0.1, 1)]), ("b", vec![white(3 * SR as usize, 0.1, 2)])],
            10,
        );
        let speech = speech_like(SR, 1.0, 0.3);
        let mut snr = SnrSampler::uniform(0.0, 10.0);
        let mut rng = StdRng::seed_from_u64(9);
        let mut current = None;
        let first = s.sample(&speech, "x", "regular", &mut current, &mut snr, &mut rng).unwrap();
        for _ in 0..5 {
            let next = s.sample(&speech, "x", "regular", &mut current, &mut snr, &mut rng).unwrap();
            assert_eq!(next.noise_file, first.noise_file);
        }
    }

    #[test]
    fn test_mixture_never_clips_and_snr_in_range() {
        let mut s = sampler(vec![("loud", vec![white(2 * SR as usize, 0.9, 3)])], 10);
        let speech = speech_like(SR, 1.0, 0.6);
        let mut snr = SnrSampler::uniform(-2.5, 17.5);
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..10 {
            let draw = s.sample(&speech, "x", "regular", &mut None, &mut snr, &mut rng).unwrap();
            assert!(peak(&draw.mixture) < 1.0, "Peak {}", peak(&draw.mixture));
            assert!(draw.snr_db >= -2.5);
            assert!(draw.gain.is_finite() && draw.gain >= 0.0);
        }
    }

    #[test]
    fn test_achieved_snr_matches_target_without_clipping() {
        let mut s = sampler(vec![("n", vec![white(2 * SR as usize, 0.05, 4)])], 10);
        let speech = speech_like(SR, 1.0, 0.2);
        let mut snr = SnrSampler::uniform(10.0, 10.0);
        let draw = s
            .sample(&speech, "x", "regular", &mut None, &mut snr, &mut StdRng::seed_from_u64(1))
            .unwrap();
        assert_eq!(draw.snr_db, 10.0);
        assert_eq!(draw.metric(), AcousticMetric::Snr { db: 10.0 });

        let meter = LoudnessMeter::new(SR);
        let noise_part: Vec<f64> = draw.mixture.iter().zip(speech.iter()).map(|(m, s)| m - s).collect();
        let measured = meter.integrated_loudness(&speech).unwrap() - meter.integrated_loudness(&noise_part).unwrap();
        assert!((measured - 10.0).abs() < 1e-3, "Measured SNR {}", measured);
    }

    #[test]
    fn test_silent_noise_is_rejected() {
        let mut s = sampler(vec![("silent", vec![vec![0.0; 2 * SR as usize]])], 3);
        let speech = speech_like(SR, 1.0, 0.3);
        let mut snr = SnrSampler::uniform(0.0, 10.0);
        assert!(s
            .sample(&speech, "x", "regular", &mut None, &mut snr, &mut StdRng::seed_from_u64(0))
            .is_err());
    }
}
