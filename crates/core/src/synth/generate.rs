//! Split generators for the reverberant and noisy corpora.
//!
//! Every split runs the same per-segment operation: draw an accepted
//! degradation for a stretch of speech, mix, split into segments, optionally
//! ramp the edges and hand each segment to a [`SegmentSink`]. What varies
//! between splits is captured by [`SplitPolicy`].

use std::ops::Range;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::config::SynthConfig;
use super::noise::NoiseSampler;
use super::policy::{is_held_out, speakers_for, CutPoints, Segmentation, SnrSampler, SplitPolicy};
use super::reverb::ReverbSampler;
use super::segment::segment_bounds;
pub use super::writer::CorpusKind;
use super::writer::{DatasetWriter, Segment, SegmentSink};
use crate::audio::effects::{apply_ramps, linear_ramp};
use crate::audio::io::wav_frames;
use crate::audio::loudness::LoudnessMeter;
use crate::corpus::index::{build_noise_index, build_rir_index, list_speakers, list_speech_files};
use crate::corpus::loader::Loader;
use crate::error::SynthError;
use crate::types::{Degradation, DegradationSignal, SpeechClip, Split};

/// Speech corpus directory under the data directory.
pub const SPEECH_DIR: &str = "EARS";

/// Summary of one generated split.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitReport {
    pub split: Split,
    pub speech_files: usize,
    /// Files or cuts left out for length
    pub skipped: usize,
    pub segments: usize,
    pub rejections: usize,
}

/// The degradation applied to every speech excerpt.
enum Degrader {
    Reverb { sampler: ReverbSampler, data_dir: PathBuf },
    Noisy { sampler: NoiseSampler },
}

/// Per-split sampling state.
struct DegradeState {
    /// Noise signal reused across cuts of one speech file
    noise: Option<DegradationSignal>,
    snr: SnrSampler,
}

impl Degrader {
    fn rejections(&self) -> usize {
        match self {
            Degrader::Reverb { sampler, .. } => sampler.rejections(),
            Degrader::Noisy { sampler } => sampler.rejections(),
        }
    }

    /// Mixture for `speech` and its degradation columns. Noise offsets are
    /// relative to the start of `speech`.
    fn degrade(
        &mut self,
        speech: &[f64],
        clip: &SpeechClip,
        state: &mut DegradeState,
        rng: &mut StdRng,
    ) -> Result<(Vec<f64>, Degradation)> {
        let label = format!("{}/{}", clip.speaker, clip.stem);
        match self {
            Degrader::Reverb { sampler, data_dir } => {
                let draw = sampler.sample(speech, &label, rng)?;
                let degradation = Degradation::Reverb {
                    rir_file: draw.entry.relative_to(data_dir),
                    channel: draw.channel,
                    gain: draw.gain,
                    rt60: draw.rt60,
                };
                Ok((draw.mixture, degradation))
            }
            Degrader::Noisy { sampler } => {
                let draw = sampler.sample(speech, &label, &clip.stem, &mut state.noise, &mut state.snr, rng)?;
                let degradation = Degradation::Noise {
                    noise_file: draw.noise_file,
                    noise_start: draw.noise_start,
                    noise_end: draw.noise_start + speech.len(),
                    snr_db: draw.snr_db,
                };
                Ok((draw.mixture, degradation))
            }
        }
    }
}

/// Degradation columns for the sub-range `range` of a degraded excerpt.
fn degradation_for(degradation: &Degradation, range: &Range<usize>) -> Degradation {
    match degradation {
        Degradation::Noise { noise_file, noise_start, snr_db, .. } => Degradation::Noise {
            noise_file: noise_file.clone(),
            noise_start: noise_start + range.start,
            noise_end: noise_start + range.end,
            snr_db: *snr_db,
        },
        other => other.clone(),
    }
}

/// Drives all requested splits of one corpus.
pub struct Generator {
    kind: CorpusKind,
    config: SynthConfig,
    speech_dir: PathBuf,
    speakers: Vec<String>,
    degrader: Degrader,
    cut_points: Option<CutPoints>,
    rng: StdRng,
}

impl Generator {
    /// Check inputs and index the degradation corpus.
    ///
    /// Nothing is written. Fails on a missing speech or noise directory, an
    /// empty degradation corpus, or cut points that are missing or do not
    /// fit their speech files.
    pub fn prepare(kind: CorpusKind, data_dir: &Path, config: &SynthConfig) -> Result<Self> {
        config.validate()?;

        let speech_dir = data_dir.join(SPEECH_DIR);
        let speakers = list_speakers(&speech_dir)?;

        let mut rng = StdRng::seed_from_u64(config.seed);
        let degrader = match kind {
            CorpusKind::Reverb => {
                let index = build_rir_index(data_dir, &mut rng)?;
                let loader = Loader::new(config.cache_entries, config.cache_bytes());
                Degrader::Reverb {
                    sampler: ReverbSampler::new(
                        index,
                        Box::new(loader),
                        config.sample_rate,
                        config.max_rt60_s,
                        config.rt60_variant,
                        config.max_draws,
                    ),
                    data_dir: data_dir.to_path_buf(),
                }
            }
            CorpusKind::Noisy => {
                let index = build_noise_index(data_dir, &mut rng)?;
                let loader = Loader::new(config.cache_entries, config.cache_bytes());
                Degrader::Noisy {
                    sampler: NoiseSampler::new(index, Box::new(loader), config.sample_rate, config.max_draws),
                }
            }
        };

        let cut_points = if config.runs(Split::Test) {
            let cuts = CutPoints::load(&config.test_files)?;
            // Fail before any output is produced
            let min_cut = LoudnessMeter::new(config.sample_rate).block_samples();
            for file in cuts.test_files(&speech_dir, &speakers_for(Split::Test, &speakers))? {
                file.check_cuts(wav_frames(&file.path)?, min_cut)?;
            }
            Some(cuts)
        } else {
            None
        };

        Ok(Self {
            kind,
            config: config.clone(),
            speech_dir,
            speakers,
            degrader,
            cut_points,
            rng,
        })
    }

    /// Generate every configured split in train, valid, test order.
    pub fn run<S: SegmentSink>(&mut self, sink: &mut S) -> Result<Vec<SplitReport>> {
        let mut reports = Vec::new();
        for split in Split::ALL {
            if !self.config.runs(split) {
                continue;
            }
            if split == Split::Test {
                self.rng = StdRng::seed_from_u64(self.config.seed);
            }
            log::info!("Generate {} split", split);
            let report = self.run_split(split, sink)?;
            log::info!(
                "{} split: {} segments from {} files ({} skipped, {} rejected draws)",
                split,
                report.segments,
                report.speech_files,
                report.skipped,
                report.rejections
            );
            reports.push(report);
        }
        Ok(reports)
    }

    fn run_split<S: SegmentSink>(&mut self, split: Split, sink: &mut S) -> Result<SplitReport> {
        let policy = SplitPolicy::for_split(split);
        let speakers = speakers_for(split, &self.speakers);
        sink.begin_split(split, &speakers)?;

        let mut report = SplitReport {
            split,
            speech_files: 0,
            skipped: 0,
            segments: 0,
            rejections: 0,
        };
        let rejections_before = self.degrader.rejections();
        let mut state = DegradeState {
            noise: None,
            snr: policy.snr_sampler(self.config.min_snr_db, self.config.max_snr_db),
        };

        match policy.segmentation {
            Segmentation::Computed => self.run_computed(&policy, &speakers, &mut state, sink, &mut report)?,
            Segmentation::CutPoints => self.run_cut_points(&policy, &speakers, &mut state, sink, &mut report)?,
        }

        report.rejections = self.degrader.rejections() - rejections_before;
        Ok(report)
    }

    /// Whole files, one draw each, split by length.
    fn run_computed<S: SegmentSink>(
        &mut self,
        policy: &SplitPolicy,
        speakers: &[String],
        state: &mut DegradeState,
        sink: &mut S,
        report: &mut SplitReport,
    ) -> Result<()> {
        let mut files = list_speech_files(&self.speech_dir, speakers)?;
        if policy.drop_held_out_styles {
            files.retain(|f| {
                let stem = f.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
                !is_held_out(&stem)
            });
        }
        log::info!("{} speech files for {} split", files.len(), policy.split);

        let min_len = self.config.min_length_s * self.config.sample_rate as f64;
        for path in &files {
            let clip = SpeechClip::load(path, self.config.sample_rate)?;
            report.speech_files += 1;
            if (clip.len() as f64) < min_len {
                log::debug!("Skipping {}: {} samples below minimum", path.display(), clip.len());
                report.skipped += 1;
                continue;
            }

            state.noise = None;
            let bounds = segment_bounds(
                clip.len(),
                self.config.cut_samples(),
                self.config.min_samples(),
                self.config.segment_threshold(),
            );
            report.segments += self.emit(policy, &clip, 0, clip.samples.clone(), &bounds, state, sink)?;
        }
        Ok(())
    }

    /// Pre-computed cuts, shuffled, one draw per cut.
    fn run_cut_points<S: SegmentSink>(
        &mut self,
        policy: &SplitPolicy,
        speakers: &[String],
        state: &mut DegradeState,
        sink: &mut S,
        report: &mut SplitReport,
    ) -> Result<()> {
        let cut_points = self
            .cut_points
            .as_ref()
            .with_context(|| format!("No cut points loaded for {} split", policy.split))?;
        let mut files = cut_points.test_files(&self.speech_dir, speakers)?;
        files.shuffle(&mut self.rng);
        log::info!("{} speech files for {} split", files.len(), policy.split);

        let max_len = self.config.max_test_samples();
        for file in &files {
            let clip = SpeechClip::load(&file.path, self.config.sample_rate)?;
            report.speech_files += 1;
            state.noise = None;

            for &(start, end) in &file.cuts {
                let cut = clip.cut(start, end);
                if cut.len() as f64 > max_len {
                    log::debug!("Skipping cut {}..{} of {}: too long", start, end, file.path.display());
                    report.skipped += 1;
                    continue;
                }
                let bounds = vec![0..cut.len()];
                report.segments += self.emit(policy, &clip, start, cut, &bounds, state, sink)?;
            }
        }
        Ok(())
    }

    /// Degrade `speech` (which starts at `offset` in `clip`) and write one
    /// segment per range in `bounds`.
    #[allow(clippy::too_many_arguments)]
    fn emit<S: SegmentSink>(
        &mut self,
        policy: &SplitPolicy,
        clip: &SpeechClip,
        offset: usize,
        speech: Vec<f64>,
        bounds: &[Range<usize>],
        state: &mut DegradeState,
        sink: &mut S,
    ) -> Result<usize> {
        let (mixture, degradation) = self.degrader.degrade(&speech, clip, state, &mut self.rng)?;
        let ramp = if policy.apply_ramps {
            linear_ramp(self.config.ramp_samples())
        } else {
            vec![]
        };

        for range in bounds {
            let mut mixture_seg = mixture[range.clone()].to_vec();
            let mut clean_seg = speech[range.clone()].to_vec();
            if policy.apply_ramps {
                apply_ramps(&mut mixture_seg, &ramp);
                apply_ramps(&mut clean_seg, &ramp);
            }
            sink.write_segment(
                policy.split,
                Segment {
                    speaker: &clip.speaker,
                    speech_file: &clip.stem,
                    speech_start: offset + range.start,
                    speech_end: offset + range.end,
                    degradation: degradation_for(&degradation, range),
                    mixture: &mixture_seg,
                    clean: &clean_seg,
                },
            )?;
        }
        Ok(bounds.len())
    }
}

/// Generate a corpus under `data_dir`, refusing to touch an existing output.
pub fn generate(kind: CorpusKind, data_dir: &Path, config: &SynthConfig) -> Result<Vec<SplitReport>> {
    let output = data_dir.join(kind.output_dir_name());
    if output.exists() {
        return Err(SynthError::OutputExists(output).into());
    }

    let mut generator = Generator::prepare(kind, data_dir, config)?;

    std::fs::create_dir_all(&output)
        .with_context(|| format!("Failed to create output directory: {}", output.display()))?;
    log::info!("Writing {} to {}", kind.output_dir_name(), output.display());

    let mut writer = DatasetWriter::new(&output, kind, config.sample_rate, config.copy_clean);
    generator.run(&mut writer)
}

/// Reverberant corpus (`EARS-Reverb`).
pub fn generate_reverb(data_dir: &Path, config: &SynthConfig) -> Result<Vec<SplitReport>> {
    generate(CorpusKind::Reverb, data_dir, config)
}

/// Noisy corpus (`EARS-WHAM`).
pub fn generate_noisy(data_dir: &Path, config: &SynthConfig) -> Result<Vec<SplitReport>> {
    generate(CorpusKind::Noisy, data_dir, config)
}
