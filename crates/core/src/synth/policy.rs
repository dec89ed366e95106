//! Split assignment and per-split generation rules.
//!
//! Speakers are partitioned into fixed train/valid/test sets. Train and
//! valid files are segmented by length; test files come with pre-computed
//! cut points and receive edge ramps. The noisy test split draws SNRs
//! balanced per emotion.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::Rng;

use crate::error::SynthError;
use crate::types::{style_of, Split};

pub const VALID_SPEAKERS: &[&str] = &["p100", "p101"];
pub const TEST_SPEAKERS: &[&str] = &["p102", "p103", "p104", "p105", "p106", "p107"];

/// Speaking styles left out of train and valid.
pub const HOLD_OUT_STYLES: &[&str] = &["interjection", "melodic", "nonverbal", "vegetative"];

/// Emotion and style labels, matched in order against file stems.
pub const EMOTION_STYLES: &[&str] = &[
    "adoration",
    "amazement",
    "amusement",
    "anger",
    "confusion",
    "contentment",
    "cuteness",
    "desire",
    "disappointment",
    "disgust",
    "distress",
    "embarassment",
    "extasy",
    "fast",
    "fear",
    "guilt",
    "highpitch",
    "interest",
    "loud",
    "lowpitch",
    "neutral",
    "pain",
    "pride",
    "realization",
    "relief",
    "regular",
    "sadness",
    "serenity",
    "slow",
    "whisper",
];

/// Number of equal-width SNR bins cycled through per emotion.
pub const SNR_BINS: usize = 12;

/// Speakers belonging to `split`, in the order given.
pub fn speakers_for(split: Split, all_speakers: &[String]) -> Vec<String> {
    match split {
        Split::Valid => VALID_SPEAKERS.iter().map(|s| s.to_string()).collect(),
        Split::Test => TEST_SPEAKERS.iter().map(|s| s.to_string()).collect(),
        Split::Train => all_speakers
            .iter()
            .filter(|s| !VALID_SPEAKERS.contains(&s.as_str()) && !TEST_SPEAKERS.contains(&s.as_str()))
            .cloned()
            .collect(),
    }
}

pub fn is_held_out(stem: &str) -> bool {
    HOLD_OUT_STYLES.contains(&style_of(stem))
}

/// First emotion label contained in the stem, case-insensitively.
pub fn find_emotion(stem: &str) -> Option<&'static str> {
    let lower = stem.to_lowercase();
    EMOTION_STYLES.iter().copied().find(|e| lower.contains(e))
}

/// Round to 0.1 dB, ties to even.
pub fn round_snr(snr_db: f64) -> f64 {
    (snr_db * 10.0).round_ties_even() / 10.0
}

fn uniform(min: f64, max: f64, rng: &mut StdRng) -> f64 {
    if min < max {
        rng.gen_range(min..max)
    } else {
        min
    }
}

/// `n + 1` evenly spaced values from `min` to `max` inclusive.
fn linspace(min: f64, max: f64, n: usize) -> Vec<f64> {
    let step = (max - min) / n as f64;
    (0..=n).map(|i| if i == n { max } else { min + step * i as f64 }).collect()
}

/// Target SNR draws for one split.
#[derive(Debug, Clone)]
pub struct SnrSampler {
    min_db: f64,
    max_db: f64,
    balanced: bool,
    edges: Vec<f64>,
    counters: HashMap<&'static str, usize>,
}

impl SnrSampler {
    /// Uniform over `[min_db, max_db)`.
    pub fn uniform(min_db: f64, max_db: f64) -> Self {
        Self {
            min_db,
            max_db,
            balanced: false,
            edges: vec![],
            counters: HashMap::new(),
        }
    }

    /// The n-th draw for an emotion comes from bin `n mod SNR_BINS`.
    pub fn emotion_balanced(min_db: f64, max_db: f64) -> Self {
        Self {
            balanced: true,
            edges: linspace(min_db, max_db, SNR_BINS),
            ..Self::uniform(min_db, max_db)
        }
    }

    pub fn bin_edges(&self) -> &[f64] {
        &self.edges
    }

    /// Draw an SNR for the speech file `stem`, rounded to 0.1 dB.
    pub fn draw(&mut self, stem: &str, rng: &mut StdRng) -> f64 {
        let emotion = if self.balanced { find_emotion(stem) } else { None };
        let snr = match emotion {
            Some(e) => {
                let counter = self.counters.entry(e).or_insert(0);
                let bin = *counter % SNR_BINS;
                *counter += 1;
                uniform(self.edges[bin], self.edges[bin + 1], rng)
            }
            None => uniform(self.min_db, self.max_db, rng),
        };
        round_snr(snr)
    }
}

/// How a split turns speech files into segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segmentation {
    /// Length-based windows over the whole file
    Computed,
    /// Pre-computed cut points, each cut one segment
    CutPoints,
}

/// Per-split generation rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitPolicy {
    pub split: Split,
    pub segmentation: Segmentation,
    pub apply_ramps: bool,
    pub drop_held_out_styles: bool,
    pub emotion_balanced_snr: bool,
}

impl SplitPolicy {
    pub fn for_split(split: Split) -> Self {
        let test = split == Split::Test;
        Self {
            split,
            segmentation: if test { Segmentation::CutPoints } else { Segmentation::Computed },
            apply_ramps: test,
            drop_held_out_styles: !test,
            emotion_balanced_snr: test,
        }
    }

    pub fn snr_sampler(&self, min_db: f64, max_db: f64) -> SnrSampler {
        if self.emotion_balanced_snr {
            SnrSampler::emotion_balanced(min_db, max_db)
        } else {
            SnrSampler::uniform(min_db, max_db)
        }
    }
}

/// One test speech file with its cut points.
#[derive(Debug, Clone, PartialEq)]
pub struct TestFile {
    pub speaker: String,
    pub stem: String,
    pub path: PathBuf,
    /// `[start, end)` sample ranges
    pub cuts: Vec<(usize, usize)>,
}

impl TestFile {
    /// Require every cut to lie within `len` samples and span at least
    /// `min_len` samples.
    pub fn check_cuts(&self, len: usize, min_len: usize) -> Result<(), SynthError> {
        for &(start, end) in &self.cuts {
            if start >= end || end > len || end - start < min_len {
                return Err(SynthError::InvalidCutPoint {
                    file: format!("{}/{}", self.speaker, self.stem),
                    start,
                    end,
                    len,
                    min_len,
                });
            }
        }
        Ok(())
    }
}

/// Cut points for the test split: speaker → stem → ranges.
#[derive(Debug, Clone, Default)]
pub struct CutPoints(BTreeMap<String, BTreeMap<String, Vec<(usize, usize)>>>);

impl CutPoints {
    pub fn from_json(json: &str) -> Result<Self> {
        let map = serde_json::from_str(json).context("Failed to parse cut points")?;
        Ok(Self(map))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read cut points: {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("Invalid cut points file: {}", path.display()))
    }

    pub fn speakers(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|s| s.as_str())
    }

    /// Test files for `speakers`, stems in sorted order per speaker.
    pub fn test_files(&self, speech_dir: &Path, speakers: &[String]) -> Result<Vec<TestFile>> {
        let mut files = Vec::new();
        for speaker in speakers {
            let stems = self
                .0
                .get(speaker)
                .ok_or_else(|| SynthError::MissingCutPoints(speaker.clone()))?;
            for (stem, cuts) in stems {
                files.push(TestFile {
                    speaker: speaker.clone(),
                    stem: stem.clone(),
                    path: speech_dir.join(speaker).join(format!("{}.wav", stem)),
                    cuts: cuts.clone(),
                });
            }
        }
        Ok(files)
    }
}
