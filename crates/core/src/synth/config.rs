use std::path::PathBuf;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::audio::effects::ramp_samples;
use crate::audio::rt60::Rt60Variant;
use crate::types::Split;

/// Seed applied at the start of a run and again at the test split.
pub const DEFAULT_SEED: u64 = 42;

/// Settings shared by the reverberant and noisy generators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    pub sample_rate: u32,
    /// Train/valid speech shorter than this is skipped
    pub min_length_s: f64,
    /// Segment length for long train/valid files
    pub cut_length_s: f64,
    pub ramp_time_ms: f64,
    /// Longest test cut that is kept
    pub max_test_duration_s: f64,
    // Reverberant corpus
    pub max_rt60_s: f64,
    pub rt60_variant: Rt60Variant,
    // Noisy corpus
    pub min_snr_db: f64,
    pub max_snr_db: f64,
    pub copy_clean: bool,
    /// Draw ceiling per speech segment before giving up
    pub max_draws: usize,
    /// Decoded files kept in memory; 0 disables the cache
    pub cache_entries: usize,
    /// Ceiling on decoded samples held by the cache, in MiB
    pub cache_max_mb: usize,
    pub seed: u64,
    pub splits: Vec<Split>,
    /// Cut-points JSON for the test split
    pub test_files: PathBuf,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            min_length_s: 4.0,
            cut_length_s: 10.0,
            ramp_time_ms: 10.0,
            max_test_duration_s: 29.0,
            max_rt60_s: 2.0,
            rt60_variant: Rt60Variant::T30,
            min_snr_db: -2.5,
            max_snr_db: 17.5,
            copy_clean: false,
            max_draws: 1000,
            cache_entries: 256,
            cache_max_mb: 1024,
            seed: DEFAULT_SEED,
            splits: Split::ALL.to_vec(),
            test_files: PathBuf::from("test_files.json"),
        }
    }
}

impl SynthConfig {
    /// Byte ceiling for the decode cache.
    pub fn cache_bytes(&self) -> usize {
        self.cache_max_mb.saturating_mul(1024 * 1024)
    }

    /// Samples per full segment.
    pub fn cut_samples(&self) -> usize {
        (self.cut_length_s * self.sample_rate as f64) as usize
    }

    /// Minimum speech length in samples.
    pub fn min_samples(&self) -> usize {
        (self.min_length_s * self.sample_rate as f64) as usize
    }

    /// Length from which a mixture is split into segments.
    pub fn segment_threshold(&self) -> usize {
        ((self.cut_length_s + self.min_length_s) * self.sample_rate as f64) as usize
    }

    pub fn ramp_samples(&self) -> usize {
        ramp_samples(self.ramp_time_ms, self.sample_rate)
    }

    /// Longest test cut in samples.
    pub fn max_test_samples(&self) -> f64 {
        self.max_test_duration_s * self.sample_rate as f64
    }

    pub fn runs(&self, split: Split) -> bool {
        self.splits.contains(&split)
    }

    /// Reject settings no run could satisfy.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            bail!("Sample rate must be positive");
        }
        if self.cut_length_s <= 0.0 {
            bail!("Cut length must be positive, got {}", self.cut_length_s);
        }
        if self.min_length_s < 0.0 {
            bail!("Minimum length must not be negative, got {}", self.min_length_s);
        }
        if self.min_snr_db > self.max_snr_db {
            bail!("Minimum SNR {} dB exceeds maximum SNR {} dB", self.min_snr_db, self.max_snr_db);
        }
        if self.max_draws == 0 {
            bail!("At least one draw per segment is required");
        }
        if self.ramp_time_ms < 0.0 {
            bail!("Ramp time must not be negative");
        }
        Ok(())
    }
}
