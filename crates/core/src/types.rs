use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::audio::io::read_wav;
use crate::audio::rt60::Rt60Variant;
use crate::error::SynthError;

/// How a degradation file is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FormatFamily {
    Wav,
    SofaHrtf,
    MatlabRir,
    MultiChannelWav,
}

impl FormatFamily {
    /// Infer the family from a file extension (`.wav`, `.sofa`, `.mat`).
    pub fn from_path(path: &Path) -> Result<Self, SynthError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("wav") => Ok(Self::Wav),
            Some(ext) if ext.eq_ignore_ascii_case("sofa") => Ok(Self::SofaHrtf),
            Some(ext) if ext.eq_ignore_ascii_case("mat") => Ok(Self::MatlabRir),
            _ => Err(SynthError::UnsupportedFormat(path.display().to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::SofaHrtf => "sofa-hrtf",
            Self::MatlabRir => "matlab-rir",
            Self::MultiChannelWav => "multi-channel-wav",
        }
    }
}

impl FromStr for FormatFamily {
    type Err = SynthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wav" => Ok(Self::Wav),
            "sofa-hrtf" => Ok(Self::SofaHrtf),
            "matlab-rir" => Ok(Self::MatlabRir),
            "multi-channel-wav" => Ok(Self::MultiChannelWav),
            other => Err(SynthError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for FormatFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output subset. Speakers never appear in more than one split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Valid,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Valid, Split::Test];

    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Valid => "valid",
            Split::Test => "test",
        }
    }
}

impl FromStr for Split {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "train" => Ok(Split::Train),
            "valid" => Ok(Split::Valid),
            "test" => Ok(Split::Test),
            other => anyhow::bail!("unknown split: {}", other),
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One clean utterance, loaded at the pipeline sample rate.
#[derive(Debug, Clone)]
pub struct SpeechClip {
    pub samples: Vec<f64>,
    pub sample_rate: u32,
    pub path: PathBuf,
    /// Parent directory name
    pub speaker: String,
    /// File stem, e.g. "emo_anger_freeform"
    pub stem: String,
}

impl SpeechClip {
    /// Read a speech file and require it to be at `expected_sr`.
    pub fn load(path: &Path, expected_sr: u32) -> Result<Self> {
        let (samples, sample_rate) = read_wav(path)?;
        if sample_rate != expected_sr {
            return Err(SynthError::SampleRateMismatch {
                path: path.to_path_buf(),
                expected: expected_sr,
                found: sample_rate,
            }
            .into());
        }
        let speaker = path
            .parent()
            .and_then(|p| p.file_name())
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(Self { samples, sample_rate, path: path.to_path_buf(), speaker, stem })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Copy out `[start, end)`, clamped to the clip.
    pub fn cut(&self, start: usize, end: usize) -> Vec<f64> {
        let end = end.min(self.samples.len());
        let start = start.min(end);
        self.samples[start..end].to_vec()
    }
}

/// Speaking style encoded in a speech file stem.
pub fn style_of(stem: &str) -> &str {
    stem.split('_').next().unwrap_or(stem)
}

/// A decoded mono degradation signal and where it came from.
#[derive(Debug, Clone)]
pub struct DegradationSignal {
    pub samples: Vec<f64>,
    pub sample_rate: u32,
    pub channel: usize,
    pub format: FormatFamily,
    pub collection: String,
    pub path: PathBuf,
}

impl DegradationSignal {
    /// Source file stem, the manifest identifier for noise files.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Measured quality of an accepted combination.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AcousticMetric {
    Rt60 { seconds: f64, variant: Rt60Variant },
    Snr { db: f64 },
}

impl fmt::Display for AcousticMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcousticMetric::Rt60 { seconds, variant } => write!(f, "RT60 ({}) {:.2} s", variant, seconds),
            AcousticMetric::Snr { db } => write!(f, "SNR {:.1} dB", db),
        }
    }
}

/// Degradation-specific manifest columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Degradation {
    Reverb {
        /// Path relative to the data directory
        rir_file: String,
        channel: usize,
        gain: f64,
        rt60: f64,
    },
    Noise {
        /// Noise file stem
        noise_file: String,
        noise_start: usize,
        noise_end: usize,
        snr_db: f64,
    },
}

/// One manifest row, paired with one mixture/clean audio file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentRecord {
    pub id: usize,
    pub speaker: String,
    pub speech_file: String,
    pub speech_start: usize,
    /// Exclusive end offset in samples
    pub speech_end: usize,
    pub degradation: Degradation,
}
