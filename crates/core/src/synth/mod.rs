//! Acceptance sampling, mixing and dataset generation.

pub mod config;
pub mod gain;
pub mod generate;
pub mod noise;
pub mod policy;
pub mod reverb;
pub mod segment;
pub mod writer;

use std::fmt;

pub use config::SynthConfig;
pub use generate::{generate_noisy, generate_reverb, CorpusKind, SplitReport};

/// Why a drawn degradation was discarded. Rejections trigger a redraw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rejection {
    /// Estimated reverberation time above the ceiling
    Rt60TooHigh { rt60: f64, max: f64 },
    /// Loudness gain was infinite or NaN
    NonFiniteGain,
    /// Noise excerpt has no measurable loudness
    SilentNoise,
    /// Noise file shorter than the speech it must cover
    NoiseTooShort { noise: usize, speech: usize },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Rt60TooHigh { rt60, max } => write!(f, "RT60 {:.2} s above {:.2} s", rt60, max),
            Rejection::NonFiniteGain => f.write_str("non-finite gain"),
            Rejection::SilentNoise => f.write_str("silent noise excerpt"),
            Rejection::NoiseTooShort { noise, speech } => {
                write!(f, "noise of {} samples shorter than speech of {}", noise, speech)
            }
        }
    }
}
