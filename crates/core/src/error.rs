//! Fatal conditions that abort a generation run.
//!
//! Rejected draws are not errors; see [`crate::synth::Rejection`].

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SynthError {
    #[error("output directory already exists: {}", .0.display())]
    OutputExists(PathBuf),

    #[error("directory does not exist: {}", .0.display())]
    MissingDirectory(PathBuf),

    #[error("no candidate files found in {0} corpus")]
    EmptyCorpus(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("sampling rate of {} is {found} Hz, expected {expected} Hz", path.display())]
    SampleRateMismatch {
        path: PathBuf,
        expected: u32,
        found: u32,
    },

    #[error("signal of {samples} samples is shorter than one loudness block ({required} samples)")]
    SignalTooShort { samples: usize, required: usize },

    #[error("no acceptable degradation for {speech_file} after {attempts} draws")]
    CorpusExhausted { speech_file: String, attempts: usize },

    #[error("speaker {0} missing from cut-points file")]
    MissingCutPoints(String),

    #[error("cut {start}..{end} of {file} is invalid for {len} samples (at least {min_len} per cut)")]
    InvalidCutPoint {
        file: String,
        start: usize,
        end: usize,
        len: usize,
        min_len: usize,
    },
}
