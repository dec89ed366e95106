//! Synthesis of paired clean/degraded speech corpora.
//!
//! Clean speech is combined with room impulse responses (reverberant corpus)
//! or background noise (noisy corpus) under RT60 and loudness/SNR
//! constraints, and written out as a manifest plus float WAV files.

pub mod audio;
pub mod corpus;
pub mod error;
pub mod synth;
pub mod types;

pub use error::SynthError;
