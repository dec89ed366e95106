//! Signal-level building blocks: I/O, analysis, loudness, RT60, effects.

pub mod analysis;
pub mod effects;
pub mod io;
pub mod loudness;
pub mod rt60;
