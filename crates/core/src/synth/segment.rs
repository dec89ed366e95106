//! Splitting long mixtures into fixed-length windows.

use std::ops::Range;

/// Segment boundaries for a signal of `len` samples.
///
/// Signals of at least `threshold` samples are cut into windows of `cut`
/// samples; the last window runs to the end and is never shorter than
/// `min`. Shorter signals form a single segment. Segments tile `[0, len)`.
pub fn segment_bounds(len: usize, cut: usize, min: usize, threshold: usize) -> Vec<Range<usize>> {
    if cut == 0 || len < threshold || len < min {
        return vec![0..len];
    }
    let num_splits = (len - min) / cut + 1;
    let mut bounds: Vec<Range<usize>> = (0..num_splits - 1).map(|i| i * cut..(i + 1) * cut).collect();
    bounds.push((num_splits - 1) * cut..len);
    bounds
}
