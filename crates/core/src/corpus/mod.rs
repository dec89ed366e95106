//! Degradation corpora: enumeration, decoding and caching.

pub mod cache;
pub mod index;
pub mod loader;

use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::types::FormatFamily;

/// One candidate degradation file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusEntry {
    pub path: PathBuf,
    pub format: FormatFamily,
    /// Sub-collection the file was enumerated from, e.g. "ACE-Challenge"
    pub collection: String,
    /// Whether a sample-rate mismatch may be fixed by resampling
    pub resample: bool,
}

impl CorpusEntry {
    pub fn new(path: PathBuf, format: FormatFamily, collection: &str) -> Self {
        Self {
            path,
            format,
            collection: collection.to_string(),
            resample: false,
        }
    }

    pub fn with_resampling(mut self, allowed: bool) -> Self {
        self.resample = allowed;
        self
    }

    /// Path relative to `root`, falling back to the full path.
    pub fn relative_to(&self, root: &Path) -> String {
        self.path
            .strip_prefix(root)
            .unwrap_or(&self.path)
            .to_string_lossy()
            .to_string()
    }
}

/// Flat, ordered list of candidate degradation files.
#[derive(Debug, Clone, Default)]
pub struct CorpusIndex {
    name: String,
    entries: Vec<CorpusEntry>,
}

impl CorpusIndex {
    pub fn new(name: &str, entries: Vec<CorpusEntry>) -> Self {
        Self { name: name.to_string(), entries }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entries(&self) -> &[CorpusEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Uniform draw with replacement.
    pub fn draw(&self, rng: &mut StdRng) -> Option<&CorpusEntry> {
        if self.entries.is_empty() {
            return None;
        }
        Some(&self.entries[rng.gen_range(0..self.entries.len())])
    }
}
