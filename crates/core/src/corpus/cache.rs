//! In-memory cache of decoded degradation files.
//!
//! Impulse responses are drawn with replacement from a few thousand files,
//! so the same file is decoded many times over a run. Entries are evicted
//! first-in first-out once `capacity` files are held or the decoded samples
//! would exceed `max_bytes`. A single file larger than `max_bytes` is never
//! stored.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;

use super::loader::DecodedAudio;

#[derive(Debug, Default)]
pub struct DecodeCache {
    capacity: usize,
    max_bytes: usize,
    bytes: usize,
    order: VecDeque<PathBuf>,
    entries: HashMap<PathBuf, Arc<DecodedAudio>>,
    hits: usize,
    misses: usize,
}

impl DecodeCache {
    pub fn new(capacity: usize, max_bytes: usize) -> Self {
        Self { capacity, max_bytes, ..Default::default() }
    }

    /// Return the cached decode of `path`, or run `decode` and remember it.
    ///
    /// Failed decodes are not cached.
    pub fn get_or_decode<F>(&mut self, path: &Path, decode: F) -> Result<Arc<DecodedAudio>>
    where
        F: FnOnce(&Path) -> Result<DecodedAudio>,
    {
        if let Some(audio) = self.entries.get(path) {
            self.hits += 1;
            return Ok(Arc::clone(audio));
        }

        self.misses += 1;
        let audio = Arc::new(decode(path)?);
        let size = audio.byte_size();
        if self.capacity == 0 || size > self.max_bytes {
            return Ok(audio);
        }

        while self.entries.len() >= self.capacity || self.bytes + size > self.max_bytes {
            match self.order.pop_front() {
                Some(oldest) => {
                    if let Some(evicted) = self.entries.remove(&oldest) {
                        self.bytes -= evicted.byte_size();
                    }
                }
                None => break,
            }
        }
        self.bytes += size;
        self.order.push_back(path.to_path_buf());
        self.entries.insert(path.to_path_buf(), Arc::clone(&audio));
        Ok(audio)
    }

    /// Bytes of decoded samples currently held.
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn misses(&self) -> usize {
        self.misses
    }
}
