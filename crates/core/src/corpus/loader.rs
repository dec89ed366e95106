//! Decoding of degradation files into mono signals.
//!
//! Each [`FormatFamily`] maps to a [`Decoder`] that yields every channel of a
//! file. [`Loader`] picks one channel at random and enforces the pipeline
//! sample rate.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::Rng;

use super::cache::DecodeCache;
use super::CorpusEntry;
use crate::audio::io::{read_wav_channels, resample};
use crate::error::SynthError;
use crate::types::{DegradationSignal, FormatFamily};

/// All channels of a decoded file.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub channels: Vec<Vec<f64>>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    /// Memory held by the decoded samples.
    pub fn byte_size(&self) -> usize {
        self.channels.iter().map(|c| c.len() * std::mem::size_of::<f64>()).sum()
    }
}

impl DecodedAudio {
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }
}

/// Trait for per-format decoding backends.
pub trait Decoder: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Decode every channel of `path`.
    fn decode(&self, path: &Path) -> Result<DecodedAudio>;

    /// Whether this build can decode the format at all.
    fn is_available(&self) -> bool {
        true
    }
}

/// Plain and multi-channel RIFF WAV.
pub struct WavDecoder;

impl Decoder for WavDecoder {
    fn name(&self) -> &str {
        "wav"
    }

    fn decode(&self, path: &Path) -> Result<DecodedAudio> {
        let (channels, sample_rate) = read_wav_channels(path)?;
        Ok(DecodedAudio { channels, sample_rate })
    }
}

/// SOFA (HDF5/netCDF4) impulse responses.
///
/// `Data.IR` has shape `[measurements, receivers, samples]`; the first
/// measurement is used and each receiver becomes a channel.
pub struct SofaDecoder;

impl Decoder for SofaDecoder {
    fn name(&self) -> &str {
        "sofa"
    }

    fn is_available(&self) -> bool {
        cfg!(feature = "hdf5-containers")
    }

    fn decode(&self, path: &Path) -> Result<DecodedAudio> {
        #[cfg(feature = "hdf5-containers")]
        {
            return containers::read_sofa(path);
        }

        #[cfg(not(feature = "hdf5-containers"))]
        {
            let _ = path;
            bail!(
                "Reading SOFA files requires the 'hdf5-containers' feature. \
                 Build with: cargo build --features hdf5-containers"
            );
        }
    }
}

/// MATLAB v7.3 (HDF5) impulse responses with `data` and `fs` variables.
pub struct MatDecoder;

impl Decoder for MatDecoder {
    fn name(&self) -> &str {
        "mat"
    }

    fn is_available(&self) -> bool {
        cfg!(feature = "hdf5-containers")
    }

    fn decode(&self, path: &Path) -> Result<DecodedAudio> {
        #[cfg(feature = "hdf5-containers")]
        {
            return containers::read_mat(path);
        }

        #[cfg(not(feature = "hdf5-containers"))]
        {
            let _ = path;
            bail!(
                "Reading MATLAB files requires the 'hdf5-containers' feature. \
                 Build with: cargo build --features hdf5-containers"
            );
        }
    }
}

static WAV: WavDecoder = WavDecoder;
static SOFA: SofaDecoder = SofaDecoder;
static MAT: MatDecoder = MatDecoder;

/// Backend for a format family.
pub fn decoder_for(format: FormatFamily) -> &'static dyn Decoder {
    match format {
        FormatFamily::Wav | FormatFamily::MultiChannelWav => &WAV,
        FormatFamily::SofaHrtf => &SOFA,
        FormatFamily::MatlabRir => &MAT,
    }
}

#[cfg(feature = "hdf5-containers")]
mod containers {
    use std::path::Path;

    use anyhow::{bail, Context, Result};

    use super::DecodedAudio;

    fn open(path: &Path) -> Result<hdf5::File> {
        hdf5::File::open(path).with_context(|| format!("Failed to open HDF5 container: {}", path.display()))
    }

    fn read_first_scalar(file: &hdf5::File, name: &str, path: &Path) -> Result<f64> {
        let values = file
            .dataset(name)
            .and_then(|ds| ds.read_raw::<f64>())
            .with_context(|| format!("Failed to read {} from {}", name, path.display()))?;
        match values.first() {
            Some(&v) => Ok(v),
            None => bail!("{} in {} is empty", name, path.display()),
        }
    }

    fn sample_rate_from(value: f64, path: &Path) -> Result<u32> {
        if !value.is_finite() || value <= 0.0 {
            bail!("Invalid sampling rate {} in {}", value, path.display());
        }
        Ok(value.round() as u32)
    }

    pub fn read_sofa(path: &Path) -> Result<DecodedAudio> {
        let file = open(path)?;
        let ds = file
            .dataset("Data.IR")
            .with_context(|| format!("Missing Data.IR in {}", path.display()))?;
        let shape = ds.shape();
        if shape.len() != 3 {
            bail!("Data.IR in {} has {} dimensions, expected 3", path.display(), shape.len());
        }
        let (receivers, samples) = (shape[1], shape[2]);
        let raw = ds.read_raw::<f64>()?;

        // Row-major: first measurement occupies the first receivers * samples values
        let channels = (0..receivers)
            .map(|r| raw[r * samples..(r + 1) * samples].to_vec())
            .collect();
        let sample_rate = sample_rate_from(read_first_scalar(&file, "Data.SamplingRate", path)?, path)?;
        Ok(DecodedAudio { channels, sample_rate })
    }

    pub fn read_mat(path: &Path) -> Result<DecodedAudio> {
        let file = open(path)?;
        let ds = file
            .dataset("data")
            .with_context(|| format!("Missing data variable in {}", path.display()))?;
        // MATLAB stores column-major, so a samples x channels matrix reads as [channels, samples]
        let shape = ds.shape();
        let (num_channels, samples) = match shape.as_slice() {
            [n] => (1, *n),
            [c, n] => (*c, *n),
            _ => bail!("data in {} has {} dimensions, expected 1 or 2", path.display(), shape.len()),
        };
        let raw = ds.read_raw::<f64>()?;
        let channels = (0..num_channels)
            .map(|c| raw[c * samples..(c + 1) * samples].to_vec())
            .collect();
        let sample_rate = sample_rate_from(read_first_scalar(&file, "fs", path)?, path)?;
        Ok(DecodedAudio { channels, sample_rate })
    }
}

/// Anything that turns a corpus entry into a mono degradation signal.
pub trait SignalSource {
    fn load(&mut self, entry: &CorpusEntry, expected_sr: u32, rng: &mut StdRng) -> Result<DegradationSignal>;
}

/// Loads a random channel of a corpus entry at the pipeline sample rate.
pub struct Loader {
    cache: DecodeCache,
}

impl Loader {
    /// `cache_entries` of zero disables caching. `cache_bytes` bounds the
    /// decoded samples held across all entries.
    pub fn new(cache_entries: usize, cache_bytes: usize) -> Self {
        Self { cache: DecodeCache::new(cache_entries, cache_bytes) }
    }

    pub fn cache(&self) -> &DecodeCache {
        &self.cache
    }

    /// Decode `entry`, draw a channel uniformly and return it at `expected_sr`.
    ///
    /// A differing rate is resampled only when the entry allows it; otherwise
    /// it is a [`SynthError::SampleRateMismatch`].
    pub fn load(&mut self, entry: &CorpusEntry, expected_sr: u32, rng: &mut StdRng) -> Result<DegradationSignal> {
        let decoder = decoder_for(entry.format);
        let audio: Arc<DecodedAudio> = self.cache.get_or_decode(&entry.path, |p| decoder.decode(p))?;

        if audio.channels.is_empty() {
            bail!("{} has no audio channels", entry.path.display());
        }
        let channel = rng.gen_range(0..audio.num_channels());
        let mut samples = audio.channels[channel].clone();
        let mut sample_rate = audio.sample_rate;

        if sample_rate != expected_sr {
            if !entry.resample {
                return Err(SynthError::SampleRateMismatch {
                    path: entry.path.clone(),
                    expected: expected_sr,
                    found: sample_rate,
                }
                .into());
            }
            log::debug!("Resampling {} from {} to {} Hz", entry.path.display(), sample_rate, expected_sr);
            samples = resample(&samples, sample_rate, expected_sr)?;
            sample_rate = expected_sr;
        }

        Ok(DegradationSignal {
            samples,
            sample_rate,
            channel,
            format: entry.format,
            collection: entry.collection.clone(),
            path: entry.path.clone(),
        })
    }
}

impl Drop for Loader {
    fn drop(&mut self) {
        if self.cache.hits() + self.cache.misses() > 0 {
            log::debug!(
                "Decode cache: {} hits, {} misses, {} files held ({} bytes)",
                self.cache.hits(),
                self.cache.misses(),
                self.cache.len(),
                self.cache.bytes()
            );
        }
    }
}

impl SignalSource for Loader {
    fn load(&mut self, entry: &CorpusEntry, expected_sr: u32, rng: &mut StdRng) -> Result<DegradationSignal> {
        Loader::load(self, entry, expected_sr, rng)
    }
}
