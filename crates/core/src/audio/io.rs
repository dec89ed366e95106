//! Audio I/O: WAV read/write and sample-rate conversion.

use anyhow::{Context, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::Path;

/// Read a WAV file and return one `Vec<f64>` per channel plus the sample rate.
///
/// - Normalizes integer PCM to f64 in [-1, 1]
/// - Passes through float WAVs as f64
pub fn read_wav_channels(path: &Path) -> Result<(Vec<Vec<f64>>, u32)> {
    let reader = WavReader::open(path)
        .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;

    let spec = reader.spec();
    let channels = (spec.channels as usize).max(1);

    let interleaved: Vec<f64> = match spec.sample_format {
        SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f64;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f64 / max_val))
                .collect::<std::result::Result<Vec<_>, _>>()
                .with_context(|| format!("Failed to read WAV samples: {}", path.display()))?
        }
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| s.map(|v| v as f64))
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context(|| format!("Failed to read WAV samples: {}", path.display()))?,
    };

    let frames = interleaved.len() / channels;
    let mut out = vec![Vec::with_capacity(frames); channels];
    for frame in interleaved.chunks_exact(channels) {
        for (ch, &v) in frame.iter().enumerate() {
            out[ch].push(v);
        }
    }

    Ok((out, spec.sample_rate))
}

/// Read a WAV file and return (first_channel_samples, sample_rate).
pub fn read_wav(path: &Path) -> Result<(Vec<f64>, u32)> {
    let (channels, sr) = read_wav_channels(path)?;
    Ok((channels.into_iter().next().unwrap_or_default(), sr))
}

/// Frames per channel, read from the header without decoding.
pub fn wav_frames(path: &Path) -> Result<usize> {
    let reader = WavReader::open(path)
        .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;
    Ok(reader.duration() as usize)
}

/// Write mono f64 samples to a 32-bit float WAV file.
///
/// Values are stored unclipped. Creates parent directories if needed.
pub fn write_wav_float(path: &Path, samples: &[f64], sample_rate: u32) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create WAV file: {}", path.display()))?;

    for &sample in samples {
        writer.write_sample(sample as f32)?;
    }

    writer.finalize().context("Failed to finalize WAV file")?;
    Ok(())
}

/// Resample audio from source sample rate to target sample rate.
///
/// Uses rubato for high-quality resampling.
pub fn resample(samples: &[f64], from_sr: u32, to_sr: u32) -> Result<Vec<f64>> {
    if from_sr == to_sr {
        return Ok(samples.to_vec());
    }

    if samples.is_empty() {
        return Ok(vec![]);
    }

    use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_sr as f64 / from_sr as f64;
    let mut resampler = SincFixedIn::<f64>::new(
        ratio,
        2.0,
        params,
        samples.len(),
        1, // mono
    )
    .context("Failed to build resampler")?;

    let input = vec![samples.to_vec()];
    let output = resampler
        .process(&input, None)
        .context("Resampling failed")?;

    Ok(output.into_iter().next().unwrap_or_default())
}
