//! Dataset output: per-split CSV manifests and paired WAV files.
//!
//! Layout under the output root:
//!
//! ```text
//! <split>.csv
//! <split>/<reverberant|noisy>/<speaker>/<id>_<metric>.wav
//! <split>/clean/<speaker>/<id>.wav        (with copy_clean)
//! ```

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::audio::io::write_wav_float;
use crate::types::{Degradation, SegmentRecord, Split};

/// Which degraded corpus is being generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorpusKind {
    Reverb,
    Noisy,
}

impl CorpusKind {
    /// Output root name under the data directory.
    pub fn output_dir_name(&self) -> &'static str {
        match self {
            CorpusKind::Reverb => "EARS-Reverb",
            CorpusKind::Noisy => "EARS-WHAM",
        }
    }

    /// Directory holding degraded audio within a split.
    pub fn mixture_dir(&self) -> &'static str {
        match self {
            CorpusKind::Reverb => "reverberant",
            CorpusKind::Noisy => "noisy",
        }
    }

    pub fn csv_header(&self) -> &'static str {
        match self {
            CorpusKind::Reverb => "id,speaker,speech_file,speech_start,speech_end,rir_file,channel,gain,rt60",
            CorpusKind::Noisy => {
                "id,speaker,speech_file,speech_start,speech_end,noise_file,noise_start,noise_end,snr_dB"
            }
        }
    }
}

/// One manifest line, without the trailing newline.
pub fn manifest_row(record: &SegmentRecord) -> String {
    let common = format!(
        "{:05},{},{},{},{}",
        record.id, record.speaker, record.speech_file, record.speech_start, record.speech_end
    );
    match &record.degradation {
        Degradation::Reverb { rir_file, channel, gain, rt60 } => {
            format!("{},{},{},{},{:.2}", common, rir_file, channel, gain, rt60)
        }
        Degradation::Noise { noise_file, noise_start, noise_end, snr_db } => {
            format!("{},{},{},{},{:.1}", common, noise_file, noise_start, noise_end, snr_db)
        }
    }
}

/// File name of the degraded audio for `record`.
pub fn mixture_file_name(record: &SegmentRecord) -> String {
    match &record.degradation {
        Degradation::Reverb { rt60, .. } => format!("{:05}_{:.2}.wav", record.id, rt60),
        Degradation::Noise { snr_db, .. } => format!("{:05}_{:.1}dB.wav", record.id, snr_db),
    }
}

/// A finished segment ready to be persisted. The sink assigns the id.
#[derive(Debug, Clone)]
pub struct Segment<'a> {
    pub speaker: &'a str,
    pub speech_file: &'a str,
    pub speech_start: usize,
    pub speech_end: usize,
    pub degradation: Degradation,
    pub mixture: &'a [f64],
    pub clean: &'a [f64],
}

/// Destination for generated segments.
pub trait SegmentSink {
    /// Start a split. Resets the split's id counter.
    fn begin_split(&mut self, split: Split, speakers: &[String]) -> Result<()>;

    /// Persist one segment and return its manifest record.
    fn write_segment(&mut self, split: Split, segment: Segment<'_>) -> Result<SegmentRecord>;
}

fn record_for(id: usize, segment: &Segment<'_>) -> SegmentRecord {
    SegmentRecord {
        id,
        speaker: segment.speaker.to_string(),
        speech_file: segment.speech_file.to_string(),
        speech_start: segment.speech_start,
        speech_end: segment.speech_end,
        degradation: segment.degradation.clone(),
    }
}

/// Writes WAV files and CSV manifests to disk.
pub struct DatasetWriter {
    root: PathBuf,
    kind: CorpusKind,
    sample_rate: u32,
    copy_clean: bool,
    next_id: HashMap<Split, usize>,
}

impl DatasetWriter {
    pub fn new(root: &Path, kind: CorpusKind, sample_rate: u32, copy_clean: bool) -> Self {
        Self {
            root: root.to_path_buf(),
            kind,
            sample_rate,
            copy_clean,
            next_id: HashMap::new(),
        }
    }

    pub fn manifest_path(&self, split: Split) -> PathBuf {
        self.root.join(format!("{}.csv", split))
    }

    fn append_row(&self, split: Split, row: &str) -> Result<()> {
        let path = self.manifest_path(split);
        let mut file = OpenOptions::new()
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open manifest: {}", path.display()))?;
        writeln!(file, "{}", row).with_context(|| format!("Failed to append to {}", path.display()))?;
        Ok(())
    }
}

impl SegmentSink for DatasetWriter {
    fn begin_split(&mut self, split: Split, speakers: &[String]) -> Result<()> {
        let split_dir = self.root.join(split.as_str());
        for speaker in speakers {
            let dir = split_dir.join(self.kind.mixture_dir()).join(speaker);
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
            if self.copy_clean {
                let dir = split_dir.join("clean").join(speaker);
                std::fs::create_dir_all(&dir)
                    .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
            }
        }

        let path = self.manifest_path(split);
        std::fs::write(&path, format!("{}\n", self.kind.csv_header()))
            .with_context(|| format!("Failed to write manifest header: {}", path.display()))?;
        self.next_id.insert(split, 0);
        Ok(())
    }

    fn write_segment(&mut self, split: Split, segment: Segment<'_>) -> Result<SegmentRecord> {
        let id = self.next_id.get(&split).copied().unwrap_or(0);
        let record = record_for(id, &segment);
        let split_dir = self.root.join(split.as_str());

        let mixture_path = split_dir
            .join(self.kind.mixture_dir())
            .join(segment.speaker)
            .join(mixture_file_name(&record));
        write_wav_float(&mixture_path, segment.mixture, self.sample_rate)?;

        if self.copy_clean {
            let clean_path = split_dir
                .join("clean")
                .join(segment.speaker)
                .join(format!("{:05}.wav", id));
            write_wav_float(&clean_path, segment.clean, self.sample_rate)?;
        }

        self.append_row(split, &manifest_row(&record))?;
        self.next_id.insert(split, id + 1);
        Ok(record)
    }
}

/// Keeps segments in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<(Split, SegmentRecord)>,
    /// (mixture, clean) per record
    pub audio: Vec<(Vec<f64>, Vec<f64>)>,
    next_id: HashMap<Split, usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records_for(&self, split: Split) -> Vec<&SegmentRecord> {
        self.records.iter().filter(|(s, _)| *s == split).map(|(_, r)| r).collect()
    }
}

impl SegmentSink for MemorySink {
    fn begin_split(&mut self, split: Split, _speakers: &[String]) -> Result<()> {
        self.next_id.insert(split, 0);
        Ok(())
    }

    fn write_segment(&mut self, split: Split, segment: Segment<'_>) -> Result<SegmentRecord> {
        let id = self.next_id.get(&split).copied().unwrap_or(0);
        let record = record_for(id, &segment);
        self.records.push((split, record.clone()));
        self.audio.push((segment.mixture.to_vec(), segment.clean.to_vec()));
        self.next_id.insert(split, id + 1);
        Ok(record)
    }
}
