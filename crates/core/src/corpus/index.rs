//! Enumeration of speech, impulse-response and noise corpora on disk.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use walkdir::WalkDir;

use super::loader::decoder_for;
use super::{CorpusEntry, CorpusIndex};
use crate::error::SynthError;
use crate::types::FormatFamily;

/// One impulse-response sub-collection under the data directory.
#[derive(Debug, Clone, Copy)]
pub struct CollectionSpec {
    pub name: &'static str,
    /// Path components below the data directory
    pub root: &'static [&'static str],
    /// Required file-name suffix
    pub suffix: &'static str,
    pub recursive: bool,
    /// Overrides the extension-derived format family
    pub format: Option<FormatFamily>,
    pub resample: bool,
    /// Keep only this many files, drawn without replacement
    pub subset: Option<usize>,
    /// Path fragments of files to leave out
    pub exclude: &'static [&'static str],
}

const fn wav(name: &'static str, root: &'static [&'static str], suffix: &'static str, recursive: bool) -> CollectionSpec {
    CollectionSpec {
        name,
        root,
        suffix,
        recursive,
        format: None,
        resample: false,
        subset: None,
        exclude: &[],
    }
}

/// Impulse-response collections, in index order.
pub const RIR_COLLECTIONS: &[CollectionSpec] = &[
    wav("ACE-Challenge", &["ACE-Challenge", "Chromebook"], "RIR.wav", true),
    CollectionSpec {
        format: Some(FormatFamily::MultiChannelWav),
        ..wav("ACE-Challenge", &["ACE-Challenge", "Crucif"], "RIR.wav", true)
    },
    CollectionSpec {
        format: Some(FormatFamily::MultiChannelWav),
        ..wav("ACE-Challenge", &["ACE-Challenge", "EM32"], "RIR.wav", true)
    },
    CollectionSpec {
        format: Some(FormatFamily::MultiChannelWav),
        ..wav("ACE-Challenge", &["ACE-Challenge", "Lin8Ch"], "RIR.wav", true)
    },
    wav("ACE-Challenge", &["ACE-Challenge", "Mobile"], "RIR.wav", true),
    wav("ACE-Challenge", &["ACE-Challenge", "Single"], "RIR.wav", true),
    wav("AIR", &["AIR", "AIR_1_4", "AIR_wav_files"], ".wav", false),
    CollectionSpec {
        resample: true,
        subset: Some(1000),
        exclude: &["numClosed_26-35/IR_numClosed_28_numComb_2743_mic_4_sweep_5.wav"],
        ..wav("ARNI", &["ARNI"], ".wav", true)
    },
    wav("BRUDEX", &["BRUDEX", "rir"], ".mat", true),
    wav("dEchorate", &["dEchorate", "sofa"], ".sofa", true),
    CollectionSpec {
        format: Some(FormatFamily::MultiChannelWav),
        ..wav("DetmoldSRIR", &["DetmoldSRIR", "SetA_SingleSources", "Data"], ".wav", true)
    },
    wav("Palimpsest", &["Palimpsest"], ".wav", true),
];

/// Noise recordings below the data directory.
pub const NOISE_COLLECTION: CollectionSpec =
    wav("WHAM", &["WHAM48kHz", "high_res_wham", "audio"], ".wav", false);

fn join_all(base: &Path, parts: &[&str]) -> PathBuf {
    parts.iter().fold(base.to_path_buf(), |p, c| p.join(c))
}

/// Sorted files under `root` whose names end with `suffix`.
///
/// Hidden files are skipped. A missing root yields an empty list.
pub fn list_files(root: &Path, suffix: &str, recursive: bool) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Ok(vec![]);
    }
    let mut walker = WalkDir::new(root).min_depth(1).follow_links(true);
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if name.starts_with('.') || !name.ends_with(suffix) {
            continue;
        }
        files.push(entry.path().to_path_buf());
    }
    files.sort();
    Ok(files)
}

/// Enumerate one collection into corpus entries.
pub fn collect(data_dir: &Path, spec: &CollectionSpec, rng: &mut StdRng) -> Result<Vec<CorpusEntry>> {
    let root = join_all(data_dir, spec.root);
    if !root.is_dir() {
        log::warn!("Skipping {}: {} not found", spec.name, root.display());
        return Ok(vec![]);
    }

    let mut files = list_files(&root, spec.suffix, spec.recursive)?;
    if !spec.exclude.is_empty() {
        files.retain(|f| {
            let s = f.to_string_lossy();
            !spec.exclude.iter().any(|x| s.contains(x))
        });
    }

    if let Some(n) = spec.subset {
        if files.len() > n {
            let picked = rand::seq::index::sample(rng, files.len(), n);
            let mut subset: Vec<PathBuf> = picked.into_iter().map(|i| files[i].clone()).collect();
            subset.sort();
            files = subset;
        } else {
            log::warn!("{}: only {} files available, using all of them", spec.name, files.len());
        }
    }

    let mut entries = Vec::with_capacity(files.len());
    let mut undecodable = 0;
    for path in files {
        let format = match spec.format {
            Some(f) => f,
            None => FormatFamily::from_path(&path)?,
        };
        if !decoder_for(format).is_available() {
            undecodable += 1;
            continue;
        }
        entries.push(CorpusEntry::new(path, format, spec.name).with_resampling(spec.resample));
    }
    if undecodable > 0 {
        log::warn!(
            "Leaving out {} {} files that this build cannot decode (enable the 'hdf5-containers' feature)",
            undecodable,
            spec.name
        );
    }
    Ok(entries)
}

/// Build the impulse-response index from all known collections.
///
/// Consumes randomness only for subset selection.
pub fn build_rir_index(data_dir: &Path, rng: &mut StdRng) -> Result<CorpusIndex> {
    build_index("impulse response", data_dir, RIR_COLLECTIONS, rng)
}

/// Build the background-noise index.
pub fn build_noise_index(data_dir: &Path, rng: &mut StdRng) -> Result<CorpusIndex> {
    let noise_dir = data_dir.join(NOISE_COLLECTION.root[0]);
    if !noise_dir.is_dir() {
        return Err(SynthError::MissingDirectory(noise_dir).into());
    }
    build_index("noise", data_dir, &[NOISE_COLLECTION], rng)
}

fn build_index(name: &str, data_dir: &Path, specs: &[CollectionSpec], rng: &mut StdRng) -> Result<CorpusIndex> {
    let mut entries = Vec::new();
    for spec in specs {
        let found = collect(data_dir, spec, rng)?;
        log::debug!("{}: {} files", spec.name, found.len());
        entries.extend(found);
    }
    if entries.is_empty() {
        return Err(SynthError::EmptyCorpus(name.to_string()).into());
    }
    log::info!("Indexed {} {} files", entries.len(), name);
    Ok(CorpusIndex::new(name, entries))
}

/// Sorted speaker directory names under the speech corpus.
pub fn list_speakers(speech_dir: &Path) -> Result<Vec<String>> {
    if !speech_dir.is_dir() {
        return Err(SynthError::MissingDirectory(speech_dir.to_path_buf()).into());
    }
    let mut speakers = Vec::new();
    for entry in std::fs::read_dir(speech_dir)
        .with_context(|| format!("Failed to list {}", speech_dir.display()))?
    {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            speakers.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    speakers.sort();
    Ok(speakers)
}

/// Sorted `*.wav` files for each speaker, speakers in the given order.
pub fn list_speech_files(speech_dir: &Path, speakers: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for speaker in speakers {
        files.extend(list_files(&speech_dir.join(speaker), ".wav", false)?);
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn temp_tree(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("earsmix_index_{}_{}", name, std::process::id()));
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_list_files_filters_and_sorts() {
        let dir = temp_tree("list");
        touch(&dir.join("b/Room_RIR.wav"));
        touch(&dir.join("a/deep/Hall_RIR.wav"));
        touch(&dir.join("a/Hall_noise.wav"));
        touch(&dir.join("a/.hidden_RIR.wav"));
        touch(&dir.join("top_RIR.wav"));

        let all = list_files(&dir, "RIR.wav", true).unwrap();
        let names: Vec<String> = all.iter().map(|p| p.strip_prefix(&dir).unwrap().to_string_lossy().to_string()).collect();
        assert_eq!(names, vec!["a/deep/Hall_RIR.wav", "b/Room_RIR.wav", "top_RIR.wav"]);

        let shallow = list_files(&dir, "RIR.wav", false).unwrap();
        assert_eq!(shallow.len(), 1);

        assert!(list_files(&dir.join("missing"), ".wav", true).unwrap().is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_build_rir_index_formats_and_flags() {
        let dir = temp_tree("rir");
        touch(&dir.join("ACE-Challenge/EM32/Office_1/EM32_Office_1_1_RIR.wav"));
        touch(&dir.join("AIR/AIR_1_4/AIR_wav_files/air_booth.wav"));
        touch(&dir.join("ARNI/numClosed_0-5/IR_a.wav"));
        touch(&dir.join("ARNI/numClosed_26-35/IR_numClosed_28_numComb_2743_mic_4_sweep_5.wav"));
        touch(&dir.join("BRUDEX/rir/room1/rir_01.mat"));
        touch(&dir.join("dEchorate/sofa/room_011111.sofa"));

        let mut rng = StdRng::seed_from_u64(42);
        let index = build_rir_index(&dir, &mut rng).unwrap();
        let formats: Vec<(String, FormatFamily, bool)> = index
            .entries()
            .iter()
            .map(|e| (e.collection.clone(), e.format, e.resample))
            .collect();
        let mut expected = vec![
            ("ACE-Challenge".to_string(), FormatFamily::MultiChannelWav, false),
            ("AIR".to_string(), FormatFamily::Wav, false),
            ("ARNI".to_string(), FormatFamily::Wav, true),
        ];
        if cfg!(feature = "hdf5-containers") {
            expected.push(("BRUDEX".to_string(), FormatFamily::MatlabRir, false));
            expected.push(("dEchorate".to_string(), FormatFamily::SofaHrtf, false));
        }
        assert_eq!(formats, expected);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_containers_only_corpus_needs_feature() {
        let dir = temp_tree("containers");
        touch(&dir.join("BRUDEX/rir/room1/rir_01.mat"));
        touch(&dir.join("dEchorate/sofa/room_011111.sofa"));

        let result = build_rir_index(&dir, &mut StdRng::seed_from_u64(0));
        if cfg!(feature = "hdf5-containers") {
            assert_eq!(result.unwrap().len(), 2);
        } else {
            let err = result.unwrap_err();
            assert!(matches!(err.downcast_ref::<SynthError>(), Some(SynthError::EmptyCorpus(_))));
        }
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_arni_subset_is_reproducible() {
        let dir = temp_tree("arni");
        for i in 0..1200 {
            touch(&dir.join(format!("ARNI/set/IR_{:04}.wav", i)));
        }
        let spec = RIR_COLLECTIONS.iter().find(|s| s.name == "ARNI").unwrap();

        let a = collect(&dir, spec, &mut StdRng::seed_from_u64(42)).unwrap();
        let b = collect(&dir, spec, &mut StdRng::seed_from_u64(42)).unwrap();
        assert_eq!(a.len(), 1000);
        assert_eq!(a, b);
        let mut sorted = a.clone();
        sorted.sort_by(|x, y| x.path.cmp(&y.path));
        assert_eq!(a, sorted);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_empty_rir_corpus_is_fatal() {
        let dir = temp_tree("empty");
        let err = build_rir_index(&dir, &mut StdRng::seed_from_u64(0)).unwrap_err();
        assert!(matches!(err.downcast_ref::<SynthError>(), Some(SynthError::EmptyCorpus(_))));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_noise_dir_is_fatal() {
        let dir = temp_tree("nonoise");
        let err = build_noise_index(&dir, &mut StdRng::seed_from_u64(0)).unwrap_err();
        assert!(matches!(err.downcast_ref::<SynthError>(), Some(SynthError::MissingDirectory(_))));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_speakers_and_speech_files() {
        let dir = temp_tree("speech");
        touch(&dir.join("p002/regular_01.wav"));
        touch(&dir.join("p001/whisper_02.wav"));
        touch(&dir.join("p001/emo_anger_sentences.wav"));
        touch(&dir.join("README.txt"));

        let speakers = list_speakers(&dir).unwrap();
        assert_eq!(speakers, vec!["p001", "p002"]);

        let files = list_speech_files(&dir, &speakers).unwrap();
        let stems: Vec<String> = files.iter().map(|p| p.file_stem().unwrap().to_string_lossy().to_string()).collect();
        assert_eq!(stems, vec!["emo_anger_sentences", "whisper_02", "regular_01"]);

        assert!(list_speakers(&dir.join("nope")).is_err());
        std::fs::remove_dir_all(&dir).ok();
    }
}
