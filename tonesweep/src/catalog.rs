//! The ordered library of input samples.
//!
//! Samples live in a directory tree as `Sample <N>.<ext>` files. The catalog
//! walks the tree, keeps files whose names match that pattern exactly, and
//! sorts them by `N` so the order never depends on how the filesystem happens
//! to list entries. Files that do not match are skipped and returned as
//! [`MalformedCatalogEntry`] values for the caller to report.

use crate::wav::{self, WavError};
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Sample directory not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to scan sample directory: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Failed to decode sample: {0}")]
    Decode(#[from] WavError),
    #[error("Sample index {index} appears twice: {first} and {second}")]
    DuplicateIndex {
        index: u32,
        first: PathBuf,
        second: PathBuf,
    },
    #[error("Sample {0} has no audio frames")]
    EmptySample(PathBuf),
    #[error("Invalid sample extension '{0}'")]
    InvalidExtension(String),
}

/// A file in the sample directory whose name does not follow `Sample <N>.<ext>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedCatalogEntry {
    pub path: PathBuf,
}

impl fmt::Display for MalformedCatalogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "not a sample name: {}", self.path.display())
    }
}

/// One input waveform.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Number embedded in the file name.
    pub index: u32,
    pub path: PathBuf,
    pub waveform: Vec<f64>,
    pub sample_rate: u32,
}

impl Sample {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.waveform.len() as f64 / self.sample_rate as f64
    }
}

/// Matches `Sample <N>.<ext>` file names for one extension.
#[derive(Debug, Clone)]
pub struct SampleNamePattern {
    regex: Regex,
}

impl SampleNamePattern {
    pub fn new(extension: &str) -> Result<Self, CatalogError> {
        if extension.is_empty() || !extension.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CatalogError::InvalidExtension(extension.to_string()));
        }
        let regex = Regex::new(&format!(r"^Sample (\d+)\.(?i:{})$", extension))
            .map_err(|_| CatalogError::InvalidExtension(extension.to_string()))?;
        Ok(Self { regex })
    }

    /// Index embedded in `file_name`, if it matches.
    pub fn index_of(&self, file_name: &str) -> Option<u32> {
        self.regex
            .captures(file_name)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }

    /// Canonical file name for `index`.
    pub fn file_name(index: u32, extension: &str) -> String {
        format!("Sample {}.{}", index, extension)
    }
}

/// Samples sorted by index, plus whatever was skipped while loading.
#[derive(Debug, Clone, Default)]
pub struct SampleCatalog {
    samples: Vec<Sample>,
    rejected: Vec<MalformedCatalogEntry>,
}

impl SampleCatalog {
    /// Scan `dir` recursively and decode every matching sample.
    pub fn load(dir: &Path, extension: &str) -> Result<Self, CatalogError> {
        let (entries, rejected) = scan(dir, &SampleNamePattern::new(extension)?)?;

        let samples = entries
            .into_iter()
            .map(|(index, path)| {
                let (waveform, sample_rate) = wav::read_wav_mono(&path)?;
                check_playable(Sample {
                    index,
                    path,
                    waveform,
                    sample_rate,
                })
            })
            .collect::<Result<Vec<_>, CatalogError>>()?;

        Ok(Self { samples, rejected })
    }

    /// Build a catalog from already-decoded samples, sorting by index.
    pub fn from_samples(samples: Vec<Sample>) -> Result<Self, CatalogError> {
        let mut samples = samples
            .into_iter()
            .map(check_playable)
            .collect::<Result<Vec<_>, _>>()?;
        samples.sort_by_key(|s| s.index);
        if let Some(pair) = samples.windows(2).find(|w| w[0].index == w[1].index) {
            return Err(CatalogError::DuplicateIndex {
                index: pair[0].index,
                first: pair[0].path.clone(),
                second: pair[1].path.clone(),
            });
        }
        Ok(Self {
            samples,
            rejected: Vec::new(),
        })
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Sample at a sorted position (not a file-name index).
    pub fn get(&self, position: usize) -> Option<&Sample> {
        self.samples.get(position)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn rejected(&self) -> &[MalformedCatalogEntry] {
        &self.rejected
    }
}

/// Samples with no frames can never be rendered.
fn check_playable(sample: Sample) -> Result<Sample, CatalogError> {
    if sample.waveform.is_empty() {
        return Err(CatalogError::EmptySample(sample.path));
    }
    Ok(sample)
}

/// Matching paths keyed by index, and the non-matching ones.
fn scan(
    dir: &Path,
    pattern: &SampleNamePattern,
) -> Result<(BTreeMap<u32, PathBuf>, Vec<MalformedCatalogEntry>), CatalogError> {
    if !dir.is_dir() {
        return Err(CatalogError::NotFound(dir.to_path_buf()));
    }

    let mut entries: BTreeMap<u32, PathBuf> = BTreeMap::new();
    let mut rejected = Vec::new();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.into_path();
        let index = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| pattern.index_of(n));

        match index {
            Some(index) => {
                if let Some(first) = entries.get(&index) {
                    return Err(CatalogError::DuplicateIndex {
                        index,
                        first: first.clone(),
                        second: path,
                    });
                }
                entries.insert(index, path);
            }
            None => rejected.push(MalformedCatalogEntry { path }),
        }
    }

    Ok((entries, rejected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_sample(dir: &Path, name: &str, len: usize) {
        let path = dir.join(name);
        let data: Vec<f64> = (0..len).map(|i| i as f64 / len as f64).collect();
        wav::write_wav_24(&path, &data, 8000).unwrap();
    }

    #[test]
    fn pattern_extracts_index() {
        let pattern = SampleNamePattern::new("wav").unwrap();
        assert_eq!(pattern.index_of("Sample 0.wav"), Some(0));
        assert_eq!(pattern.index_of("Sample 117.WAV"), Some(117));
        assert_eq!(pattern.index_of("Sample 3.flac"), None);
        assert_eq!(pattern.index_of("sample 3.wav"), None);
        assert_eq!(pattern.index_of("Sample .wav"), None);
        assert_eq!(pattern.index_of("Old Sample 3.wav"), None);
        assert_eq!(pattern.index_of("Sample 3.wav.bak"), None);
    }

    #[test]
    fn rejects_odd_extension() {
        assert!(SampleNamePattern::new("w.v").is_err());
        assert!(SampleNamePattern::new("").is_err());
    }

    #[test]
    fn orders_numerically_not_lexically() {
        let dir = TempDir::new().unwrap();
        for i in [10, 2, 9, 1] {
            write_sample(dir.path(), &SampleNamePattern::file_name(i, "wav"), 16);
        }

        let catalog = SampleCatalog::load(dir.path(), "wav").unwrap();
        let order: Vec<u32> = catalog.samples().iter().map(|s| s.index).collect();
        assert_eq!(order, vec![1, 2, 9, 10]);
        assert_eq!(catalog.get(3).unwrap().file_name(), "Sample 10.wav");
    }

    #[test]
    fn walks_subdirectories_and_reports_strays() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("batch-2");
        std::fs::create_dir_all(&nested).unwrap();

        write_sample(dir.path(), "Sample 0.wav", 8);
        write_sample(&nested, "Sample 5.wav", 8);
        std::fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();
        std::fs::write(nested.join("Sample x.wav"), "junk").unwrap();

        let catalog = SampleCatalog::load(dir.path(), "wav").unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get(1).unwrap().index, 5);
        assert_eq!(catalog.rejected().len(), 2);
    }

    #[test]
    fn duplicate_index_is_an_error() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("again");
        std::fs::create_dir_all(&nested).unwrap();
        write_sample(dir.path(), "Sample 4.wav", 8);
        write_sample(&nested, "Sample 4.wav", 8);

        assert!(matches!(
            SampleCatalog::load(dir.path(), "wav"),
            Err(CatalogError::DuplicateIndex { index: 4, .. })
        ));
    }

    #[test]
    fn undecodable_match_is_fatal() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Sample 1.wav"), "not riff").unwrap();
        assert!(matches!(
            SampleCatalog::load(dir.path(), "wav"),
            Err(CatalogError::Decode(_))
        ));
    }

    #[test]
    fn zero_frame_sample_is_fatal() {
        let dir = TempDir::new().unwrap();
        write_sample(dir.path(), "Sample 0.wav", 8);
        write_sample(dir.path(), "Sample 1.wav", 0);

        assert!(matches!(
            SampleCatalog::load(dir.path(), "wav"),
            Err(CatalogError::EmptySample(p)) if p.ends_with("Sample 1.wav")
        ));
    }

    #[test]
    fn zero_rate_sample_is_fatal() {
        let dir = TempDir::new().unwrap();
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 0,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(dir.path().join("Sample 0.wav"), spec).unwrap();
        writer.write_sample(1_i16).unwrap();
        writer.finalize().unwrap();

        assert!(matches!(
            SampleCatalog::load(dir.path(), "wav"),
            Err(CatalogError::Decode(WavError::ZeroSampleRate(_)))
        ));
    }

    #[test]
    fn missing_directory() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            SampleCatalog::load(&dir.path().join("nope"), "wav"),
            Err(CatalogError::NotFound(_))
        ));
    }

    #[test]
    fn from_samples_sorts_and_checks_duplicates() {
        let mk = |index| Sample {
            index,
            path: PathBuf::from(format!("Sample {index}.wav")),
            waveform: vec![0.0; 4],
            sample_rate: 4,
        };
        let catalog = SampleCatalog::from_samples(vec![mk(3), mk(0)]).unwrap();
        assert_eq!(catalog.get(0).unwrap().index, 0);
        assert_eq!(catalog.get(0).unwrap().duration_secs(), 1.0);
        assert!(SampleCatalog::from_samples(vec![mk(1), mk(1)]).is_err());

        let silent = Sample { waveform: vec![], ..mk(2) };
        assert!(matches!(
            SampleCatalog::from_samples(vec![mk(0), silent]),
            Err(CatalogError::EmptySample(_))
        ));
    }
}
