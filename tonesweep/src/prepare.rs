//! Building the sample library from raw recordings.
//!
//! Each raw WAV is resampled to the library rate and cut into fixed-length
//! chunks. A recording shorter than one chunk is kept whole; longer ones
//! yield `floor(duration / chunk)` full chunks and drop the remainder. Empty
//! recordings are skipped. Chunks are numbered from 0 across all recordings,
//! visited in sorted path order, and written as `Sample <N>.wav`.

use crate::catalog::{CatalogError, SampleNamePattern};
use crate::wav::{self, WavError};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum PrepareError {
    #[error("Raw recording directory not found: {0}")]
    NotFound(PathBuf),
    #[error("Sample directory {0} already holds samples; move them aside first")]
    OutputNotEmpty(PathBuf),
    #[error("Chunk length must be positive, got {0}")]
    InvalidChunk(f64),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("Failed to scan directory: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("{0}")]
    Wav(#[from] WavError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// What `prepare_samples` did.
#[derive(Debug, Clone, Default)]
pub struct PrepareSummary {
    pub recordings: usize,
    pub samples_written: usize,
    /// Non-WAV files found in the raw directory.
    pub skipped: Vec<PathBuf>,
    /// WAV files with no audio frames.
    pub empty: Vec<PathBuf>,
}

/// Cut `signal` into `chunk_len`-sample pieces.
pub fn slice_recording(signal: &[f64], chunk_len: usize) -> Vec<Vec<f64>> {
    if chunk_len == 0 || signal.len() < chunk_len {
        return vec![signal.to_vec()];
    }
    signal
        .chunks_exact(chunk_len)
        .map(|chunk| chunk.to_vec())
        .collect()
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("wav"))
}

/// Slice every WAV under `raw_dir` into `Sample <N>.wav` files in `out_dir`.
pub fn prepare_samples(
    raw_dir: &Path,
    out_dir: &Path,
    chunk_secs: f64,
    sample_rate: u32,
) -> Result<PrepareSummary, PrepareError> {
    if !(chunk_secs > 0.0 && chunk_secs.is_finite()) {
        return Err(PrepareError::InvalidChunk(chunk_secs));
    }
    if !raw_dir.is_dir() {
        return Err(PrepareError::NotFound(raw_dir.to_path_buf()));
    }

    // Renumbering an existing library would change what checkpoints point at.
    let pattern = SampleNamePattern::new("wav")?;
    if out_dir.is_dir() {
        for entry in std::fs::read_dir(out_dir)? {
            let name = entry?.file_name();
            if name.to_str().and_then(|n| pattern.index_of(n)).is_some() {
                return Err(PrepareError::OutputNotEmpty(out_dir.to_path_buf()));
            }
        }
    }
    std::fs::create_dir_all(out_dir)?;

    let chunk_len = (chunk_secs * sample_rate as f64).round() as usize;
    let mut summary = PrepareSummary::default();
    let mut next_index: u32 = 0;

    for entry in WalkDir::new(raw_dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.into_path();
        if !is_wav(&path) {
            summary.skipped.push(path);
            continue;
        }

        let (signal, rate) = wav::read_wav_mono(&path)?;
        if signal.is_empty() {
            summary.empty.push(path);
            continue;
        }
        let signal = wav::resample_linear(&signal, rate, sample_rate);
        summary.recordings += 1;

        for chunk in slice_recording(&signal, chunk_len) {
            let name = SampleNamePattern::file_name(next_index, "wav");
            wav::write_wav_24(&out_dir.join(name), &chunk, sample_rate)?;
            next_index += 1;
            summary.samples_written += 1;
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SampleCatalog;
    use tempfile::TempDir;

    #[test]
    fn short_recording_is_kept_whole() {
        let chunks = slice_recording(&[0.1; 30], 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 30);
    }

    #[test]
    fn long_recording_drops_the_tail() {
        let chunks = slice_recording(&[0.0; 250], 100);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.len() == 100));
    }

    #[test]
    fn numbers_chunks_across_recordings() {
        let raw = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let lib = out.path().join("library");

        // 10 Hz library rate: 2 s chunks are 20 frames.
        wav::write_wav_24(&raw.path().join("a_riff.wav"), &[0.2; 45], 10).unwrap();
        wav::write_wav_24(&raw.path().join("b_chord.wav"), &[0.4; 12], 10).unwrap();
        std::fs::write(raw.path().join("readme.md"), "notes").unwrap();

        let summary = prepare_samples(raw.path(), &lib, 2.0, 10).unwrap();
        assert_eq!(summary.recordings, 2);
        assert_eq!(summary.samples_written, 3);
        assert_eq!(summary.skipped.len(), 1);

        let catalog = SampleCatalog::load(&lib, "wav").unwrap();
        let lens: Vec<usize> = catalog.samples().iter().map(|s| s.waveform.len()).collect();
        assert_eq!(lens, vec![20, 20, 12]);
        assert_eq!(catalog.get(2).unwrap().index, 2);
    }

    #[test]
    fn empty_recordings_produce_no_samples() {
        let raw = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let lib = out.path().join("library");

        wav::write_wav_24(&raw.path().join("a_silence.wav"), &[], 10).unwrap();
        wav::write_wav_24(&raw.path().join("b_riff.wav"), &[0.3; 20], 10).unwrap();

        let summary = prepare_samples(raw.path(), &lib, 2.0, 10).unwrap();
        assert_eq!(summary.recordings, 1);
        assert_eq!(summary.samples_written, 1);
        assert_eq!(summary.empty, vec![raw.path().join("a_silence.wav")]);

        let catalog = SampleCatalog::load(&lib, "wav").unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get(0).unwrap().waveform.len(), 20);
    }

    #[test]
    fn zero_rate_recording_is_an_error_not_a_panic() {
        let raw = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 0,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(raw.path().join("take.wav"), spec).unwrap();
        for _ in 0..8 {
            writer.write_sample(1_000_i16).unwrap();
        }
        writer.finalize().unwrap();

        assert!(matches!(
            prepare_samples(raw.path(), out.path(), 2.0, 10),
            Err(PrepareError::Wav(WavError::ZeroSampleRate(_)))
        ));
    }

    #[test]
    fn refuses_to_renumber_existing_library() {
        let raw = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        wav::write_wav_24(&out.path().join("Sample 0.wav"), &[0.0; 4], 10).unwrap();

        assert!(matches!(
            prepare_samples(raw.path(), out.path(), 2.0, 10),
            Err(PrepareError::OutputNotEmpty(_))
        ));
    }

    #[test]
    fn rejects_zero_chunk() {
        let raw = TempDir::new().unwrap();
        assert!(matches!(
            prepare_samples(raw.path(), raw.path(), 0.0, 10),
            Err(PrepareError::InvalidChunk(_))
        ));
    }
}
