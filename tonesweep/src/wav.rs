//! WAV file I/O.
//!
//! Input samples are read at whatever format they were recorded in and mixed
//! down to mono `f64` in `[-1, 1]`. Rendered output is always 24-bit PCM mono,
//! written through a temp file so a half-written WAV never appears under its
//! final name.

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WavError {
    #[error("WAV error in {path}: {source}")]
    Hound {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },
    #[error("IO error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("WAV header in {0} declares a sample rate of 0")]
    ZeroSampleRate(PathBuf),
}

/// Bit depth of rendered output.
pub const OUTPUT_BITS: u16 = 24;

const OUTPUT_FULL_SCALE: f64 = ((1_i32 << (OUTPUT_BITS - 1)) - 1) as f64;

fn output_spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: OUTPUT_BITS,
        sample_format: SampleFormat::Int,
    }
}

/// Read a WAV file as mono samples plus its sample rate.
pub fn read_wav_mono(path: &Path) -> Result<(Vec<f64>, u32), WavError> {
    let hound_err = |source| WavError::Hound {
        path: path.to_path_buf(),
        source,
    };

    let reader = WavReader::open(path).map_err(hound_err)?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Err(WavError::ZeroSampleRate(path.to_path_buf()));
    }
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f64> = match spec.sample_format {
        SampleFormat::Int => {
            let full_scale = (1_i64 << (spec.bits_per_sample - 1)) as f64;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f64 / full_scale))
                .collect::<Result<_, _>>()
                .map_err(hound_err)?
        }
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| s.map(f64::from))
            .collect::<Result<_, _>>()
            .map_err(hound_err)?,
    };

    let mono = if channels > 1 {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f64>() / frame.len() as f64)
            .collect()
    } else {
        interleaved
    };

    Ok((mono, spec.sample_rate))
}

/// Write `samples` as a 24-bit mono WAV, clamping to full scale.
///
/// The file is created next to `path` and renamed into place only after the
/// WAV header has been finalized.
pub fn write_wav_24(path: &Path, samples: &[f64], sample_rate: u32) -> Result<(), WavError> {
    let io_err = |source| WavError::Io {
        path: path.to_path_buf(),
        source,
    };
    let hound_err = |source| WavError::Hound {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(io_err)?;

    let tmp = NamedTempFile::new_in(&dir).map_err(io_err)?;
    {
        let mut writer =
            WavWriter::new(BufWriter::new(tmp.as_file()), output_spec(sample_rate)).map_err(hound_err)?;
        for &s in samples {
            let scaled = (s.clamp(-1.0, 1.0) * OUTPUT_FULL_SCALE).round() as i32;
            writer.write_sample(scaled).map_err(hound_err)?;
        }
        writer.finalize().map_err(hound_err)?;
    }
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

/// Linear-interpolation resample of a uniformly sampled signal.
pub fn resample_linear(input: &[f64], from_rate: u32, to_rate: u32) -> Vec<f64> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 || input.is_empty() {
        return input.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let n_out = ((input.len() as f64) / ratio).round().max(1.0) as usize;
    let last = input.len() - 1;

    (0..n_out)
        .map(|i| {
            let pos = i as f64 * ratio;
            let lo = (pos.floor() as usize).min(last);
            let hi = (lo + 1).min(last);
            let frac = pos - lo as f64;
            input[lo] + frac.min(1.0) * (input[hi] - input[lo])
        })
        .collect()
}
