//! Durable sweep progress.
//!
//! A [`Checkpoint`] names the most recently *completed* unit as four grid
//! positions. The file form is a flat JSON object:
//!
//! ```json
//! {"gain":1,"tone":2,"volume":0,"sample":47}
//! ```
//!
//! All four keys are required and no others are accepted. Anything else is
//! reported as [`CheckpointError::Corrupt`]; the driver never falls back to a
//! default when the record cannot be read, since that could redo or skip work.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Failed to access checkpoint {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Corrupt checkpoint {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Zero-based positions of a unit within the sweep.
///
/// Field order matches enumeration order, so the derived `Ord` is the
/// order in which units are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Checkpoint {
    pub gain: usize,
    pub tone: usize,
    pub volume: usize,
    pub sample: usize,
}

impl Checkpoint {
    pub const ZERO: Checkpoint = Checkpoint::new(0, 0, 0, 0);

    pub const fn new(gain: usize, tone: usize, volume: usize, sample: usize) -> Self {
        Self {
            gain,
            tone,
            volume,
            sample,
        }
    }

    /// Positions as digits, most significant first.
    pub fn digits(&self) -> [usize; 4] {
        [self.gain, self.tone, self.volume, self.sample]
    }

    pub fn from_digits([gain, tone, volume, sample]: [usize; 4]) -> Self {
        Self::new(gain, tone, volume, sample)
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "gain={} tone={} volume={} sample={}",
            self.gain, self.tone, self.volume, self.sample
        )
    }
}

/// Where the driver keeps its progress between runs.
pub trait CheckpointStore {
    /// The last completed unit, or `None` if the sweep has never completed one.
    fn load(&self) -> Result<Option<Checkpoint>, CheckpointError>;

    /// Replace the stored record with `checkpoint`.
    fn save(&mut self, checkpoint: Checkpoint) -> Result<(), CheckpointError>;
}

/// Checkpoint kept in a single JSON file.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> CheckpointError {
        CheckpointError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self) -> Result<Option<Checkpoint>, CheckpointError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };

        serde_json::from_str(contents.trim())
            .map(Some)
            .map_err(|source| CheckpointError::Corrupt {
                path: self.path.clone(),
                source,
            })
    }

    /// Writes a sibling temp file and renames it over the old record, so a
    /// crash mid-save leaves either the previous or the new checkpoint.
    fn save(&mut self, checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| self.io_error(e))?;

        let json = serde_json::to_string(&checkpoint).map_err(|e| self.io_error(e.into()))?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| self.io_error(e))?;
        tmp.write_all(json.as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| self.io_error(e))?;
        tmp.persist(&self.path).map_err(|e| self.io_error(e.error))?;
        Ok(())
    }
}

/// In-process store; used for debug runs so they never touch the real record.
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpointStore {
    current: Option<Checkpoint>,
    history: Vec<Checkpoint>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(checkpoint: Checkpoint) -> Self {
        Self {
            current: Some(checkpoint),
            history: Vec::new(),
        }
    }

    /// Every checkpoint saved since construction, oldest first.
    pub fn history(&self) -> &[Checkpoint] {
        &self.history
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self.current)
    }

    fn save(&mut self, checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        self.current = Some(checkpoint);
        self.history.push(checkpoint);
        Ok(())
    }
}
