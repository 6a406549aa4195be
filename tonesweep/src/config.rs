//! YAML sweep configuration.
//!
//! # Configuration Structure
//!
//! ```yaml
//! paths:
//!   samples: tt-unprocessed
//!   raw: tt-raw-samples
//!   output: tt-processed
//!   checkpoint: last_processed.json
//!   netlist: circuits/tiny_terror.spice
//!
//! sample_extension: wav
//!
//! grid:
//!   gain: [0.25, 0.5, 0.85]
//!   tone: [0.25, 0.5, 0.85]
//!   volume: [0.25, 0.5, 0.85]
//!
//! simulator:
//!   command: ngspice
//!   output_sample_rate: 44100
//!   input_node: v_in
//!   output_node: v_out
//!   pot_total: 500K
//!   controls:
//!     gain: [XU2, XU4]
//!     tone: [XU9]
//!     volume: [XU7, XU8]
//!
//! prepare:
//!   chunk_secs: 2.0
//!   sample_rate: 44100
//! ```
//!
//! Every section except `grid` may be omitted and falls back to the values
//! above.

use crate::grid::ParameterGrid;
use crate::spice::SpiceConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

/// Potentiometer wiper positions used on every dimension by default.
pub const DEFAULT_POT_POSITIONS: [f64; 3] = [0.25, 0.50, 0.85];

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default = "default_extension")]
    pub sample_extension: String,
    pub grid: ParameterGrid,
    #[serde(default)]
    pub simulator: SpiceConfig,
    #[serde(default)]
    pub prepare: PrepareConfig,
}

/// Filesystem locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory of `Sample <N>.<ext>` inputs.
    #[serde(default = "default_samples_dir")]
    pub samples: PathBuf,
    /// Directory of unsliced recordings for `prepare`.
    #[serde(default = "default_raw_dir")]
    pub raw: PathBuf,
    /// Root of rendered output.
    #[serde(default = "default_output_dir")]
    pub output: PathBuf,
    /// Checkpoint file.
    #[serde(default = "default_checkpoint")]
    pub checkpoint: PathBuf,
    /// SPICE netlist template.
    #[serde(default = "default_netlist")]
    pub netlist: PathBuf,
}

/// Settings for slicing raw recordings into samples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareConfig {
    #[serde(default = "default_chunk_secs")]
    pub chunk_secs: f64,
    #[serde(default = "default_prepare_rate")]
    pub sample_rate: u32,
}

fn default_extension() -> String { "wav".to_string() }
fn default_samples_dir() -> PathBuf { PathBuf::from("tt-unprocessed") }
fn default_raw_dir() -> PathBuf { PathBuf::from("tt-raw-samples") }
fn default_output_dir() -> PathBuf { PathBuf::from("tt-processed") }
fn default_checkpoint() -> PathBuf { PathBuf::from("last_processed.json") }
fn default_netlist() -> PathBuf { PathBuf::from("circuits/tiny_terror.spice") }
fn default_chunk_secs() -> f64 { 2.0 }
fn default_prepare_rate() -> u32 { 44_100 }

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            samples: default_samples_dir(),
            raw: default_raw_dir(),
            output: default_output_dir(),
            checkpoint: default_checkpoint(),
            netlist: default_netlist(),
        }
    }
}

impl Default for PrepareConfig {
    fn default() -> Self {
        Self {
            chunk_secs: default_chunk_secs(),
            sample_rate: default_prepare_rate(),
        }
    }
}

impl SweepConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Three pot positions on every dimension, amp wiring from [`SpiceConfig`].
    pub fn default_config() -> Self {
        let grid = ParameterGrid::uniform(DEFAULT_POT_POSITIONS.to_vec())
            .expect("default pot positions are non-empty and finite");
        Self {
            paths: PathsConfig::default(),
            sample_extension: default_extension(),
            grid,
            simulator: SpiceConfig::default(),
            prepare: PrepareConfig::default(),
        }
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }
}
