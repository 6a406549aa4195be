//! The simulator seam.
//!
//! The sweep driver only knows about [`SimulationEngine`]: hand it a
//! [`SimulationJob`], get back the rendered file or a [`SimulationFailure`].
//! [`crate::spice::NgspiceEngine`] is the real implementation; tests plug in
//! fakes that answer instantly.

use crate::catalog::Sample;
use crate::checkpoint::Checkpoint;
use crate::grid::Dimension;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// One unit of work: a sample rendered at one (gain, tone, volume) setting.
#[derive(Debug, Clone)]
pub struct SimulationJob<'a> {
    /// Grid position of this unit.
    pub position: Checkpoint,
    pub sample: &'a Sample,
    pub gain: f64,
    pub tone: f64,
    pub volume: f64,
    pub output_path: PathBuf,
}

impl SimulationJob<'_> {
    pub fn setting(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Gain => self.gain,
            Dimension::Tone => self.tone,
            Dimension::Volume => self.volume,
        }
    }
}

/// A rendered output file.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedOutput {
    pub path: PathBuf,
    pub frames: usize,
    pub sample_rate: u32,
}

/// The engine could not render a unit.
#[derive(Error, Debug)]
#[error("simulation of {sample} at {position} failed: {source}")]
pub struct SimulationFailure {
    pub position: Checkpoint,
    pub sample: PathBuf,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

impl SimulationFailure {
    pub fn new(job: &SimulationJob<'_>, source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self {
            position: job.position,
            sample: job.sample.path.clone(),
            source: source.into(),
        }
    }
}

/// Aggregate run counts over the engine's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub runs: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl EngineStats {
    pub fn record<T, E>(&mut self, result: &Result<T, E>) {
        self.runs += 1;
        match result {
            Ok(_) => self.succeeded += 1,
            Err(_) => self.failed += 1,
        }
    }
}

/// A circuit simulator configured once and run repeatedly.
///
/// `run` blocks until the output is fully written. Implementations are not
/// expected to be safe to drive from more than one sweep at a time.
pub trait SimulationEngine {
    fn run(&mut self, job: &SimulationJob<'_>) -> Result<RenderedOutput, SimulationFailure>;

    fn stats(&self) -> EngineStats;
}

impl<E: SimulationEngine + ?Sized> SimulationEngine for &mut E {
    fn run(&mut self, job: &SimulationJob<'_>) -> Result<RenderedOutput, SimulationFailure> {
        (**self).run(job)
    }

    fn stats(&self) -> EngineStats {
        (**self).stats()
    }
}

/// Where rendered files go.
///
/// `<root>/g{gain}_t{tone}_v{volume}/Processed_{index}_Gain-{gain}_Tone-{tone}_Volume-{volume}.wav`
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder holding every sample for one setting.
    pub fn setting_dir(&self, gain: f64, tone: f64, volume: f64) -> PathBuf {
        self.root.join(format!("g{}_t{}_v{}", gain, tone, volume))
    }

    pub fn path_for(&self, sample: &Sample, gain: f64, tone: f64, volume: f64) -> PathBuf {
        self.setting_dir(gain, tone, volume).join(format!(
            "Processed_{}_Gain-{}_Tone-{}_Volume-{}.wav",
            sample.index, gain, tone, volume
        ))
    }
}
