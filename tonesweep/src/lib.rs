//! # tonesweep
//!
//! Renders a library of short audio samples through a SPICE circuit model at
//! every combination of three potentiometer settings (gain, tone, volume),
//! one output WAV per combination. Runs take minutes each, so the sweep
//! checkpoints after every completed render and picks up exactly where it
//! left off after a crash or a Ctrl-C.
//!
//! ## Library Usage
//!
//! ```rust,ignore
//! use tonesweep::prelude::*;
//!
//! let config = SweepConfig::load("tonesweep.yaml")?;
//! let catalog = SampleCatalog::load(&config.paths.samples, &config.sample_extension)?;
//! let engine = NgspiceEngine::new(config.simulator.clone(), &config.paths.netlist)?;
//! let store = FileCheckpointStore::new(&config.paths.checkpoint);
//!
//! let mut driver = SweepDriver::new(
//!     &catalog,
//!     &config.grid,
//!     store,
//!     engine,
//!     OutputLayout::new(&config.paths.output),
//! );
//! let summary = driver.run(&mut ())?;
//! println!("rendered {} units", summary.dispatched);
//! ```
//!
//! ## Custom Engines
//!
//! Anything implementing [`engine::SimulationEngine`] can drive the sweep,
//! which is how the tests exercise resumption without ngspice.
//!
//! ## Module Overview
//!
//! - [`catalog`] - `Sample <N>.wav` discovery and ordering
//! - [`grid`] - gain/tone/volume levels
//! - [`checkpoint`] - durable progress record
//! - [`sweep`] - resumable enumeration and the driver
//! - [`engine`] - the simulator trait and output naming
//! - [`spice`] - ngspice implementation of the engine
//! - [`prepare`] - slicing raw recordings into the sample library
//! - [`config`] - YAML configuration
//! - [`report`] - JSON and terminal reporting
//! - [`wav`] - WAV read/write helpers

// ============================================================================
// Public modules
// ============================================================================

pub mod catalog;
pub mod checkpoint;
pub mod config;
pub mod engine;
pub mod grid;
pub mod prepare;
pub mod report;
pub mod spice;
pub mod sweep;
pub mod wav;

// ============================================================================
// Top-level re-exports for convenience
// ============================================================================

pub use catalog::{CatalogError, MalformedCatalogEntry, Sample, SampleCatalog};
pub use checkpoint::{Checkpoint, CheckpointError, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
pub use config::{ConfigError, SweepConfig};
pub use engine::{EngineStats, OutputLayout, RenderedOutput, SimulationEngine, SimulationFailure, SimulationJob};
pub use grid::{Dimension, GridError, ParameterGrid};
pub use report::{SweepOutcome, SweepReport};
pub use spice::{NgspiceEngine, SpiceConfig, SpiceError};
pub use sweep::{SweepCursor, SweepDriver, SweepError, SweepObserver, SweepPhase, SweepProgress, SweepSummary};

/// Prelude module - import everything commonly needed
///
/// ```rust
/// use tonesweep::prelude::*;
/// ```
pub mod prelude {
    pub use crate::catalog::{Sample, SampleCatalog};
    pub use crate::checkpoint::{Checkpoint, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
    pub use crate::config::SweepConfig;
    pub use crate::engine::{OutputLayout, SimulationEngine, SimulationJob};
    pub use crate::grid::{Dimension, ParameterGrid};
    pub use crate::spice::NgspiceEngine;
    pub use crate::sweep::{SweepDriver, SweepObserver, SweepProgress};
}
