//! Checkpointed sweep over `gain × tone × volume × sample`.
//!
//! Units are visited in nested order, gain outermost and sample innermost,
//! so every sample is rendered at one circuit setting before the setting
//! changes. The loop indices behave as the digits of a mixed-radix counter
//! with radices `[G, T, V, N]`; resuming is starting that counter at a given
//! value instead of zero. [`SweepCursor`] is that counter.
//!
//! The stored checkpoint names the last *completed* unit. A restart therefore
//! begins one sample past it, and a sample position equal to `N` carries into
//! the next volume level. With nothing stored the sweep starts at
//! `(0, 0, 0, 0)`.
//!
//! ```text
//! NotStarted -> Resuming(start) -> Running -> Completed
//!                                          \-> Failed
//! ```
//!
//! A process killed between units needs no special state: the next run
//! resumes from whatever the store holds.

use crate::catalog::SampleCatalog;
use crate::checkpoint::{Checkpoint, CheckpointError, CheckpointStore};
use crate::engine::{EngineStats, OutputLayout, RenderedOutput, SimulationEngine, SimulationFailure, SimulationJob};
use crate::grid::{Dimension, ParameterGrid};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sample positions visited per setting in a debug run.
pub const DEBUG_SAMPLE_LIMIT: usize = 4;

#[derive(Error, Debug)]
pub enum SweepError {
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error("Checkpoint ({checkpoint}) is outside a sweep of {radices:?} (gain, tone, volume, samples)")]
    CheckpointOutOfBounds {
        checkpoint: Checkpoint,
        radices: [usize; 4],
    },
    #[error(transparent)]
    Simulation(#[from] SimulationFailure),
}

/// Mixed-radix counter over `[gain, tone, volume, sample]` positions.
///
/// Yields every position from its start to the end of the sweep, in order.
#[derive(Debug, Clone)]
pub struct SweepCursor {
    radices: [usize; 4],
    next: Option<[usize; 4]>,
}

impl SweepCursor {
    /// Counter starting at `start` (inclusive).
    ///
    /// A sample digit equal to its radix means that setting has no samples
    /// left; the cursor moves on to the next setting.
    pub fn new(radices: [usize; 4], start: Checkpoint) -> Self {
        Self {
            radices,
            next: carry(radices, start.digits()),
        }
    }

    /// Counter positioned on the unit after `last_completed`.
    pub fn after(radices: [usize; 4], last_completed: Option<Checkpoint>) -> Self {
        Self::new(radices, resume_start(radices, last_completed))
    }

    /// The position the next call to `next` will yield.
    pub fn peek(&self) -> Option<Checkpoint> {
        self.next.map(Checkpoint::from_digits)
    }

    pub fn radices(&self) -> [usize; 4] {
        self.radices
    }

    /// Positions left to yield.
    pub fn remaining(&self) -> usize {
        match self.next {
            Some(digits) => total_units(self.radices) - ordinal(self.radices, digits),
            None => 0,
        }
    }
}

impl Iterator for SweepCursor {
    type Item = Checkpoint;

    fn next(&mut self) -> Option<Checkpoint> {
        let current = self.next?;
        let mut advanced = current;
        advanced[3] += 1;
        self.next = carry(self.radices, advanced);
        Some(Checkpoint::from_digits(current))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining();
        (n, Some(n))
    }
}

impl ExactSizeIterator for SweepCursor {}

/// Propagate overflowing digits leftwards; `None` once the sweep is exhausted.
fn carry(radices: [usize; 4], mut digits: [usize; 4]) -> Option<[usize; 4]> {
    if radices.contains(&0) {
        return None;
    }
    for i in (1..4).rev() {
        if digits[i] >= radices[i] {
            digits[i - 1] += digits[i] / radices[i];
            digits[i] %= radices[i];
        }
    }
    (digits[0] < radices[0]).then_some(digits)
}

/// Where a run starts given the last completed unit.
pub fn resume_start(radices: [usize; 4], last_completed: Option<Checkpoint>) -> Checkpoint {
    match last_completed {
        None => Checkpoint::ZERO,
        Some(cp) => Checkpoint {
            sample: (cp.sample + 1).min(radices[3]),
            ..cp
        },
    }
}

/// Total units in a sweep with these radices.
pub fn total_units(radices: [usize; 4]) -> usize {
    radices.iter().product()
}

/// Zero-based rank of `digits` in enumeration order.
fn ordinal(radices: [usize; 4], digits: [usize; 4]) -> usize {
    digits
        .iter()
        .zip(radices.iter())
        .fold(0, |acc, (&d, &r)| acc * r + d)
}

/// Radices `[G, T, V, N]` for a grid swept over `samples` samples.
pub fn sweep_radices(grid: &ParameterGrid, samples: usize) -> [usize; 4] {
    [
        grid.length_of(Dimension::Gain),
        grid.length_of(Dimension::Tone),
        grid.length_of(Dimension::Volume),
        samples,
    ]
}

/// Load the stored checkpoint, rejecting one that does not fit `radices`.
pub fn load_checked<S: CheckpointStore + ?Sized>(
    store: &S,
    radices: [usize; 4],
) -> Result<Option<Checkpoint>, SweepError> {
    match store.load()? {
        Some(checkpoint) if !in_bounds(radices, checkpoint) => {
            Err(SweepError::CheckpointOutOfBounds { checkpoint, radices })
        }
        loaded => Ok(loaded),
    }
}

/// Whether `checkpoint` fits a sweep with these radices.
pub fn in_bounds(radices: [usize; 4], checkpoint: Checkpoint) -> bool {
    checkpoint.gain < radices[0]
        && checkpoint.tone < radices[1]
        && checkpoint.volume < radices[2]
        && checkpoint.sample <= radices[3]
}

/// Lifecycle of one driver run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepPhase {
    NotStarted,
    Resuming(Checkpoint),
    Running,
    Completed,
    Failed,
}

/// Progress through the sweep as recorded by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepProgress {
    pub last_completed: Option<Checkpoint>,
    pub next_pending: Option<Checkpoint>,
    pub completed_units: usize,
    pub total_units: usize,
}

impl SweepProgress {
    pub fn from_checkpoint(radices: [usize; 4], last_completed: Option<Checkpoint>) -> Self {
        let cursor = SweepCursor::after(radices, last_completed);
        let total = total_units(radices);
        Self {
            last_completed,
            next_pending: cursor.peek(),
            completed_units: total - cursor.remaining(),
            total_units: total,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.next_pending.is_none()
    }

    pub fn fraction(&self) -> f64 {
        if self.total_units == 0 {
            1.0
        } else {
            self.completed_units as f64 / self.total_units as f64
        }
    }
}

/// Outcome of a run that reached the end of the sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepSummary {
    pub started_at: Checkpoint,
    pub dispatched: usize,
    pub last_completed: Option<Checkpoint>,
    pub total_units: usize,
    pub stats: EngineStats,
}

/// Hooks for progress reporting. All methods default to doing nothing.
pub trait SweepObserver {
    fn on_resume(&mut self, _start: Checkpoint, _last_completed: Option<Checkpoint>, _remaining: usize) {}

    fn on_unit_started(&mut self, _job: &SimulationJob<'_>) {}

    fn on_unit_completed(&mut self, _job: &SimulationJob<'_>, _output: &RenderedOutput) {}

    fn on_unit_failed(&mut self, _job: &SimulationJob<'_>, _failure: &SimulationFailure) {}
}

impl SweepObserver for () {}

/// Walks the sweep, dispatching units and checkpointing after each.
pub struct SweepDriver<'a, S, E> {
    catalog: &'a SampleCatalog,
    grid: &'a ParameterGrid,
    store: S,
    engine: E,
    layout: OutputLayout,
    sample_limit: Option<usize>,
    phase: SweepPhase,
}

impl<'a, S: CheckpointStore, E: SimulationEngine> SweepDriver<'a, S, E> {
    pub fn new(
        catalog: &'a SampleCatalog,
        grid: &'a ParameterGrid,
        store: S,
        engine: E,
        layout: OutputLayout,
    ) -> Self {
        Self {
            catalog,
            grid,
            store,
            engine,
            layout,
            sample_limit: None,
            phase: SweepPhase::NotStarted,
        }
    }

    /// Only visit the first `limit` samples of each setting.
    pub fn with_sample_limit(mut self, limit: usize) -> Self {
        self.sample_limit = Some(limit);
        self
    }

    pub fn phase(&self) -> SweepPhase {
        self.phase
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn into_parts(self) -> (S, E) {
        (self.store, self.engine)
    }

    pub fn radices(&self) -> [usize; 4] {
        let samples = match self.sample_limit {
            Some(limit) => self.catalog.len().min(limit),
            None => self.catalog.len(),
        };
        sweep_radices(self.grid, samples)
    }

    /// Read and bounds-check the stored checkpoint.
    pub fn last_completed(&self) -> Result<Option<Checkpoint>, SweepError> {
        load_checked(&self.store, self.radices())
    }

    pub fn progress(&self) -> Result<SweepProgress, SweepError> {
        Ok(SweepProgress::from_checkpoint(self.radices(), self.last_completed()?))
    }

    fn job_for(&self, position: Checkpoint) -> SimulationJob<'a> {
        let catalog: &'a SampleCatalog = self.catalog;
        let sample = &catalog.samples()[position.sample];
        let gain = self.grid.value_at(Dimension::Gain, position.gain);
        let tone = self.grid.value_at(Dimension::Tone, position.tone);
        let volume = self.grid.value_at(Dimension::Volume, position.volume);
        SimulationJob {
            position,
            sample,
            gain,
            tone,
            volume,
            output_path: self.layout.path_for(sample, gain, tone, volume),
        }
    }

    /// Run from the stored checkpoint to the end of the sweep.
    ///
    /// Stops at the first engine failure; the store still names the last
    /// unit that completed, so the next run retries the failed one.
    pub fn run(&mut self, observer: &mut dyn SweepObserver) -> Result<SweepSummary, SweepError> {
        let last_completed = match self.last_completed() {
            Ok(last) => last,
            Err(e) => {
                self.phase = SweepPhase::Failed;
                return Err(e);
            }
        };

        let radices = self.radices();
        let start = resume_start(radices, last_completed);
        let cursor = SweepCursor::new(radices, start);
        self.phase = SweepPhase::Resuming(start);
        observer.on_resume(start, last_completed, cursor.remaining());

        self.phase = SweepPhase::Running;
        let mut dispatched = 0;
        let mut last = last_completed;

        for position in cursor {
            let job = self.job_for(position);
            observer.on_unit_started(&job);

            let output = match self.engine.run(&job) {
                Ok(output) => output,
                Err(failure) => {
                    self.phase = SweepPhase::Failed;
                    observer.on_unit_failed(&job, &failure);
                    return Err(failure.into());
                }
            };
            dispatched += 1;

            if let Err(e) = self.store.save(position) {
                self.phase = SweepPhase::Failed;
                return Err(e.into());
            }
            last = Some(position);
            observer.on_unit_completed(&job, &output);
        }

        self.phase = SweepPhase::Completed;
        Ok(SweepSummary {
            started_at: start,
            dispatched,
            last_completed: last,
            total_units: total_units(radices),
            stats: self.engine.stats(),
        })
    }
}
