//! Sweep report generation and display.
//!
//! A [`SweepReport`] is built at the end of every `run`, whether the sweep
//! finished or stopped on a failure. It prints a terminal summary and can be
//! saved as JSON alongside the rendered files.
//!
//! # JSON Format
//!
//! - Timestamp and git commit (if available)
//! - Outcome (`completed` / `failed`) and the failure message
//! - Progress through the sweep and engine run counts
//! - Catalog entries that were skipped for not matching the sample pattern

use crate::engine::EngineStats;
use crate::grid::{Dimension, ParameterGrid};
use crate::sweep::SweepProgress;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepOutcome {
    Completed,
    Failed,
}

/// Full sweep report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepReport {
    pub timestamp: String,
    pub git_commit: Option<String>,
    pub outcome: SweepOutcome,
    /// Set for debug (truncated) runs.
    pub debug: bool,
    pub failure: Option<String>,
    pub samples: usize,
    pub settings: usize,
    /// Units dispatched by this run.
    pub dispatched: usize,
    pub progress: SweepProgress,
    pub engine: EngineStats,
    pub rejected_entries: Vec<String>,
}

impl SweepReport {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        outcome: SweepOutcome,
        debug: bool,
        failure: Option<String>,
        samples: usize,
        settings: usize,
        dispatched: usize,
        progress: SweepProgress,
        engine: EngineStats,
        rejected_entries: Vec<String>,
    ) -> Self {
        Self {
            timestamp: chrono_lite_timestamp(),
            git_commit: get_git_commit(),
            outcome,
            debug,
            failure,
            samples,
            settings,
            dispatched,
            progress,
            engine,
            rejected_entries,
        }
    }

    /// Save report to JSON file.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), std::io::Error> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, json)
    }

    /// Print human-readable summary to terminal.
    pub fn print_summary(&self) {
        use colored::Colorize;

        println!("\n{}", "═".repeat(60).bold());
        println!("{}", " TONESWEEP REPORT ".bold().on_blue());
        println!("{}", "═".repeat(60).bold());

        if let Some(ref commit) = self.git_commit {
            println!("Git commit: {}", commit.dimmed());
        }
        println!("Timestamp:  {}", self.timestamp.dimmed());
        println!(
            "Sweep:      {} settings × {} samples{}",
            self.settings,
            self.samples,
            if self.debug { " (debug)" } else { "" }
        );
        println!();

        println!("Total Simulations:      {}", self.engine.runs);
        println!("Successful Simulations: {}", self.engine.succeeded.to_string().green());
        println!("Failed Simulations:     {}", self.engine.failed.to_string().red());
        println!("Dispatched this run:    {}", self.dispatched);

        if let Some(last) = self.progress.last_completed {
            println!("Last completed:         {}", last);
        }

        if !self.rejected_entries.is_empty() {
            println!(
                "\n{} {} file(s) skipped in the sample directory",
                "⚠".yellow(),
                self.rejected_entries.len()
            );
        }

        println!("{}", "─".repeat(60));
        let status = match self.outcome {
            SweepOutcome::Completed => "SWEEP COMPLETE".green().bold(),
            SweepOutcome::Failed => "SWEEP STOPPED".red().bold(),
        };
        println!(
            "{} | {}/{} units ({:.1}%)",
            status,
            self.progress.completed_units,
            self.progress.total_units,
            self.progress.fraction() * 100.0
        );
        if let Some(ref failure) = self.failure {
            println!("{} {}", "Error:".red(), failure);
        }
        println!("{}\n", "═".repeat(60).bold());
    }
}

/// Per-setting progress table.
pub fn print_settings_table(grid: &ParameterGrid, progress: &SweepProgress, samples: usize) {
    use tabled::{Table, Tabled};

    #[derive(Tabled)]
    struct SettingRow {
        gain: String,
        tone: String,
        volume: String,
        #[tabled(rename = "Rendered")]
        rendered: String,
        status: String,
    }

    let mut rows = vec![];
    for (gain_idx, &gain) in grid.levels(Dimension::Gain).iter().enumerate() {
        for (tone_idx, &tone) in grid.levels(Dimension::Tone).iter().enumerate() {
            for (volume_idx, &volume) in grid.levels(Dimension::Volume).iter().enumerate() {
                let done = rendered_for(progress, samples, (gain_idx, tone_idx, volume_idx));
                let status = if done == samples {
                    "done"
                } else if done > 0 {
                    "in progress"
                } else {
                    "pending"
                };
                rows.push(SettingRow {
                    gain: gain.to_string(),
                    tone: tone.to_string(),
                    volume: volume.to_string(),
                    rendered: format!("{}/{}", done, samples),
                    status: status.to_string(),
                });
            }
        }
    }

    if !rows.is_empty() {
        println!("{}", Table::new(rows));
    }
}

/// Samples rendered for one (gain, tone, volume) position.
pub fn rendered_for(progress: &SweepProgress, samples: usize, setting: (usize, usize, usize)) -> usize {
    match progress.next_pending {
        None => samples,
        Some(next) => {
            let pending = (next.gain, next.tone, next.volume);
            if setting < pending {
                samples
            } else if setting == pending {
                next.sample
            } else {
                0
            }
        }
    }
}

/// Get a simple timestamp without pulling in chrono.
fn chrono_lite_timestamp() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}", duration.as_secs())
}

/// Try to get the current git commit hash.
fn get_git_commit() -> Option<String> {
    std::process::Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .and_then(|o| {
            if o.status.success() {
                String::from_utf8(o.stdout).ok().map(|s| s.trim().to_string())
            } else {
                None
            }
        })
}
