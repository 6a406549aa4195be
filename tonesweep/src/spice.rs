//! ngspice-backed [`SimulationEngine`].
//!
//! The circuit is a netlist template loaded once. Each run clones it, points
//! every potentiometer subcircuit listed in [`ControlPoints`] at the job's
//! setting, drives the input node from a PWL file, and collects the output
//! node with `wrdata`. The result is interpolated onto the output sample rate
//! and written as a 24-bit WAV.
//!
//! # Requirements
//!
//! ngspice must be installed and available in PATH (or configured with
//! `simulator.command`):
//! - macOS: `brew install ngspice`
//! - Ubuntu/Debian: `apt install ngspice`
//! - Windows: Download from ngspice.sourceforge.io
//!
//! # Template conventions
//!
//! Potentiometers are subcircuit instances whose trailing parameters are
//! replaced on every run:
//!
//! ```text
//! XU2 n3 n4 n5 pot params: Rtot=500K wiper=0.5
//! ```
//!
//! becomes `XU2 n3 n4 n5 pot params: Rtot=500K wiper=0.85` for a gain level
//! of 0.85. The template must not define the input source itself.

use crate::engine::{EngineStats, RenderedOutput, SimulationEngine, SimulationFailure, SimulationJob};
use crate::grid::Dimension;
use crate::wav::{self, WavError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpiceError {
    #[error("Simulator '{0}' not found. Install with: brew install ngspice (macOS) or apt install ngspice (Linux)")]
    NgspiceNotFound(String),
    #[error("ngspice execution failed: {0}")]
    ExecutionFailed(String),
    #[error("Failed to parse ngspice output: {0}")]
    ParseError(String),
    #[error("Netlist template not found: {0}")]
    TemplateNotFound(PathBuf),
    #[error("Component '{0}' not found in netlist template")]
    ComponentNotFound(String),
    #[error("Input waveform is empty")]
    EmptyInput,
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("{0}")]
    Wav(#[from] WavError),
    #[error("Simulation did not converge")]
    ConvergenceFailed,
}

/// Subcircuit instances driven by each dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlPoints {
    pub gain: Vec<String>,
    pub tone: Vec<String>,
    pub volume: Vec<String>,
}

impl Default for ControlPoints {
    fn default() -> Self {
        Self {
            gain: vec!["XU2".to_string(), "XU4".to_string()],
            tone: vec!["XU9".to_string()],
            volume: vec!["XU7".to_string(), "XU8".to_string()],
        }
    }
}

impl ControlPoints {
    pub fn for_dimension(&self, dimension: Dimension) -> &[String] {
        match dimension {
            Dimension::Gain => &self.gain,
            Dimension::Tone => &self.tone,
            Dimension::Volume => &self.volume,
        }
    }

    /// Wiper position for every control point, keyed by reference.
    pub fn settings(&self, gain: f64, tone: f64, volume: f64) -> BTreeMap<String, f64> {
        let mut settings = BTreeMap::new();
        for (dimension, value) in [
            (Dimension::Gain, gain),
            (Dimension::Tone, tone),
            (Dimension::Volume, volume),
        ] {
            for reference in self.for_dimension(dimension) {
                settings.insert(reference.clone(), value);
            }
        }
        settings
    }

    fn all(&self) -> impl Iterator<Item = &String> {
        self.gain.iter().chain(&self.tone).chain(&self.volume)
    }
}

/// Simulator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpiceConfig {
    /// Executable to invoke.
    #[serde(default = "default_command")]
    pub command: String,
    /// Sample rate of rendered WAVs.
    #[serde(default = "default_output_sample_rate")]
    pub output_sample_rate: u32,
    /// Node the input source drives.
    #[serde(default = "default_input_node")]
    pub input_node: String,
    /// Node recorded as the output.
    #[serde(default = "default_output_node")]
    pub output_node: String,
    /// Total resistance of every potentiometer.
    #[serde(default = "default_pot_total")]
    pub pot_total: String,
    #[serde(default)]
    pub controls: ControlPoints,
}

fn default_command() -> String { "ngspice".to_string() }
fn default_output_sample_rate() -> u32 { 44_100 }
fn default_input_node() -> String { "v_in".to_string() }
fn default_output_node() -> String { "v_out".to_string() }
fn default_pot_total() -> String { "500K".to_string() }

impl Default for SpiceConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            output_sample_rate: default_output_sample_rate(),
            input_node: default_input_node(),
            output_node: default_output_node(),
            pot_total: default_pot_total(),
            controls: ControlPoints::default(),
        }
    }
}

/// Transient length for `frames` samples at `sample_rate`.
///
/// Rounded to whole seconds; anything that would round to zero keeps its
/// exact length (at least one sample period).
pub fn transient_secs(frames: usize, sample_rate: u32) -> f64 {
    let period = 1.0 / sample_rate as f64;
    let exact = frames.saturating_sub(1) as f64 * period;
    let rounded = exact.round();
    if rounded > 0.0 {
        rounded
    } else {
        exact.max(period)
    }
}

/// A SPICE netlist held as logical lines (continuations joined).
#[derive(Debug, Clone, PartialEq)]
pub struct Netlist {
    lines: Vec<String>,
}

impl Netlist {
    pub fn parse(source: &str) -> Self {
        let mut lines: Vec<String> = Vec::new();
        for raw in source.lines() {
            let trimmed = raw.trim_end();
            match (trimmed.strip_prefix('+'), lines.last_mut()) {
                (Some(rest), Some(prev)) => {
                    prev.push(' ');
                    prev.push_str(rest.trim());
                }
                _ => lines.push(trimmed.to_string()),
            }
        }
        Self { lines }
    }

    pub fn load(path: &Path) -> Result<Self, SpiceError> {
        if !path.exists() {
            return Err(SpiceError::TemplateNotFound(path.to_path_buf()));
        }
        Ok(Self::parse(&std::fs::read_to_string(path)?))
    }

    fn find(&self, reference: &str) -> Option<usize> {
        self.lines.iter().position(|line| {
            line.split_whitespace()
                .next()
                .is_some_and(|first| first.eq_ignore_ascii_case(reference))
        })
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.find(reference).is_some()
    }

    /// Replace the parameter assignments of instance `reference` with `value`.
    ///
    /// Everything up to the first `params:` keyword or `key=value` token is
    /// kept (name, nodes, subcircuit), the rest is dropped.
    pub fn set_component_value(&mut self, reference: &str, value: &str) -> Result<(), SpiceError> {
        let idx = self
            .find(reference)
            .ok_or_else(|| SpiceError::ComponentNotFound(reference.to_string()))?;

        let kept: Vec<&str> = self.lines[idx]
            .split_whitespace()
            .take_while(|tok| !tok.contains('=') && !tok.eq_ignore_ascii_case("params:"))
            .collect();
        self.lines[idx] = format!("{} {}", kept.join(" "), value);
        Ok(())
    }

    pub fn render(&self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }
}

/// Check if ngspice is available.
pub fn check_ngspice(command: &str) -> Result<String, SpiceError> {
    let output = Command::new(command)
        .arg("--version")
        .output()
        .map_err(|_| SpiceError::NgspiceNotFound(command.to_string()))?;

    if output.status.success() {
        let version = String::from_utf8_lossy(&output.stdout);
        let version_line = version
            .lines()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("unknown");
        Ok(version_line.trim().to_string())
    } else {
        Err(SpiceError::NgspiceNotFound(command.to_string()))
    }
}

/// Drives ngspice in batch mode against one netlist template.
pub struct NgspiceEngine {
    config: SpiceConfig,
    template: Netlist,
    stats: EngineStats,
}

impl NgspiceEngine {
    /// Load the template once and check that every control point exists in it.
    pub fn new(config: SpiceConfig, template_path: &Path) -> Result<Self, SpiceError> {
        let template = Netlist::load(template_path)?;
        Self::with_template(config, template)
    }

    pub fn with_template(config: SpiceConfig, template: Netlist) -> Result<Self, SpiceError> {
        if let Some(missing) = config.controls.all().find(|r| !template.contains(r)) {
            return Err(SpiceError::ComponentNotFound(missing.clone()));
        }
        Ok(Self {
            config,
            template,
            stats: EngineStats::default(),
        })
    }

    pub fn config(&self) -> &SpiceConfig {
        &self.config
    }

    /// Build the full netlist for one run.
    pub fn prepare_netlist(
        &self,
        settings: &BTreeMap<String, f64>,
        pwl_path: &Path,
        timestep: f64,
        duration: f64,
        output_file: &Path,
    ) -> Result<String, SpiceError> {
        let mut circuit = self.template.clone();
        for (reference, wiper) in settings {
            circuit.set_component_value(
                reference,
                &format!("params: Rtot={} wiper={}", self.config.pot_total, wiper),
            )?;
        }

        Ok(format!(
            r#"* tonesweep run
{circuit_body}
* Input source driven by PWL file
VIN_SWEEP {input_node} 0 PWL file="{pwl_path}"

.OPTIONS SEED=42
.TRAN {timestep:.12e} {duration:.12e} 0 {timestep:.12e}

.CONTROL
  set filetype=ascii
  set wr_singlescale
  run
  wrdata {output_file} {output_node}
  quit
.ENDC

.END
"#,
            circuit_body = strip_end(&circuit.render()),
            input_node = self.config.input_node,
            pwl_path = pwl_path.display(),
            timestep = timestep,
            duration = duration,
            output_file = output_file.display(),
            output_node = self.config.output_node,
        ))
    }

    /// Run one simulation and return the output at `output_sample_rate`.
    pub fn simulate(
        &self,
        input: &[f64],
        input_rate: u32,
        settings: &BTreeMap<String, f64>,
    ) -> Result<Vec<f64>, SpiceError> {
        if input.is_empty() {
            return Err(SpiceError::EmptyInput);
        }

        let tmpdir = TempDir::new()?;
        let pwl_path = tmpdir.path().join("input.pwl");
        let netlist_path = tmpdir.path().join("circuit.spice");
        let output_path = tmpdir.path().join("output.txt");

        write_pwl_file(input, input_rate, &pwl_path)?;

        let duration = transient_secs(input.len(), input_rate);
        let timestep = 1.0 / input_rate.max(self.config.output_sample_rate) as f64;
        let netlist = self.prepare_netlist(settings, &pwl_path, timestep, duration, &output_path)?;
        std::fs::write(&netlist_path, &netlist)?;

        let result = Command::new(&self.config.command)
            .arg("-b")
            .arg(&netlist_path)
            .output()
            .map_err(|_| SpiceError::NgspiceNotFound(self.config.command.clone()))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            if stderr.contains("no convergence") || stderr.contains("timestep too small") {
                return Err(SpiceError::ConvergenceFailed);
            }
            return Err(SpiceError::ExecutionFailed(stderr.to_string()));
        }

        if !output_path.exists() {
            return Err(SpiceError::ExecutionFailed(
                "ngspice did not produce output file".to_string(),
            ));
        }

        let raw = parse_wrdata_output(&std::fs::read_to_string(&output_path)?)?;
        Ok(resample_uniform(&raw, duration, self.config.output_sample_rate))
    }

    fn render(&self, job: &SimulationJob<'_>) -> Result<RenderedOutput, SpiceError> {
        let settings = self.config.controls.settings(job.gain, job.tone, job.volume);
        let output = self.simulate(&job.sample.waveform, job.sample.sample_rate, &settings)?;
        wav::write_wav_24(&job.output_path, &output, self.config.output_sample_rate)?;
        Ok(RenderedOutput {
            path: job.output_path.clone(),
            frames: output.len(),
            sample_rate: self.config.output_sample_rate,
        })
    }
}

impl SimulationEngine for NgspiceEngine {
    fn run(&mut self, job: &SimulationJob<'_>) -> Result<RenderedOutput, SimulationFailure> {
        let result = self.render(job);
        self.stats.record(&result);
        result.map_err(|e| SimulationFailure::new(job, e))
    }

    fn stats(&self) -> EngineStats {
        self.stats
    }
}

fn strip_end(s: &str) -> &str {
    s.trim_end_matches('\n')
}

/// Write input signal as PWL (piecewise-linear) file.
fn write_pwl_file(signal: &[f64], sample_rate: u32, path: &Path) -> Result<(), SpiceError> {
    let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
    let dt = 1.0 / sample_rate as f64;

    for (i, &sample) in signal.iter().enumerate() {
        writeln!(file, "{:.12e} {:.12e}", i as f64 * dt, sample)?;
    }
    file.flush()?;

    Ok(())
}

/// Parse wrdata output (time, value columns).
fn parse_wrdata_output(contents: &str) -> Result<Vec<(f64, f64)>, SpiceError> {
    let mut data = Vec::new();

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('*') || line.starts_with('#') {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() >= 2 {
            let t: f64 = parts[0]
                .parse()
                .map_err(|e| SpiceError::ParseError(format!("Invalid time value: {}", e)))?;
            let v: f64 = parts[1]
                .parse()
                .map_err(|e| SpiceError::ParseError(format!("Invalid voltage value: {}", e)))?;
            data.push((t, v));
        }
    }

    if data.is_empty() {
        return Err(SpiceError::ParseError("No data points found".to_string()));
    }

    Ok(data)
}

/// Interpolate SPICE's adaptive-timestep output onto a uniform grid.
fn resample_uniform(raw: &[(f64, f64)], duration: f64, sample_rate: u32) -> Vec<f64> {
    let n = (duration * sample_rate as f64).round().max(1.0) as usize;
    (0..n)
        .map(|i| interpolate(raw, i as f64 / sample_rate as f64))
        .collect()
}

/// Linear interpolation at time t.
fn interpolate(data: &[(f64, f64)], t: f64) -> f64 {
    let (first, last) = match (data.first(), data.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return 0.0,
    };
    if t <= first.0 {
        return first.1;
    }
    if t >= last.0 {
        return last.1;
    }

    // Binary search for bracket
    let mut lo = 0;
    let mut hi = data.len() - 1;
    while hi - lo > 1 {
        let mid = (lo + hi) / 2;
        if data[mid].0 <= t {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    let (t0, v0) = data[lo];
    let (t1, v1) = data[hi];
    let alpha = (t - t0) / (t1 - t0);
    v0 + alpha * (v1 - v0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = "\
* Tiny amp
R1 v_in n1 10k
XU2 n1 n2 0 pot params: Rtot=500K wiper=0.5
XU9 n2 n3 0 pot
+ Rtot=500K wiper=0.5
XU7 n3 v_out 0 pot Rtot=500K wiper=0.5
.subckt pot a w b Rtot=500K wiper=0.5
.ends pot
";

    fn one_per_dimension() -> SpiceConfig {
        SpiceConfig {
            controls: ControlPoints {
                gain: vec!["XU2".into()],
                tone: vec!["XU9".into()],
                volume: vec!["XU7".into()],
            },
            ..SpiceConfig::default()
        }
    }

    #[test]
    fn config_defaults_match_amp_wiring() {
        let config = SpiceConfig::default();
        assert_eq!(config.command, "ngspice");
        assert_eq!(config.output_sample_rate, 44_100);
        assert_eq!(config.pot_total, "500K");
        assert_eq!(config.controls.for_dimension(Dimension::Gain), ["XU2", "XU4"]);
        assert_eq!(config.controls.for_dimension(Dimension::Volume), ["XU7", "XU8"]);
    }

    #[test]
    fn settings_fan_out_to_every_control_point() {
        let settings = ControlPoints::default().settings(0.25, 0.5, 0.85);
        assert_eq!(settings.len(), 5);
        assert_eq!(settings["XU4"], 0.25);
        assert_eq!(settings["XU9"], 0.5);
        assert_eq!(settings["XU8"], 0.85);
    }

    #[test]
    fn continuation_lines_are_joined() {
        let netlist = Netlist::parse(TEMPLATE);
        assert!(netlist.render().contains("XU9 n2 n3 0 pot Rtot=500K wiper=0.5\n"));
    }

    #[test]
    fn component_value_replaces_params() {
        let mut netlist = Netlist::parse(TEMPLATE);
        netlist.set_component_value("XU2", "params: Rtot=500K wiper=0.85").unwrap();
        netlist.set_component_value("xu7", "params: Rtot=500K wiper=0.25").unwrap();

        let text = netlist.render();
        assert!(text.contains("XU2 n1 n2 0 pot params: Rtot=500K wiper=0.85\n"), "{text}");
        assert!(text.contains("XU7 n3 v_out 0 pot params: Rtot=500K wiper=0.25\n"), "{text}");
        // The subcircuit definition is not an instance and stays put.
        assert!(text.contains(".subckt pot a w b Rtot=500K wiper=0.5"));
    }

    #[test]
    fn unknown_component_is_reported() {
        let mut netlist = Netlist::parse(TEMPLATE);
        assert!(matches!(
            netlist.set_component_value("XU99", "wiper=1"),
            Err(SpiceError::ComponentNotFound(_))
        ));
    }

    #[test]
    fn engine_checks_controls_against_template() {
        let template = Netlist::parse(TEMPLATE);
        assert!(NgspiceEngine::with_template(one_per_dimension(), template.clone()).is_ok());
        // Default wiring also expects XU4 and XU8.
        assert!(matches!(
            NgspiceEngine::with_template(SpiceConfig::default(), template),
            Err(SpiceError::ComponentNotFound(r)) if r == "XU4"
        ));
    }

    #[test]
    fn prepared_netlist_sets_wipers_and_source() {
        let engine = NgspiceEngine::with_template(one_per_dimension(), Netlist::parse(TEMPLATE)).unwrap();
        let settings = engine.config().controls.settings(0.85, 0.25, 0.5);
        let text = engine
            .prepare_netlist(
                &settings,
                Path::new("/tmp/in.pwl"),
                1.0 / 44_100.0,
                2.0,
                Path::new("/tmp/out.txt"),
            )
            .unwrap();

        assert!(text.contains("XU2 n1 n2 0 pot params: Rtot=500K wiper=0.85"));
        assert!(text.contains("XU9 n2 n3 0 pot params: Rtot=500K wiper=0.25"));
        assert!(text.contains("XU7 n3 v_out 0 pot params: Rtot=500K wiper=0.5"));
        assert!(text.contains("VIN_SWEEP v_in 0 PWL file=\"/tmp/in.pwl\""));
        assert!(text.contains("wrdata /tmp/out.txt v_out"));
        assert!(text.trim_end().ends_with(".END"));
    }

    #[test]
    fn transient_rounds_to_whole_seconds() {
        assert_eq!(transient_secs(88_200, 44_100), 2.0);
        assert_eq!(transient_secs(100_000, 44_100), 2.0);
        let short = transient_secs(4_410, 44_100);
        assert!((short - 4_409.0 / 44_100.0).abs() < 1e-12);
        assert_eq!(transient_secs(1, 1000), 0.001);
    }

    #[test]
    fn wrdata_parsing_skips_comments() {
        let data = parse_wrdata_output("* header\n\n0.0 0.1\n1.0e-3 0.2\n").unwrap();
        assert_eq!(data, vec![(0.0, 0.1), (1.0e-3, 0.2)]);
        assert!(parse_wrdata_output("* nothing\n").is_err());
        assert!(parse_wrdata_output("abc 1.0\n").is_err());
    }

    #[test]
    fn interpolation_works() {
        let data = vec![(0.0, 0.0), (1.0, 10.0), (2.0, 20.0)];

        assert!((interpolate(&data, 0.5) - 5.0).abs() < 1e-10);
        assert!((interpolate(&data, 1.5) - 15.0).abs() < 1e-10);
        assert_eq!(interpolate(&data, 5.0), 20.0);
    }

    #[test]
    fn uniform_resample_covers_duration() {
        let data = vec![(0.0, 0.0), (1.0, 1.0)];
        let out = resample_uniform(&data, 1.0, 10);
        assert_eq!(out.len(), 10);
        assert!((out[5] - 0.5).abs() < 1e-10);
    }

    #[test]
    fn empty_input_is_rejected_before_spawning() {
        let engine = NgspiceEngine::with_template(one_per_dimension(), Netlist::parse(TEMPLATE)).unwrap();
        assert!(matches!(
            engine.simulate(&[], 44_100, &BTreeMap::new()),
            Err(SpiceError::EmptyInput)
        ));
    }
}
