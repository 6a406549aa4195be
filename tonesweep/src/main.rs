//! tonesweep CLI
//!
//! Render every sample in the library through the circuit at every
//! gain/tone/volume setting, resuming from the last completed render.
//!
//! # Usage
//!
//! ```bash
//! # Run (or resume) the sweep
//! tonesweep
//!
//! # Smoke test: first 4 samples per setting, checkpoint untouched
//! tonesweep --debug
//!
//! # Where are we?
//! tonesweep status
//!
//! # Render one file at explicit settings
//! tonesweep single --input "Sample 3.wav" --output out.wav 0.25 0.5 0.85
//!
//! # Slice raw recordings into the sample library
//! tonesweep prepare --raw ./recordings
//!
//! # Write a default config and starter netlist
//! tonesweep init
//! ```

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tonesweep::{
    catalog::SampleCatalog,
    checkpoint::{Checkpoint, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore},
    config::SweepConfig,
    engine::{OutputLayout, RenderedOutput, SimulationEngine, SimulationFailure, SimulationJob},
    report::{self, SweepOutcome, SweepReport},
    spice::{self, NgspiceEngine},
    sweep::{self, SweepDriver, SweepObserver, SweepProgress, DEBUG_SAMPLE_LIMIT},
};

const STARTER_NETLIST: &str = include_str!("../circuits/starter.spice");

#[derive(Parser)]
#[command(name = "tonesweep")]
#[command(about = "Checkpointed gain/tone/volume sweeps through an ngspice circuit model")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to sweep config YAML
    #[arg(short, long, default_value = "tonesweep.yaml", global = true)]
    config: PathBuf,

    /// Directory of `Sample <N>.wav` inputs
    #[arg(long, global = true)]
    samples: Option<PathBuf>,

    /// Root directory for rendered output
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    /// Checkpoint file
    #[arg(long, global = true)]
    checkpoint: Option<PathBuf>,

    /// SPICE netlist template
    #[arg(long, global = true)]
    netlist: Option<PathBuf>,

    /// Only render the first 4 samples per setting; ignores the checkpoint
    #[arg(long, short = 'd', global = true)]
    debug: bool,

    /// Output JSON report path
    #[arg(long, global = true)]
    report: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run or resume the sweep (default)
    Run,

    /// Render a single file at explicit settings
    Single {
        /// Input WAV
        #[arg(long)]
        input: PathBuf,

        /// Output WAV
        #[arg(long)]
        output: PathBuf,

        gain: f64,
        tone: f64,
        volume: f64,
    },

    /// Slice raw recordings into the sample library
    Prepare {
        /// Directory of raw recordings (defaults to paths.raw)
        #[arg(long)]
        raw: Option<PathBuf>,
    },

    /// Show checkpoint and per-setting progress
    Status,

    /// Generate default config, directories and a starter netlist
    Init,

    /// Check if the simulator is available
    CheckSpice,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::Init) => init_config(&cli),
        Some(Commands::CheckSpice) => check_spice(&cli),
        Some(Commands::Single { input, output, gain, tone, volume }) => {
            single(&cli, input, output, *gain, *tone, *volume)
        }
        Some(Commands::Prepare { raw }) => prepare(&cli, raw.as_deref()),
        Some(Commands::Status) => status(&cli),
        Some(Commands::Run) | None => run_sweep(&cli),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<SweepConfig> {
    let mut config = if cli.config.exists() {
        SweepConfig::load(&cli.config)?
    } else {
        println!(
            "  {} Config {} not found, using defaults",
            "⚠".yellow(),
            cli.config.display()
        );
        SweepConfig::default_config()
    };

    if let Some(ref p) = cli.samples {
        config.paths.samples = p.clone();
    }
    if let Some(ref p) = cli.output {
        config.paths.output = p.clone();
    }
    if let Some(ref p) = cli.checkpoint {
        config.paths.checkpoint = p.clone();
    }
    if let Some(ref p) = cli.netlist {
        config.paths.netlist = p.clone();
    }

    Ok(config)
}

fn load_catalog(config: &SweepConfig) -> anyhow::Result<SampleCatalog> {
    println!(
        "{} Loading samples from {}...",
        "▶".blue(),
        config.paths.samples.display()
    );
    let catalog = SampleCatalog::load(&config.paths.samples, &config.sample_extension)?;

    for entry in catalog.rejected() {
        println!("  {} Skipping {}", "⚠".yellow(), entry);
    }
    if !catalog.rejected().is_empty() {
        println!(
            "  {} {} file(s) do not match 'Sample <N>.{}'",
            "⚠".yellow(),
            catalog.rejected().len(),
            config.sample_extension
        );
    }
    println!("  {} samples loaded", catalog.len());

    Ok(catalog)
}

/// Terminal progress for a running sweep.
struct ConsoleObserver {
    total: usize,
    completed: usize,
    unit_started: Option<Instant>,
}

impl SweepObserver for ConsoleObserver {
    fn on_resume(&mut self, start: Checkpoint, last_completed: Option<Checkpoint>, remaining: usize) {
        self.completed = self.total - remaining;
        match last_completed {
            None => println!("{} Starting from the beginning", "▶".blue()),
            Some(last) => {
                println!("{} Last completed: {}", "▶".blue(), last);
                println!("  Starting from {}", start);
            }
        }
        println!("  {} of {} units remaining\n", remaining, self.total);
    }

    fn on_unit_started(&mut self, job: &SimulationJob<'_>) {
        print!(
            "  {} [{}/{}] {} gain={} tone={} volume={}... ",
            "◦".dimmed(),
            self.completed + 1,
            self.total,
            job.sample.file_name(),
            job.gain,
            job.tone,
            job.volume
        );
        let _ = std::io::Write::flush(&mut std::io::stdout());
        self.unit_started = Some(Instant::now());
    }

    fn on_unit_completed(&mut self, _job: &SimulationJob<'_>, output: &RenderedOutput) {
        self.completed += 1;
        let secs = self.unit_started.map(|t| t.elapsed().as_secs_f64()).unwrap_or_default();
        println!("{} ({} frames, {:.1}s)", "✓".green(), output.frames, secs);
    }

    fn on_unit_failed(&mut self, _job: &SimulationJob<'_>, failure: &SimulationFailure) {
        println!("{}", "✗".red());
        println!("    {} {}", "Error:".red(), failure);
    }
}

fn run_sweep(cli: &Cli) -> anyhow::Result<()> {
    println!("{} Loading configuration...", "▶".blue());
    let config = load_config(cli)?;
    let catalog = load_catalog(&config)?;

    let engine = NgspiceEngine::new(config.simulator.clone(), &config.paths.netlist)?;
    let layout = OutputLayout::new(&config.paths.output);

    if cli.debug {
        println!(
            "{} Debug run: first {} samples per setting, checkpoint not used",
            "⚠".yellow(),
            DEBUG_SAMPLE_LIMIT
        );
        let driver = SweepDriver::new(&catalog, &config.grid, MemoryCheckpointStore::new(), engine, layout)
            .with_sample_limit(DEBUG_SAMPLE_LIMIT);
        drive(cli, driver, &catalog, &config)
    } else {
        println!("  Checkpoint: {}", config.paths.checkpoint.display());
        let store = FileCheckpointStore::new(&config.paths.checkpoint);
        let driver = SweepDriver::new(&catalog, &config.grid, store, engine, layout);
        drive(cli, driver, &catalog, &config)
    }
}

fn drive<S: CheckpointStore>(
    cli: &Cli,
    mut driver: SweepDriver<'_, S, NgspiceEngine>,
    catalog: &SampleCatalog,
    config: &SweepConfig,
) -> anyhow::Result<()> {
    // A corrupt or mismatched checkpoint stops us here, before any rendering.
    let before = driver.progress()?;

    let mut observer = ConsoleObserver {
        total: before.total_units,
        completed: before.completed_units,
        unit_started: None,
    };
    let result = driver.run(&mut observer);

    let after = driver.progress()?;
    let stats = driver.engine().stats();
    let (outcome, failure) = match &result {
        Ok(_) => (SweepOutcome::Completed, None),
        Err(e) => (SweepOutcome::Failed, Some(e.to_string())),
    };

    let report = SweepReport::new(
        outcome,
        cli.debug,
        failure,
        catalog.len(),
        config.grid.combinations(),
        after.completed_units - before.completed_units,
        after,
        stats,
        catalog
            .rejected()
            .iter()
            .map(|e| e.path.display().to_string())
            .collect(),
    );
    report.print_summary();

    if let Some(ref path) = cli.report {
        report.save_json(path)?;
        println!("Report saved to: {}", path.display());
    }

    if result.is_err() {
        if !cli.debug {
            println!(
                "Run again to retry from {}",
                after
                    .next_pending
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "the start".to_string())
            );
        }
        std::process::exit(1);
    }

    Ok(())
}

fn status(cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    let catalog = load_catalog(&config)?;
    let store = FileCheckpointStore::new(&config.paths.checkpoint);

    let radices = sweep::sweep_radices(&config.grid, catalog.len());
    let last = sweep::load_checked(&store, radices)?;
    let progress = SweepProgress::from_checkpoint(radices, last);

    println!("\n{}", "Sweep Status".bold());
    println!("{}", "─".repeat(50));
    println!("Checkpoint:     {}", config.paths.checkpoint.display());
    match progress.last_completed {
        Some(cp) => println!("Last completed: {}", cp),
        None => println!("Last completed: {}", "nothing yet".dimmed()),
    }
    match progress.next_pending {
        Some(next) => {
            let sample = catalog.get(next.sample).map(|s| s.file_name()).unwrap_or_default();
            println!("Next pending:   {} ({})", next, sample);
        }
        None => println!("Next pending:   {}", "none, sweep complete".green()),
    }
    println!(
        "Progress:       {}/{} units ({:.1}%)\n",
        progress.completed_units,
        progress.total_units,
        progress.fraction() * 100.0
    );

    report::print_settings_table(&config.grid, &progress, catalog.len());
    Ok(())
}

fn single(cli: &Cli, input: &Path, output: &Path, gain: f64, tone: f64, volume: f64) -> anyhow::Result<()> {
    let config = load_config(cli)?;

    println!("{} Rendering {} → {}", "▶".blue(), input.display(), output.display());
    let (waveform, sample_rate) = tonesweep::wav::read_wav_mono(input)?;
    let sample = tonesweep::Sample {
        index: 0,
        path: input.to_path_buf(),
        waveform,
        sample_rate,
    };

    let mut engine = NgspiceEngine::new(config.simulator.clone(), &config.paths.netlist)?;
    let job = SimulationJob {
        position: Checkpoint::ZERO,
        sample: &sample,
        gain,
        tone,
        volume,
        output_path: output.to_path_buf(),
    };

    let started = Instant::now();
    let rendered = engine.run(&job)?;
    println!(
        "{} Wrote {} ({} frames @ {} Hz, {:.1}s)",
        "✓".green(),
        rendered.path.display(),
        rendered.frames,
        rendered.sample_rate,
        started.elapsed().as_secs_f64()
    );
    Ok(())
}

fn prepare(cli: &Cli, raw: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    let raw_dir = raw.unwrap_or(config.paths.raw.as_path());

    println!(
        "{} Slicing {} into {}-second samples at {} Hz...",
        "▶".blue(),
        raw_dir.display(),
        config.prepare.chunk_secs,
        config.prepare.sample_rate
    );

    let summary = tonesweep::prepare::prepare_samples(
        raw_dir,
        &config.paths.samples,
        config.prepare.chunk_secs,
        config.prepare.sample_rate,
    )?;

    for skipped in &summary.skipped {
        println!("  {} Not a WAV, skipped: {}", "⚠".yellow(), skipped.display());
    }
    for empty in &summary.empty {
        println!("  {} No audio frames, skipped: {}", "⚠".yellow(), empty.display());
    }
    println!(
        "{} {} recordings → {} samples in {}",
        "✓".green(),
        summary.recordings,
        summary.samples_written,
        config.paths.samples.display()
    );
    Ok(())
}

fn init_config(cli: &Cli) -> anyhow::Result<()> {
    let config = SweepConfig::default_config();

    if cli.config.exists() {
        println!("{} {} already exists, leaving it alone", "⚠".yellow(), cli.config.display());
    } else {
        std::fs::write(&cli.config, config.to_yaml()?)?;
        println!("{} Created default config at: {}", "✓".green(), cli.config.display());
    }

    let paths = &config.paths;
    for dir in [&paths.samples, &paths.raw, &paths.output] {
        std::fs::create_dir_all(dir)?;
    }
    println!("{} Created directories:", "✓".green());
    println!("  • {}", paths.samples.display());
    println!("  • {}", paths.raw.display());
    println!("  • {}", paths.output.display());

    if !paths.netlist.exists() {
        if let Some(parent) = paths.netlist.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&paths.netlist, STARTER_NETLIST)?;
        println!("{} Wrote starter netlist: {}", "✓".green(), paths.netlist.display());
    }

    println!("\nEdit the config to point at your circuit, then run 'tonesweep prepare' and 'tonesweep'.");
    Ok(())
}

fn check_spice(cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    println!("{} Checking {} installation...", "▶".blue(), config.simulator.command);

    match spice::check_ngspice(&config.simulator.command) {
        Ok(version) => {
            println!("{} ngspice found: {}", "✓".green(), version);
            Ok(())
        }
        Err(e) => {
            println!("{} {}", "✗".red(), e);
            println!("\nInstall ngspice:");
            println!("  macOS:  brew install ngspice");
            println!("  Ubuntu: apt install ngspice");
            println!("  Arch:   pacman -S ngspice");
            std::process::exit(1);
        }
    }
}
