//! Autofocus command line tool.
//!
//! Subcommands:
//! - `simulate`: run a full autofocus sequence against the simulated rig
//! - `fit`: fit recorded `offset,fwhm,stars` samples and report best focus
//! - `default-config`: write the default scan configuration as JSON

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use autofocus::{
    load_samples_csv, CurveFitter, FocusController, FocusSeries, ModelKind, ScanConfig,
    SimFrameMeasurement, ValidityGate,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use hardware::sim::{sim_rig, SimOptics, SimRigOptions};
use hardware::FocuserInterface;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "autofocus")]
#[command(about = "Scan a focuser, fit the focus curve and move to best focus")]
#[command(version)]
struct Cli {
    /// Log state transitions and per-exposure detail
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run autofocus against a simulated focuser and camera
    Simulate {
        #[command(flatten)]
        scan: ScanArgs,

        /// Absolute position of best focus in the simulated optics (ticks)
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        best_focus: i64,

        /// Focuser position before the run (ticks)
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        start: i64,

        /// FWHM at best focus (pixels)
        #[arg(long, default_value = "2.0")]
        min_fwhm: f64,

        /// FWHM growth per tick of defocus (pixels/tick)
        #[arg(long, default_value = "0.02")]
        defocus_rate: f64,

        /// Standard deviation of FWHM noise (pixels)
        #[arg(long, default_value = "0.0")]
        noise: f64,

        /// Lost motion after reversing to negative travel (ticks)
        #[arg(long, default_value = "0")]
        backlash: i64,

        /// Noise generator seed
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Write the run report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Fit recorded samples from a CSV file (header: offset,fwhm,stars)
    Fit {
        /// Sample file
        samples: PathBuf,

        #[command(flatten)]
        scan: ScanArgs,
    },

    /// Write the default scan configuration
    DefaultConfig {
        /// Output path
        #[arg(short, long, default_value = "autofocus.json")]
        output: PathBuf,
    },
}

/// Scan configuration file plus per-field overrides
#[derive(Args, Debug)]
struct ScanArgs {
    /// JSON scan configuration; defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Exposure time per frame (seconds)
    #[arg(long)]
    exposure_time: Option<f64>,

    /// Distance between scan offsets (ticks)
    #[arg(long)]
    step_size: Option<i64>,

    /// Exposures per scan
    #[arg(long)]
    attempts: Option<u32>,

    /// Scan center relative to the focuser baseline (ticks)
    #[arg(long, allow_hyphen_values = true)]
    center_offset: Option<i64>,

    /// Minimum stars for a frame to count
    #[arg(long)]
    min_stars: Option<u32>,

    /// FWHM the linear fallback solves for (pixels)
    #[arg(long)]
    target_fwhm: Option<f64>,

    /// Optimum distance from the scan mean that triggers the fallback (ticks)
    #[arg(long)]
    threshold: Option<f64>,

    /// Model fitted before any fallback
    #[arg(short, long, value_enum)]
    model: Option<ModelArg>,

    /// Focuser identifier
    #[arg(long)]
    focuser_id: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModelArg {
    Linear,
    Quadratic,
    Quartic,
}

impl From<ModelArg> for ModelKind {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::Linear => ModelKind::Linear,
            ModelArg::Quadratic => ModelKind::Quadratic,
            ModelArg::Quartic => ModelKind::Quartic,
        }
    }
}

impl ScanArgs {
    /// Load the config file (if any) and apply overrides
    fn resolve(&self) -> Result<ScanConfig> {
        let mut config = match &self.config {
            Some(path) => ScanConfig::load_from_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => ScanConfig::default(),
        };

        if let Some(v) = self.exposure_time {
            config.exposure_time_s = v;
        }
        if let Some(v) = self.step_size {
            config.step_size = v;
        }
        if let Some(v) = self.attempts {
            config.attempt_count = v;
        }
        if let Some(v) = self.center_offset {
            config.center_offset = v;
        }
        if let Some(v) = self.min_stars {
            config.min_stars = v;
        }
        if let Some(v) = self.target_fwhm {
            config.target_fwhm = v;
        }
        if let Some(v) = self.threshold {
            config.fallback_distance_threshold = Some(v);
        }
        if let Some(v) = self.model {
            config.default_model = v.into();
        }
        if let Some(v) = &self.focuser_id {
            config.focuser_id = v.clone();
        }

        config.validate().context("Invalid scan configuration")?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    match cli.command {
        Command::Simulate {
            scan,
            best_focus,
            start,
            min_fwhm,
            defocus_rate,
            noise,
            backlash,
            seed,
            report,
        } => {
            let config = scan.resolve()?;
            let optics = SimOptics {
                best_focus,
                min_fwhm,
                defocus_rate,
                fwhm_noise: noise,
                ..Default::default()
            };
            let options = SimRigOptions {
                focuser_id: config.focuser_id.clone(),
                backlash,
                seed,
                ..Default::default()
            };
            cmd_simulate(&config, optics, options, start, report.as_deref())
        }
        Command::Fit { samples, scan } => {
            let config = scan.resolve()?;
            cmd_fit(&config, &samples)
        }
        Command::DefaultConfig { output } => {
            ScanConfig::default()
                .save_to_file(&output)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("Wrote default configuration to {}", output.display());
            Ok(())
        }
    }
}

fn cmd_simulate(
    config: &ScanConfig,
    optics: SimOptics,
    options: SimRigOptions,
    start: i64,
    report_path: Option<&Path>,
) -> Result<()> {
    let best_focus = optics.best_focus;
    let (mut focuser, mut camera) = sim_rig(optics, options);
    focuser
        .set_absolute(start)
        .context("Failed to move simulated focuser to start position")?;

    info!(
        "simulating autofocus from {} (best focus at {})",
        start, best_focus
    );
    let report = FocusController::new(config, &mut focuser, &mut camera, &SimFrameMeasurement)
        .run()
        .context("Autofocus run failed")?;

    println!("Focuser:            {}", report.focuser_id);
    println!("Starting position:  {}", report.starting_position);
    println!("Passes:             {}", report.passes.len());
    println!("Fallback used:      {}", report.fallback_used());
    println!("Resolved optimum:   {:.2}", report.resolved_optimum);
    println!("Committed position: {}", report.committed_position);
    println!("Error vs truth:     {}", report.committed_position - best_focus);

    if let Some(path) = report_path {
        report
            .save_to_file(path)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        println!("Report written to {}", path.display());
    }
    Ok(())
}

fn cmd_fit(config: &ScanConfig, path: &Path) -> Result<()> {
    let rows = load_samples_csv(path)
        .with_context(|| format!("Failed to read samples from {}", path.display()))?;

    let total = rows.len();
    let series: FocusSeries = rows
        .into_iter()
        .filter(|s| {
            let usable = s.is_usable(config.min_stars);
            if !usable {
                warn!(
                    "skipping offset {} (fwhm {}, {} stars)",
                    s.offset, s.fwhm, s.star_count
                );
            }
            usable
        })
        .collect();
    if series.is_empty() {
        bail!("No usable samples among {} rows", total);
    }
    info!("fitting {} of {} samples", series.len(), total);

    let fitter = CurveFitter::new(config.target_fwhm);
    let gate = ValidityGate::from_config(config);
    let primary = fitter.fit(&series, config.default_model);
    let resolution = gate
        .resolve(&fitter, &series, primary)
        .context("No model could be fitted")?;

    if let Some(best) = series.best_sample() {
        println!(
            "Best sample:     offset {} fwhm {:.3} ({} stars)",
            best.offset, best.fwhm, best.star_count
        );
    }
    if let Some(rejected) = &resolution.rejected {
        println!(
            "Rejected:        {} optimum {:.2}",
            rejected.kind(),
            rejected.optimum
        );
    }
    let fit = &resolution.fit;
    println!(
        "Model:           {}{}",
        fit.kind(),
        if resolution.fallback { " (fallback)" } else { "" }
    );
    println!("Parameters:      {:?}", fit.parameters());
    println!("RMS residual:    {:.4}", fit.rms_residual);
    println!("Best focus:      {:.2}", fit.optimum);
    println!("Predicted FWHM:  {:.3}", fit.evaluate(fit.optimum));
    Ok(())
}
