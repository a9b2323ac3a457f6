//! One-shot adjustment of a forecast CSV without the desktop shell.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use pv_adjuster::adjust::{AdjustMode, AdjustmentEngine, AdjustmentParameters, PanelModel};
use pv_adjuster::config::AppConfig;
use pv_adjuster::data::loader;
use pv_adjuster::data::select::default_column;
use pv_adjuster::data::writer::PersistenceCoordinator;

#[derive(Debug, Parser)]
#[command(about = "Adjust a PV forecast column and write the result")]
struct Args {
    /// JSON configuration; its OUTPUT_CSV is the input file
    #[arg(long, conflicts_with = "input", required_unless_present = "input")]
    config: Option<PathBuf>,

    /// Forecast CSV to adjust
    #[arg(long)]
    input: Option<PathBuf>,

    /// Column to adjust (default: PV Estimate, or the configured column)
    #[arg(long)]
    column: Option<String>,

    #[arg(long, default_value_t = 1.0)]
    multiplier: f64,

    /// Panel azimuth in degrees, 180 is due south
    #[arg(long, default_value_t = 180.0)]
    azimuth: f64,

    /// Panel tilt in degrees from horizontal
    #[arg(long, default_value_t = 30.0)]
    tilt: f64,

    /// Apply the multiplier only and ignore orientation
    #[arg(long)]
    multiplier_only: bool,

    /// Write here instead of a fresh timestamped file next to the input
    #[arg(long, conflicts_with = "overwrite")]
    output: Option<PathBuf>,

    /// Replace the input file in place
    #[arg(long)]
    overwrite: bool,

    /// Print every adjusted row
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let (input, mut column, mut mode) = match (&args.config, &args.input) {
        (Some(config_path), _) => {
            let config = AppConfig::load(config_path)?;
            let settings = config.settings();
            (config.dataset_path(config_path), settings.column, settings.mode)
        }
        (None, Some(input)) => (input.clone(), None, AdjustMode::default()),
        (None, None) => bail!("either --config or --input is required"),
    };
    if args.column.is_some() {
        column = args.column.clone();
    }
    if args.multiplier_only {
        mode = AdjustMode::MultiplierOnly;
    }

    let dataset = loader::load(&input)?;
    let column = match column.or_else(|| default_column(&dataset)) {
        Some(c) => c,
        None => bail!("{} has no numeric column to adjust", input.display()),
    };

    let params = AdjustmentParameters {
        multiplier: args.multiplier,
        azimuth: args.azimuth,
        tilt: args.tilt,
    };
    let engine = AdjustmentEngine::new(PanelModel).with_mode(mode);
    let adjustment = engine
        .adjust(&dataset, &column, &params)
        .with_context(|| format!("adjusting {}", input.display()))?;

    let persistence = PersistenceCoordinator::new();
    let written = if args.overwrite {
        persistence.save_overwrite(&adjustment.dataset, &input)?
    } else {
        persistence.save(&adjustment.dataset, args.output.as_deref())?
    };

    if args.verbose {
        let timestamps = dataset.timestamps();
        for entry in &adjustment.log {
            println!(
                "{}\t{:.4}\t{:.4}",
                timestamps[entry.row_index], entry.original_value, entry.adjusted_value
            );
        }
    }
    println!(
        "Adjusted {} of {} rows of '{}' ({params}) -> {}",
        adjustment.log.len(),
        dataset.len(),
        column,
        written.display()
    );
    Ok(())
}
