//! map-fitter CLI: align a live elevation map to a reference map.

use clap::Parser;
use log::LevelFilter;
use map_fitter_core::LogFilter;
use map_fitter::{
    exhaustive_search, load_raster, FitConfig, FitReport, MatchStatistics, NullSink,
    SnapshotWriter,
};
use std::path::PathBuf;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "map-fitter")]
#[command(about = "Exhaustive rotation/translation search of a live elevation map in a reference map")]
#[command(version)]
struct Cli {
    /// Path to the JSON fit configuration.
    #[arg(long)]
    config: PathBuf,

    /// Override the report path of the configuration.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Log per-rotation progress.
    #[arg(long, short)]
    verbose: bool,

    /// Per-module log levels, e.g. `info,map_fitter::search=debug`.
    /// Takes precedence over `--verbose`.
    #[arg(long, value_name = "DIRECTIVES")]
    log_filter: Option<LogFilter>,

    /// Emit structured JSON logs (requires the `tracing` feature).
    #[arg(long)]
    json_log: bool,
}

fn init_logging(cli: &Cli) -> CliResult<()> {
    #[cfg(feature = "tracing")]
    if cli.json_log {
        map_fitter_core::init_tracing(true);
        return Ok(());
    }
    let filter = match &cli.log_filter {
        Some(filter) => filter.clone(),
        None if cli.verbose => LogFilter::new(LevelFilter::Debug),
        None => LogFilter::default(),
    };
    map_fitter_core::init_with_filter(filter)?;
    #[cfg(not(feature = "tracing"))]
    if cli.json_log {
        log::warn!("--json-log needs the `tracing` feature, using plain logs");
    }
    Ok(())
}

fn run(cli: &Cli) -> CliResult<()> {
    let config = FitConfig::load_json(&cli.config)?;
    let live = load_raster(&config.live_map)?;
    let reference = load_raster(&config.reference_map)?;

    let outcome = match &config.snapshot_dir {
        Some(dir) => {
            let mut writer = SnapshotWriter::new(dir)?;
            let outcome = exhaustive_search(&live, &reference, &config.params, &mut writer)?;
            let written = writer.finish()?;
            log::info!("wrote {written} accumulator snapshots to {}", dir.display());
            outcome
        }
        None => exhaustive_search(&live, &reference, &config.params, &mut NullSink)?,
    };

    let errors = config.ground_truth.as_ref().map(|truth| {
        let mut stats = MatchStatistics::default();
        stats.record(&outcome.poses, truth, config.params.angle_increment_deg)
    });
    if let Some(errors) = &errors {
        for (metric, error) in errors.iter() {
            if let Some(e) = error {
                log::info!(
                    "{metric}: position error {:.3}, rotation error {:.1} deg, {}",
                    e.position_error,
                    e.rotation_error_deg,
                    if e.correct { "correct" } else { "wrong" }
                );
            }
        }
    }

    let report = FitReport {
        live_map: config.live_map.clone(),
        reference_map: config.reference_map.clone(),
        params: config.params.clone(),
        outcome,
        ground_truth: config.ground_truth,
        errors,
    };
    let out = cli.out.clone().unwrap_or_else(|| config.report_path());
    report.write_json(&out)?;
    println!("wrote report JSON to {}", out.display());
    Ok(())
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;
    run(&cli)
}
