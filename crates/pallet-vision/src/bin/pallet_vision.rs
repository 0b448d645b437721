//! pallet-vision CLI: calibrate the floor plane, run the coordinate
//! pipeline over frames, measure a reference object.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use nalgebra::Point2;
#[cfg(not(feature = "tracing"))]
use pallet_vision::core::init_with_level;
use pallet_vision::core::verbosity_level;
use pallet_vision::{
    measure_object, CalibrationEngine, CalibrationRecord, ImageSequence, PalletVisionConfig,
    DEFAULT_CALIBRATION_PATH,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "pallet-vision")]
#[command(about = "Locate pallets in an overhead camera view and send robot coordinates")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute and store the floor homography from four picked corners.
    Calibrate(CalibrateArgs),

    /// Process frames and dispatch corrected pallet coordinates.
    Run(RunArgs),

    /// Measure the largest object in an image on the calibration plane.
    Measure(MeasureArgs),
}

#[derive(Debug, Clone, Args)]
struct CalibrateArgs {
    /// Corner pixel as `x,y`; give four, top-left, top-right, bottom-right, bottom-left.
    #[arg(long = "point", value_parser = parse_point, required = true)]
    points: Vec<Point2<f64>>,

    /// Where to write the calibration [default: the config's calibration
    /// path, else data/calibration/homography.json].
    #[arg(long)]
    out: Option<PathBuf>,

    /// Side of the calibration square, millimeters [default: 1000].
    #[arg(long)]
    plane_size_mm: Option<f64>,

    /// Session configuration supplying calibration settings.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct RunArgs {
    /// Session configuration (JSON).
    #[arg(long)]
    config: PathBuf,

    /// Image file or directory of frames, processed in file-name order.
    #[arg(long)]
    frames: PathBuf,

    /// Override the configured pallet height, meters.
    #[arg(long)]
    pallet_height_m: Option<f64>,
}

#[derive(Debug, Clone, Args)]
struct MeasureArgs {
    /// Image of an object lying flat on the floor.
    #[arg(long)]
    image: PathBuf,

    /// Stored calibration.
    #[arg(long, default_value = DEFAULT_CALIBRATION_PATH)]
    calibration: PathBuf,

    /// Known object width, millimeters, to report the error against.
    #[arg(long)]
    true_width_mm: Option<f64>,

    /// Session configuration; only its detector settings are used.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn parse_point(s: &str) -> Result<Point2<f64>, String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected `x,y`, got `{s}`"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<f64>()
            .map_err(|e| format!("bad coordinate `{v}`: {e}"))
    };
    Ok(Point2::new(parse(x)?, parse(y)?))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CliResult<()> {
    #[cfg(feature = "tracing")]
    pallet_vision::core::init_tracing(verbosity_level(cli.verbose), false);
    #[cfg(not(feature = "tracing"))]
    init_with_level(verbosity_level(cli.verbose))?;

    match cli.command {
        Commands::Calibrate(args) => run_calibrate(&args),
        Commands::Run(args) => run_pipeline(&args),
        Commands::Measure(args) => run_measure(&args),
    }
}

// ── calibrate ──────────────────────────────────────────────────────────

fn run_calibrate(args: &CalibrateArgs) -> CliResult<()> {
    let (mut engine, default_out) = match &args.config {
        Some(path) => {
            let config = PalletVisionConfig::load_json(path)?;
            (config.calibration.engine(), config.calibration.path)
        }
        None => (
            CalibrationEngine::default(),
            PathBuf::from(DEFAULT_CALIBRATION_PATH),
        ),
    };
    if let Some(size) = args.plane_size_mm {
        engine.plane_size_mm = size;
    }
    let out = args.out.clone().unwrap_or(default_out);

    let record = engine.calibrate(&args.points, &out)?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    eprintln!("calibration written to {}", out.display());
    Ok(())
}

// ── run ────────────────────────────────────────────────────────────────

fn run_pipeline(args: &RunArgs) -> CliResult<()> {
    let config = PalletVisionConfig::load_json(&args.config)?;
    let mut pipeline = config.build_pipeline()?;
    if let Some(h) = args.pallet_height_m {
        pipeline.set_assumed_pallet_height(h)?;
    }

    let frames = ImageSequence::open(&args.frames)?;
    let summary = pipeline.run(frames);
    eprintln!(
        "frames: {}, detections: {}, unmappable: {}, dispatched: {}, dispatch failures: {}",
        summary.frames,
        summary.detections,
        summary.unmappable,
        summary.dispatched,
        summary.dispatch_failures
    );
    Ok(())
}

// ── measure ────────────────────────────────────────────────────────────

fn run_measure(args: &MeasureArgs) -> CliResult<()> {
    let record = CalibrationRecord::load_json(&args.calibration)?;
    let params = match &args.config {
        Some(path) => PalletVisionConfig::load_json(path)?.detector,
        None => Default::default(),
    };
    let gray = image::open(&args.image)?.to_luma8();
    let m = measure_object(&gray, &record.homography(), &params, args.true_width_mm)?;
    println!("{}", serde_json::to_string_pretty(&m)?);
    Ok(())
}
