use std::error::Error;
use std::path::PathBuf;

use calib_camera::config::{CalibrationConfig, TargetConfig};
use calib_camera::layout::{plan_target, render_board, LayoutPolicy, ScreenSpec};
use calib_camera::pipeline::{discover_images, CalibrationPipeline, PipelineError};
use calib_camera::report::{render_text, write_reports};
use calib_camera_core::{init_with_level, level_from_verbosity};
use clap::{Args, Parser, Subcommand};

#[cfg(feature = "tracing")]
use tracing_log::LogTracer;

/// Planar chessboard camera calibration.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON logs through `tracing`.
    #[cfg(feature = "tracing")]
    #[arg(long, global = true)]
    json_log: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Calibrate from a directory of chessboard photos.
    Calibrate(CalibrateArgs),
    /// Plan a full-screen chessboard for a display and write its target record.
    Plan(PlanArgs),
}

#[derive(Debug, Args)]
struct CalibrateArgs {
    /// Directory with .jpg/.jpeg/.png photos.
    #[arg(long)]
    images: PathBuf,

    /// Target record (chessboard_corners, chessboard_cell_size_cm, ...).
    #[arg(long)]
    target: PathBuf,

    /// Optional CalibrationConfig JSON; defaults are used if omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for calibration_results.txt and external_orientation.json.
    #[arg(long, default_value = "results")]
    out: PathBuf,

    /// View whose pose defines the reported camera position.
    #[arg(long)]
    reference_view: Option<usize>,

    /// Fewer usable views than this aborts the run.
    #[arg(long)]
    min_views: Option<usize>,

    /// Physical sensor width in millimetres.
    #[arg(long)]
    sensor_width_mm: Option<f64>,

    /// Sensor width in pixels.
    #[arg(long)]
    sensor_pixel_width: Option<f64>,
}

#[derive(Debug, Args)]
struct PlanArgs {
    /// Screen width in pixels.
    #[arg(long)]
    width: u32,

    /// Screen height in pixels.
    #[arg(long)]
    height: u32,

    /// Physical screen diagonal in inches.
    #[arg(long, default_value_t = 13.6)]
    diagonal_inch: f64,

    /// Index of the display the board is shown on.
    #[arg(long, default_value_t = 0)]
    display_index: u32,

    /// Where to write the target record.
    #[arg(long, default_value = "results/chessboard_config.json")]
    out: PathBuf,

    /// Also write a full-screen PNG of the board.
    #[arg(long)]
    image: Option<PathBuf>,
}

fn init_logging(cli: &Cli) {
    #[cfg(feature = "tracing")]
    if cli.json_log {
        let _ = LogTracer::init();
        let filter = match cli.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        calib_camera_core::init_tracing(filter, true);
        return;
    }
    let _ = init_with_level(level_from_verbosity(cli.verbose));
}

fn calibrate(args: &CalibrateArgs) -> Result<(), Box<dyn Error>> {
    let target = TargetConfig::load(&args.target)?;
    let mut config = match &args.config {
        Some(path) => CalibrationConfig::load(path)?,
        None => CalibrationConfig::default(),
    };
    if let Some(v) = args.reference_view {
        config.reference_view = v;
    }
    if let Some(n) = args.min_views {
        config.solver.min_views = n;
    }
    if let Some(w) = args.sensor_width_mm {
        config.sensor.physical_sensor_width = w;
    }
    if let Some(px) = args.sensor_pixel_width {
        config.sensor.sensor_pixel_width = px;
    }

    let pipeline = CalibrationPipeline::new(&target, config)?;
    let paths = discover_images(&args.images)?;
    if paths.is_empty() {
        return Err(PipelineError::NoImages(args.images.clone()).into());
    }
    println!(
        "Board {}x{} inner corners, cell {} cm; {} images",
        target.chessboard_corners[0],
        target.chessboard_corners[1],
        target.chessboard_cell_size_cm,
        paths.len()
    );

    let report = pipeline.run(&paths)?;
    println!("{}", render_text(&report));

    match write_reports(&report, &args.out)? {
        (text, Some(json)) => println!("wrote {} and {}", text.display(), json.display()),
        (text, None) => println!("wrote {}", text.display()),
    }
    Ok(())
}

fn plan(args: &PlanArgs) -> Result<(), Box<dyn Error>> {
    let screen = ScreenSpec {
        width_px: args.width,
        height_px: args.height,
        diagonal_inch: args.diagonal_inch,
        display_index: args.display_index,
    };
    let (target, layout) = plan_target(&screen, &LayoutPolicy::default())?;

    if let Some(parent) = args.out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    target.save(&args.out)?;
    println!("{}", serde_json::to_string_pretty(&target)?);
    println!("wrote {}", args.out.display());

    if let Some(path) = &args.image {
        render_board(&screen, &layout).save(path)?;
        println!("wrote {}", path.display());
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    let outcome = match &cli.command {
        Command::Calibrate(args) => calibrate(args),
        Command::Plan(args) => plan(args),
    };
    if let Err(err) = outcome {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
