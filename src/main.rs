use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use bard::calibration::{read_points, read_rigid_transform, write_matrix};
use bard::config::{self, ResolveOptions};
use bard::geometry::{orthogonal_procrustes, pivot_calibration};
use bard::overlay::{LatestFrameGrabber, LoggingCompositor, SyntheticFrameSource};
use bard::system::BardSystem;

/// Window size used when the configuration does not give one.
const DEFAULT_WINDOW_SIZE: (u32, u32) = (640, 480);

/// Augmented reality overlay for image guided surgery.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run tracking, registration and the overlay frame loop.
    Run {
        /// Configuration file (JSON5).
        #[arg(long)]
        config: PathBuf,

        /// Calibration directory; overrides the configuration.
        #[arg(short = 'd', long)]
        calibration_dir: Option<PathBuf>,

        /// Pointer output directory; overrides the configuration.
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Stop after this many frames.
        #[arg(long)]
        frames: Option<u64>,

        /// Frame rate of the synthetic video source.
        #[arg(long, default_value_t = 30.0)]
        fps: f64,
    },

    /// Resolve the configuration and print it as JSON.
    Check {
        #[arg(long)]
        config: PathBuf,

        #[arg(short = 'd', long)]
        calibration_dir: Option<PathBuf>,
    },

    /// Pointer tip calibration from tracking matrices of a pivoting pointer.
    Pivot {
        /// Directory of 4x4 tracking matrix files.
        #[arg(long)]
        input: PathBuf,

        /// Where to write the tip offset.
        #[arg(long)]
        output: PathBuf,
    },

    /// Point based registration of moving points onto fixed points.
    Procrustes {
        /// Fixed points, one `x y z` per line.
        #[arg(short = 'f', long)]
        fixed: PathBuf,

        /// Moving points, in the same order as the fixed points.
        #[arg(short = 'm', long)]
        moving: PathBuf,

        /// Where to write the 4x4 `fixed_T_moving` matrix.
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match Cli::parse().command {
        Command::Run {
            config,
            calibration_dir,
            output,
            frames,
            fps,
        } => run(&config, calibration_dir, output, frames, fps),
        Command::Check {
            config,
            calibration_dir,
        } => check(&config, calibration_dir),
        Command::Pivot { input, output } => pivot(&input, &output),
        Command::Procrustes {
            fixed,
            moving,
            output,
        } => procrustes(&fixed, &moving, output.as_deref()),
    }
}

fn load_config(
    path: &Path,
    calibration_dir: Option<PathBuf>,
) -> Result<config::ResolvedConfiguration> {
    let options = ResolveOptions {
        calibration_dir_override: calibration_dir,
    };
    config::load(path, &options)
        .with_context(|| format!("invalid configuration {}", path.display()))
}

fn run(
    config_path: &Path,
    calibration_dir: Option<PathBuf>,
    output: Option<PathBuf>,
    frames: Option<u64>,
    fps: f64,
) -> Result<()> {
    let config = load_config(config_path, calibration_dir)?;
    let (width, height) = config.camera.window_size.unwrap_or(DEFAULT_WINDOW_SIZE);

    let mut system = BardSystem::from_config(config, Path::new("."), output)?;
    let camera = SyntheticFrameSource::new(width, height, fps);
    let mut source = LatestFrameGrabber::start(Box::new(camera));
    let mut compositor = LoggingCompositor::default();

    let result = system.run(&mut source, &mut compositor, frames);
    source.stop();
    system.shutdown();

    let composed = result?;
    info!(frames = composed, dropped = source.frame_id().saturating_sub(composed), "done");
    Ok(())
}

fn check(config_path: &Path, calibration_dir: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path, calibration_dir)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn pivot(input: &Path, output: &Path) -> Result<()> {
    let mut paths: Vec<PathBuf> = fs::read_dir(input)
        .with_context(|| format!("failed to list {}", input.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    paths.sort();
    if paths.is_empty() {
        bail!("no tracking matrices in {}", input.display());
    }

    let poses = paths
        .iter()
        .map(|path| read_rigid_transform(path))
        .collect::<Result<Vec<_>, _>>()?;
    let result = pivot_calibration(&poses)?;
    write_matrix(output, &result.tip_offset)?;

    info!(
        poses = poses.len(),
        tip = ?result.tip_offset.as_slice(),
        pivot = ?result.pivot_point.as_slice(),
        residual_rms = result.residual_rms,
        output = %output.display(),
        "pivot calibration"
    );
    Ok(())
}

fn procrustes(fixed: &Path, moving: &Path, output: Option<&Path>) -> Result<()> {
    let fixed_points = read_points(fixed)?;
    let moving_points = read_points(moving)?;
    let result = orthogonal_procrustes(&fixed_points, &moving_points)?;
    let matrix = result.transform.to_matrix();
    let rotation = result.transform.rotation_matrix();

    info!(
        points = fixed_points.len(),
        rotation = ?rotation.as_slice(),
        translation = ?result.transform.translation.as_slice(),
        fre = result.fre,
        "point based registration"
    );
    println!("{matrix}");
    if let Some(path) = output {
        write_matrix(path, &matrix)?;
        info!(output = %path.display(), "registration written");
    }
    Ok(())
}
