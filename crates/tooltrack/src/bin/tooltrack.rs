use std::error::Error;
use std::io;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::LevelFilter;
use tooltrack::synthetic::SyntheticScene;
use tooltrack::{
    write_reports, ConsoleSink, FrameReport, MarkerGeometry, Recording, RecordingDetector,
    Tracker, TrackerConfig,
};

#[cfg(not(feature = "tracing"))]
use log::info;
#[cfg(feature = "tracing")]
use tracing::info;

/// Rigid four-point marker tool tracker.
#[derive(Debug, Parser)]
#[command(author, version, about = "Track a rigid four-point marker tool from detector output")]
struct Cli {
    /// Log level for stderr output (off, error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "info")]
    log_level: LevelFilter,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Replay a recorded detector log through the tracker.
    Replay {
        /// Recording JSON (image size plus per-frame detector boxes).
        recording: PathBuf,
        /// Optional tracker config JSON. Defaults are used if omitted.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Print one JSON report per line instead of the table.
        #[arg(long)]
        json: bool,
        /// Write the full report list to this path.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Write a synthetic recording of the reference tool moving along x.
    Synth {
        #[arg(long, default_value_t = 100)]
        frames: usize,
        /// Translation per frame (millimeters).
        #[arg(long, default_value_t = 1.0)]
        step_mm: f64,
        #[arg(long, default_value_t = 1280)]
        width: u32,
        #[arg(long, default_value_t = 720)]
        height: u32,
        /// Record a zero trigger after this frame.
        #[arg(long)]
        zero_after: Option<usize>,
        /// Output path; stdout if omitted.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    #[cfg(feature = "tracing")]
    {
        tooltrack_core::init_tracing(false);
        log::set_max_level(cli.log_level);
    }
    #[cfg(not(feature = "tracing"))]
    tooltrack_core::init_with_level(cli.log_level)?;

    match cli.command {
        Cmd::Replay {
            recording,
            config,
            json,
            output,
        } => replay(recording, config, json, output),
        Cmd::Synth {
            frames,
            step_mm,
            width,
            height,
            zero_after,
            output,
        } => synth(frames, step_mm, width, height, zero_after, output),
    }
}

fn replay(
    recording_path: PathBuf,
    config_path: Option<PathBuf>,
    json: bool,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    let config = match config_path {
        Some(path) => TrackerConfig::load_json(path)?,
        None => TrackerConfig::default(),
    };
    let recording = Recording::load_json(&recording_path)?;
    info!(
        "replaying {} frames ({}x{}) from {}",
        recording.frames.len(),
        recording.image_width,
        recording.image_height,
        recording_path.display()
    );

    let mut detector = RecordingDetector::new(config.params.min_confidence);
    let mut tracker = Tracker::new(config.params.clone())?;
    let stdout = io::stdout().lock();
    let console = if json {
        ConsoleSink::json_lines(stdout)
    } else {
        ConsoleSink::table(stdout)
    };
    let mut sink = (console, Vec::<FrameReport>::new());
    let summary = tracker.run(
        &mut recording.source(),
        &mut detector,
        &mut sink,
        &mut recording.zero_schedule(),
    )?;
    info!("{} of {} frames produced a pose", summary.poses, summary.frames);

    if let Some(path) = output.or_else(|| config.report_path()) {
        write_reports(&path, &sink.1)?;
        info!("wrote {}", path.display());
    }
    Ok(())
}

fn synth(
    frames: usize,
    step_mm: f64,
    width: u32,
    height: u32,
    zero_after: Option<usize>,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    let scene = SyntheticScene::new(width, height, MarkerGeometry::default())?;
    let mut recording = scene.translating_x(frames, step_mm);
    if let Some(frame) = zero_after.and_then(|i| recording.frames.get_mut(i)) {
        frame.zero = true;
    }

    match output {
        Some(path) => {
            recording.write_json(&path)?;
            info!("wrote {frames} synthetic frames to {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&recording)?),
    }
    Ok(())
}
