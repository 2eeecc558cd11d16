//! signald - adaptive traffic signal controller
//!
//! Runs one signal cycle for one lane:
//! 1. Counts vehicles in the ROI during the red analysis window
//! 2. Picks red/green durations from the weighted count
//! 3. Drives the signal (serial actuator, if configured) through RED, GREEN, OFF
//! 4. Writes the annotated cycle as raw RGB video plus a JSON run report

use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use adaptive_signal::ui::Ui;
use adaptive_signal::{
    resolve_frame_rate, Actuator, DetectorBackend, FileConfig, FileSource, FrameSink,
    FrameSource, NullSink, RawVideoSink, ReplayBackend, RunReport, SerialActuator, SignalConfig,
    SignalController, StubBackend,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Lane video (local path) or `stub://label` for a synthetic source.
    #[arg(long, env = "SIGNAL_SOURCE", default_value = "stub://lane1")]
    source: String,

    /// Tracked detections for the source, one JSON object per frame.
    #[arg(long, env = "SIGNAL_DETECTIONS")]
    detections: Option<PathBuf>,

    /// Directory for the annotated video, manifest and run report.
    #[arg(long, default_value = "signal_out")]
    out_dir: PathBuf,

    /// Frame rate for phase timing; overrides the source's reported rate.
    #[arg(long)]
    fps: Option<f64>,

    /// Serial device of the signal controller.
    #[arg(long)]
    serial_device: Option<PathBuf>,

    /// Skip writing the annotated video.
    #[arg(long)]
    no_video: bool,

    /// Disable progress output.
    #[arg(long)]
    no_progress: bool,

    /// Progress style: auto, plain or pretty.
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = SignalConfig::load()?;
    if let Some(fps) = args.fps {
        cfg.fps = Some(fps);
    }
    if let Some(device) = &args.serial_device {
        cfg.actuator.serial_device = Some(device.clone());
    }

    let mut source = FileSource::new(FileConfig {
        path: args.source.clone(),
        ..FileConfig::default()
    })?;
    source.connect()?;
    let fps = resolve_frame_rate(cfg.fps, source.fps())?;
    let (width, height) = source.dimensions();
    log::info!(
        "{}: source {} ({}x{}), timing at {} fps",
        cfg.lane_name,
        args.source,
        width,
        height,
        fps
    );

    let mut detector: Box<dyn DetectorBackend> = match &args.detections {
        Some(path) => Box::new(ReplayBackend::open(path)?),
        None => {
            log::warn!("no detections supplied, every frame will count zero vehicles");
            Box::new(StubBackend::default())
        }
    };

    let stem = format!("traffic_output_{}", unix_secs());
    let mut sink: Box<dyn FrameSink> = if args.no_video {
        Box::new(NullSink::new())
    } else {
        Box::new(RawVideoSink::create(&args.out_dir, &stem, fps, width, height)?)
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .context("error setting Ctrl-C handler")?;

    // Last setup step: from here on the controller owns the port.
    let settings = cfg.settings_with_fps(fps)?;
    let actuator: Option<Box<dyn Actuator>> = match &cfg.actuator.serial_device {
        Some(device) => Some(Box::new(SerialActuator::open(device, cfg.actuator.settle)?)),
        None => {
            log::warn!("no serial device configured, running display-only");
            None
        }
    };

    let mut controller = SignalController::new(settings, actuator)?.with_shutdown(shutdown);
    if !args.no_progress {
        let ui = Ui::from_args(Some(&args.ui), std::io::stderr().is_terminal());
        controller = controller.with_observer(Box::new(ui));
    }

    let report = controller.run(&mut source, detector.as_mut(), sink.as_mut())?;
    print_summary(&report);

    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("create output directory {}", args.out_dir.display()))?;
    let report_path = args.out_dir.join(format!("{stem}_report.json"));
    std::fs::write(&report_path, serde_json::to_vec_pretty(&report)?)
        .with_context(|| format!("write run report {}", report_path.display()))?;
    log::info!("run report written to {}", report_path.display());
    Ok(())
}

fn print_summary(report: &RunReport) {
    println!("{}", report.lane_name);
    for (class, count) in &report.totals {
        println!("  {class:<12} {count}");
    }
    println!("  total        {}", report.total_vehicles);
    match &report.schedule {
        Some(schedule) => println!(
            "  weighted {:.1} -> red {}s, green {}s",
            schedule.weighted_total, schedule.red_secs, schedule.green_secs
        ),
        None => println!("  no schedule (interrupted during analysis)"),
    }
    if report.interrupted {
        println!("  interrupted, signal switched off");
    }
}

fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
