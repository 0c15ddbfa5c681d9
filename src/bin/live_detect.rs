//! live-detect - run a detector over a camera or video file
//!
//! Raw and annotated frames are written to `<out>/raw.jpg` and
//! `<out>/annotated.jpg` as they are processed. Ctrl-C stops after the current
//! frame; the source and model are released before exit.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use live_detect::ingest::SourceSpec;
use live_detect::run::{RunControl, RunOptions};
use live_detect::{DemoConfig, DirectorySink, LoopRunner};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Source: "webcam", a camera index, or a local video file.
    #[arg(long)]
    source: Option<String>,
    /// Model identifier (e.g. YOLOv8n, YOLOv8s-Seg, stub).
    #[arg(long)]
    model: Option<String>,
    /// Directory holding `<model>.onnx` weights.
    #[arg(long)]
    models_dir: Option<PathBuf>,
    /// Confidence threshold in [0, 1].
    #[arg(long)]
    conf: Option<f32>,
    /// Overlap (IoU) threshold for suppression in [0, 1].
    #[arg(long)]
    iou: Option<f32>,
    /// Output directory for the raw and annotated panels.
    #[arg(long)]
    out: Option<PathBuf>,
    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,
    /// Print the selectable model identifiers and exit.
    #[arg(long)]
    list_models: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = DemoConfig::load()?;
    apply_args(&mut config, &args)?;
    config.validate()?;

    if args.list_models {
        for id in config.catalog().ids() {
            println!("{}", id);
        }
        return Ok(());
    }

    let thresholds = config.thresholds()?;
    let source = config.source.build()?;
    let detector = config
        .catalog()
        .resolve(&config.model)
        .with_context(|| format!("load model {}", config.model))?;
    let sink = DirectorySink::new(&config.out_dir)?;
    log::info!(
        "live-detect: {} with {}, writing panels to {}",
        config.source,
        config.model,
        config.out_dir.display()
    );

    let control = RunControl::new();
    let signal = control.stop_signal();
    ctrlc::set_handler(move || {
        log::info!("shutdown signal received, stopping after the current frame...");
        signal.request();
    })
    .context("set Ctrl-C handler")?;

    let handle = LoopRunner::new(thresholds)
        .with_options(RunOptions {
            max_frames: config.max_frames,
        })
        .with_control(control)
        .start(source, detector, sink)?;

    let report = handle.join()?;
    log::info!(
        "live-detect finished: {} frames ({:?}), mean inference {:.1} ms, {:.1} fps",
        report.frames_processed,
        report.stop_reason,
        report.mean_infer_ms,
        report.fps_estimate
    );
    Ok(())
}

fn apply_args(config: &mut DemoConfig, args: &Args) -> Result<()> {
    if let Some(source) = &args.source {
        config.source = SourceSpec::parse(source)?;
    }
    if let Some(model) = &args.model {
        config.model = model.clone();
    }
    if let Some(dir) = &args.models_dir {
        config.models_dir = dir.clone();
    }
    if let Some(conf) = args.conf {
        config.confidence = conf;
    }
    if let Some(iou) = args.iou {
        config.overlap = iou;
    }
    if let Some(out) = &args.out {
        config.out_dir = out.clone();
    }
    if args.max_frames.is_some() {
        config.max_frames = args.max_frames;
    }
    Ok(())
}
