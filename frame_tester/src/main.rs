mod image_helper;

use anyhow::{Context, Result, bail};
use clap::Parser;
use image_helper::image_helper::{load_frame, save_frame};
use log::{debug, info};
use mmm_vision::config::{PipelineConfig, load_config};
use mmm_vision::core_modules::render::{paint_frame, paint_frame_mod};
use mmm_vision::pipeline::{FrameBuffer, FrameReport, VisionPipeline};
use std::fs;
use std::path::PathBuf;

/// Runs the vision pipeline over a numbered image sequence and writes a
/// results stack (original / foreground / density / blob IDs) per frame.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Directory holding the numbered input frames (00000.jpg, 00001.jpg, ...).
    input: PathBuf,
    /// Index of the frame that seeds the background model.
    #[arg(long, default_value_t = 0)]
    start: u32,
    /// Index of the last frame to process.
    #[arg(long)]
    end: u32,
    #[arg(long, default_value_t = 1)]
    step: u32,
    /// Frames after the seed that are also fed to the model as training frames.
    #[arg(long, default_value_t = 3)]
    train: u32,
    /// File extension of the input frames.
    #[arg(long, default_value = "jpg")]
    extension: String,
    /// Optional TOML file overriding the default pipeline parameters.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Output directory for result images.
    #[arg(long, default_value = "trials")]
    out: PathBuf,
    #[arg(long)]
    epsilon: Option<u32>,
    #[arg(long)]
    cth: Option<u32>,
    #[arg(long)]
    bth: Option<u32>,
    #[arg(long)]
    wheel_size: Option<usize>,
    /// Blobs below this area are not reported.
    #[arg(long)]
    min_blob_area: Option<usize>,
    /// Image onto which the pixels of every reported blob are copied.
    #[arg(long)]
    backdrop: Option<PathBuf>,
    /// Rows to shift blob pixels down by when compositing onto the backdrop.
    #[arg(long, default_value_t = 0)]
    backdrop_offset: usize,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if args.step == 0 {
        bail!("step must be >= 1");
    }
    if args.end <= args.start {
        bail!("end ({}) must come after start ({})", args.end, args.start);
    }

    let config = build_config(&args)?;
    info!("pipeline config: {:?}", config);
    fs::create_dir_all(&args.out).with_context(|| format!("failed to create {}", args.out.display()))?;
    let backdrop = args.backdrop.as_deref().map(load_frame).transpose()?;

    // --- 1. Seed and train the background model ---
    let seed = load_frame(&frame_path(&args, args.start))?;
    let mut pipeline = VisionPipeline::new(config, &seed)?;
    let frames: Vec<u32> = (args.start + args.step..=args.end).step_by(args.step as usize).collect();
    for &n in frames.iter().take(args.train as usize) {
        let mut frame = load_frame(&frame_path(&args, n))?;
        pipeline.train(&mut frame)?;
        debug!("trained on frame {:05}", n);
    }

    // --- 2. Process the sequence ---
    let max_density = pipeline
        .config()
        .density
        .max_value(pipeline.config().wheel_size);
    for &n in &frames {
        let original = load_frame(&frame_path(&args, n))?;
        let mut foreground = original.clone();
        let report = pipeline
            .process_frame(&mut foreground)
            .with_context(|| format!("failed to process frame {:05}", n))?;
        log_report(n, &report);

        let stack = results_stack(&original, &foreground, &report, max_density)?;
        save_frame(&args.out.join(format!("rs{:05}.png", n)), &stack)?;

        if let Some(backdrop) = &backdrop {
            let mut output = backdrop.clone();
            composite(&mut output, &original, &report, args.backdrop_offset);
            save_frame(&args.out.join(format!("out{:05}.png", n)), &output)?;
        }
    }

    info!("background model after {} frames:\n{}", frames.len(), pipeline.background_model().demographics());
    info!("processing complete, results written to {}", args.out.display());
    Ok(())
}

fn build_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => load_config(path).with_context(|| format!("failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    config.epsilon = args.epsilon.unwrap_or(config.epsilon);
    config.cth = args.cth.unwrap_or(config.cth);
    config.bth = args.bth.unwrap_or(config.bth);
    config.wheel_size = args.wheel_size.unwrap_or(config.wheel_size);
    config.min_blob_area = args.min_blob_area.or(config.min_blob_area);
    // The results stack always shows blob membership.
    config.id_map = true;
    config.validate()?;
    Ok(config)
}

fn frame_path(args: &Args, n: u32) -> PathBuf {
    args.input.join(format!("{:05}.{}", n, args.extension))
}

fn log_report(n: u32, report: &FrameReport) {
    info!(
        "frame {:05}: {} foreground pixels, {} blobs, {} cells reclaimed",
        n,
        report.foreground_pixels(),
        report.blobs.len(),
        report.reclaimed_cells
    );
    for blob in &report.blobs {
        let (top_left, bottom_right) = blob.bounding_box;
        let (cx, cy) = blob.center_of_mass();
        info!(
            "  blob {}: area {}, box ({}, {})-({}, {}), center ({:.1}, {:.1})",
            blob.id, blob.area, top_left.x, top_left.y, bottom_right.x, bottom_right.y, cx, cy
        );
    }
}

/// Four panels stacked top to bottom: original, foreground, painted density,
/// painted blob IDs.
fn results_stack(
    original: &FrameBuffer,
    foreground: &FrameBuffer,
    report: &FrameReport,
    max_density: u32,
) -> Result<FrameBuffer> {
    let (width, height) = (original.width(), original.height());
    let mut stack = FrameBuffer::new(width, height * 4)?;
    stack.copy_rows_from(original, 0)?;
    stack.copy_rows_from(foreground, height)?;

    let mut panel = FrameBuffer::new(width, height)?;
    paint_frame(&mut panel, max_density, &report.density_map)?;
    stack.copy_rows_from(&panel, height * 2)?;

    panel.clear();
    if let Some(ids) = &report.id_map {
        paint_frame_mod(&mut panel, &ids.to_density_map()?)?;
    }
    stack.copy_rows_from(&panel, height * 3)?;
    Ok(stack)
}

/// Copies every pixel owned by a reported blob from `original` onto `backdrop`.
fn composite(backdrop: &mut FrameBuffer, original: &FrameBuffer, report: &FrameReport, offset: usize) {
    let Some(ids) = &report.id_map else {
        return;
    };
    for blob in &report.blobs {
        let (top_left, bottom_right) = blob.bounding_box;
        for y in top_left.y as usize..=bottom_right.y as usize {
            for x in top_left.x as usize..=bottom_right.x as usize {
                if ids.get(x, y) != blob.id {
                    continue;
                }
                let target_y = y + offset;
                if x < backdrop.width() && target_y < backdrop.height() {
                    backdrop.set_pixel_at(x, target_y, original.pixel_at(x, y));
                }
            }
        }
    }
}
