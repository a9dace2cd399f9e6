use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use vr180_maker::{
	model, process_photo, process_video, ClipOptions, FramePipeline, ImageEncoding, InpaintMethod,
	OnnxDepthEstimator, VideoProgress, VrConfig,
};

#[derive(Parser)]
#[command(name = "vr180-maker")]
#[command(about = "Convert 2D photos and videos to side-by-side VR180 fisheye stereo")]
#[command(version)]
struct Cli {
	/// Input image or video file
	input: PathBuf,

	/// Output file (defaults to input path with -vr180 suffix)
	#[arg(short, long)]
	output: Option<PathBuf>,

	/// JSON config file; flags below override its values
	#[arg(long)]
	config: Option<PathBuf>,

	/// Occlusion fill: mirror or telea
	#[arg(long)]
	method: Option<String>,

	/// Cap stereo disparity in degrees of visual angle (comfort 1.0-1.5)
	#[arg(long)]
	max_disparity_deg: Option<f32>,

	/// Resample video to this frame rate
	#[arg(long)]
	fps: Option<f64>,

	/// Start timestamp, HH:MM:SS
	#[arg(long)]
	start: Option<String>,

	/// Clip duration, HH:MM:SS
	#[arg(long)]
	duration: Option<String>,

	/// Depth model checkpoint name or path
	#[arg(short, long, default_value = model::DEFAULT_DEPTH_MODEL)]
	model: String,

	/// JPEG quality for photos (1-100)
	#[arg(long, default_value = "95")]
	quality: u8,

	/// Frames rendered concurrently
	#[arg(long)]
	workers: Option<usize>,
}

enum MediaType {
	Photo,
	Video,
}

fn detect_media_type(path: &Path) -> MediaType {
	let ext = path
		.extension()
		.and_then(|s| s.to_str())
		.unwrap_or("")
		.to_lowercase();

	match ext.as_str() {
		"mp4" | "mov" | "avi" | "mkv" | "m4v" | "webm" | "flv" | "wmv" | "mpg" | "mpeg" => {
			MediaType::Video
		}
		_ => MediaType::Photo,
	}
}

fn generate_output_path(input: &Path, media_type: &MediaType) -> PathBuf {
	let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("output");
	let extension = match media_type {
		MediaType::Video => "mp4",
		MediaType::Photo => input.extension().and_then(|s| s.to_str()).unwrap_or("jpg"),
	};

	let parent = input.parent().unwrap_or_else(|| Path::new("."));
	parent.join(format!("{}-vr180.{}", stem, extension))
}

fn build_config(cli: &Cli) -> anyhow::Result<VrConfig> {
	let mut config = match &cli.config {
		Some(path) => VrConfig::from_json_file(path)?,
		None => VrConfig::default(),
	};

	if let Some(method) = &cli.method {
		config.inpaint_method = method.parse::<InpaintMethod>()?;
	}
	if let Some(deg) = cli.max_disparity_deg {
		config.max_disparity_deg = deg;
	}
	if let Some(workers) = cli.workers {
		config.workers = workers;
	}

	config.validate()?;
	Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.with_target(false)
		.with_writer(std::io::stderr)
		.init();

	let cli = Cli::parse();

	let media_type = detect_media_type(&cli.input);
	let output = cli
		.output
		.clone()
		.unwrap_or_else(|| generate_output_path(&cli.input, &media_type));

	let config = build_config(&cli)?;
	tracing::info!(
		method = %config.inpaint_method,
		max_disparity_deg = config.max_disparity_deg,
		resolution = %config.target_resolution,
		"Configuration loaded"
	);

	let model_path = model::find_checkpoint(&cli.model)?;
	let model_str = model_path
		.to_str()
		.ok_or_else(|| anyhow::anyhow!("Invalid model path encoding: {:?}", model_path))?;
	let estimator = Arc::new(OnnxDepthEstimator::new(model_str)?);

	// The learned inpainter is not bundled, so external-model fails here.
	let pipeline = FramePipeline::new(config, None)?;

	match media_type {
		MediaType::Photo => {
			tracing::info!(input = ?cli.input, "Processing photo");
			let encoding = ImageEncoding::from_path(&output, cli.quality);
			process_photo(&cli.input, &output, &pipeline, estimator.as_ref(), encoding)?;
		}
		MediaType::Video => {
			tracing::info!(input = ?cli.input, "Processing video");
			let start = std::time::Instant::now();

			let clip = ClipOptions {
				start: cli.start.clone(),
				duration: cli.duration.clone(),
				fps: cli.fps,
			};

			process_video(
				&cli.input,
				&output,
				Arc::new(pipeline),
				estimator,
				clip,
				Some(Box::new(|progress: VideoProgress| {
					eprint!(
						"\r[{}] Frame {}/{} ({:.1}%)",
						progress.stage, progress.current_frame, progress.total_frames, progress.percent
					);
				})),
			)
			.await?;

			eprintln!();
			tracing::info!(seconds = start.elapsed().as_secs_f64(), "Total time");
		}
	}

	eprintln!("✓ Saved to: {:?}", output);
	Ok(())
}
