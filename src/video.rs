use crate::depth::DepthEstimator;
use crate::error::{VrError, VrResult};
use crate::output::Resolution;
use crate::pipeline::FramePipeline;
use crate::sequencer::FrameSequencer;
use crate::temporal::TemporalStabilizer;
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct VideoProgress {
	pub current_frame: u32,
	pub total_frames: u32,
	pub stage: String,
	pub percent: f64,
}

impl VideoProgress {
	pub fn new(current_frame: u32, total_frames: u32, stage: String) -> Self {
		let percent = if total_frames > 0 {
			(current_frame as f64 / total_frames as f64 * 100.0).min(100.0)
		} else {
			0.0
		};
		Self {
			current_frame,
			total_frames,
			stage,
			percent,
		}
	}
}

#[derive(Clone, Debug)]
pub struct VideoMetadata {
	pub width: u32,
	pub height: u32,
	pub fps: f64,
	pub total_frames: u32,
	pub duration: f64,
}

/// Which part of the input to convert and at what rate.
#[derive(Clone, Debug, Default)]
pub struct ClipOptions {
	/// ffmpeg `-ss` timestamp, e.g. `00:01:30`
	pub start: Option<String>,
	/// ffmpeg `-t` duration
	pub duration: Option<String>,
	/// Resample to this frame rate before processing
	pub fps: Option<f64>,
}

pub type ProgressCallback = Box<dyn Fn(VideoProgress) + Send + Sync>;

fn path_str(path: &Path) -> VrResult<&str> {
	path.to_str()
		.ok_or_else(|| VrError::Other(format!("Invalid path encoding: {:?}", path)))
}

pub async fn get_video_metadata(input_path: &Path) -> VrResult<VideoMetadata> {
	let input_str = path_str(input_path)?;

	let output = Command::new("ffprobe")
		.args([
			"-v", "error",
			"-select_streams", "v:0",
			"-show_entries", "stream=width,height,r_frame_rate,nb_frames,duration",
			"-show_entries", "format=duration",
			"-of", "json",
			input_str,
		])
		.output()
		.await
		.map_err(|e| {
			VrError::Other(format!(
				"Failed to run ffprobe (is ffmpeg installed?): {}",
				e
			))
		})?;

	if !output.status.success() {
		let stderr = String::from_utf8_lossy(&output.stderr);
		return Err(VrError::Other(format!("ffprobe failed: {}", stderr)));
	}

	let stdout = String::from_utf8_lossy(&output.stdout);
	parse_probe_output(&stdout)
}

fn parse_probe_output(stdout: &str) -> VrResult<VideoMetadata> {
	let json: serde_json::Value = serde_json::from_str(stdout)
		.map_err(|e| VrError::Other(format!("Failed to parse ffprobe JSON: {}", e)))?;

	let stream = json["streams"]
		.as_array()
		.and_then(|s| s.first())
		.ok_or_else(|| VrError::Other("No video stream found".to_string()))?;

	let width = stream["width"]
		.as_u64()
		.ok_or_else(|| VrError::Other("Failed to parse width".to_string()))? as u32;
	let height = stream["height"]
		.as_u64()
		.ok_or_else(|| VrError::Other("Failed to parse height".to_string()))? as u32;

	let fps = stream["r_frame_rate"]
		.as_str()
		.map(parse_frame_rate)
		.unwrap_or(30.0);

	let duration = stream["duration"]
		.as_str()
		.and_then(|s| s.parse::<f64>().ok())
		.or_else(|| {
			json["format"]["duration"]
				.as_str()
				.and_then(|s| s.parse::<f64>().ok())
		})
		.unwrap_or(0.0);

	let total_frames = stream["nb_frames"]
		.as_str()
		.and_then(|s| s.parse::<u32>().ok())
		.unwrap_or_else(|| (duration * fps).round() as u32);

	Ok(VideoMetadata {
		width,
		height,
		fps,
		total_frames,
		duration,
	})
}

fn parse_frame_rate(s: &str) -> f64 {
	let rate = if let Some((num, den)) = s.split_once('/') {
		let n: f64 = num.parse().unwrap_or(30.0);
		let d: f64 = den.parse().unwrap_or(1.0);
		n / d
	} else {
		s.parse().unwrap_or(30.0)
	};
	if rate.is_finite() && rate > 0.0 {
		rate
	} else {
		30.0
	}
}

fn extract_frames(
	input_path: &Path,
	metadata: &VideoMetadata,
	clip: &ClipOptions,
) -> VrResult<mpsc::Receiver<Vec<u8>>> {
	let (tx, rx) = mpsc::channel::<Vec<u8>>(10);
	let frame_size = (metadata.width * metadata.height * 3) as usize;

	let mut args: Vec<String> = vec!["-v".into(), "error".into()];
	if let Some(start) = &clip.start {
		args.extend(["-ss".into(), start.clone()]);
	}
	args.extend(["-i".into(), path_str(input_path)?.to_string()]);
	if let Some(duration) = &clip.duration {
		args.extend(["-t".into(), duration.clone()]);
	}
	if let Some(fps) = clip.fps {
		args.extend(["-vf".into(), format!("fps={}", fps)]);
	}
	args.extend(
		["-f", "rawvideo", "-pix_fmt", "rgb24", "-vsync", "0", "-"]
			.into_iter()
			.map(String::from),
	);

	let mut child = Command::new("ffmpeg")
		.args(&args)
		.stdout(Stdio::piped())
		.stderr(Stdio::null())
		.kill_on_drop(true)
		.spawn()
		.map_err(|e| VrError::Other(format!("Failed to spawn ffmpeg decoder: {}", e)))?;

	let stdout = child
		.stdout
		.take()
		.ok_or_else(|| VrError::Other("Failed to capture ffmpeg stdout".to_string()))?;

	tokio::spawn(async move {
		match read_frames(stdout, frame_size, &tx).await {
			ReadOutcome::Finished(_) => {
				let _ = child.wait().await;
			}
			ReadOutcome::ReceiverGone(frames) => {
				// ffmpeg would block forever on a full pipe
				debug!(frames, "Frame consumer gone, stopping decoder");
				let _ = child.kill().await;
			}
		}
	});

	Ok(rx)
}

#[derive(Debug, PartialEq, Eq)]
enum ReadOutcome {
	/// The stream ended; carries the number of whole frames sent.
	Finished(u64),
	/// The receiving side hung up after this many frames.
	ReceiverGone(u64),
}

/// Split a raw rgb24 stream into fixed-size frames. A trailing partial frame is dropped.
async fn read_frames<R: AsyncRead + Unpin>(
	source: R,
	frame_size: usize,
	tx: &mpsc::Sender<Vec<u8>>,
) -> ReadOutcome {
	let mut reader = tokio::io::BufReader::new(source);
	let mut frame_buffer = vec![0u8; frame_size];
	let mut sent = 0u64;

	loop {
		match reader.read_exact(&mut frame_buffer).await {
			Ok(_) => {
				if tx.send(frame_buffer.clone()).await.is_err() {
					return ReadOutcome::ReceiverGone(sent);
				}
				sent += 1;
			}
			Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
			Err(e) => {
				warn!("Frame decoder stopped: {}", e);
				break;
			}
		}
	}
	ReadOutcome::Finished(sent)
}

fn frame_to_image(index: u64, data: Vec<u8>, width: u32, height: u32) -> VrResult<RgbImage> {
	RgbImage::from_raw(width, height, data).ok_or_else(|| VrError::FrameUnavailable {
		index,
		reason: format!("frame data does not fill {}x{}", width, height),
	})
}

async fn encode_packed_video(
	output_path: PathBuf,
	resolution: Resolution,
	fps: f64,
	mut rx: mpsc::Receiver<RgbImage>,
) -> VrResult<()> {
	let mut child = Command::new("ffmpeg")
		.args([
			"-f",
			"rawvideo",
			"-pix_fmt",
			"rgb24",
			"-s",
			&resolution.to_string(),
			"-r",
			&format!("{}", fps),
			"-i",
			"-",
			"-c:v",
			"libx264",
			"-preset",
			"slow",
			"-crf",
			"18",
			"-pix_fmt",
			"yuv420p",
			"-y",
			path_str(&output_path)?,
		])
		.stdin(Stdio::piped())
		.stdout(Stdio::null())
		.stderr(Stdio::null())
		.spawn()
		.map_err(|e| VrError::Other(format!("Failed to spawn ffmpeg encoder: {}", e)))?;

	let mut stdin = child
		.stdin
		.take()
		.ok_or_else(|| VrError::Other("Failed to capture ffmpeg stdin".to_string()))?;

	while let Some(canvas) = rx.recv().await {
		stdin
			.write_all(canvas.as_raw())
			.await
			.map_err(|e| VrError::IoError(format!("Failed to write frame: {}", e)))?;
	}

	drop(stdin);

	let status = child
		.wait()
		.await
		.map_err(|e| VrError::Other(format!("ffmpeg encoding failed: {}", e)))?;

	if !status.success() {
		return Err(VrError::Other(
			"ffmpeg encoding exited with error".to_string(),
		));
	}

	Ok(())
}

/// A worker's result on its way to the encoder. The permit keeps the
/// worker slot taken until the frame leaves the reorder buffer.
struct RenderedFrame {
	result: VrResult<RgbImage>,
	_slot: Option<OwnedSemaphorePermit>,
}

/// Release results in frame order, stabilize them and hand them to the encoder.
///
/// Unreadable frames are skipped; any other error stops the stream. Results
/// still waiting for an earlier index stay in `sequencer` when this returns.
async fn write_in_order(
	results: &mut mpsc::Receiver<(u64, RenderedFrame)>,
	sequencer: &mut FrameSequencer<RenderedFrame>,
	stabilizer: &mut TemporalStabilizer,
	canvas_tx: &mpsc::Sender<RgbImage>,
	mut on_written: impl FnMut(u32),
) -> VrResult<u32> {
	let mut written = 0u32;
	while let Some((index, frame)) = results.recv().await {
		for (index, RenderedFrame { result, _slot }) in sequencer.push(index, frame) {
			let canvas = match result {
				Ok(canvas) => canvas,
				Err(VrError::FrameUnavailable { reason, .. }) => {
					warn!(index, %reason, "Skipping unreadable frame");
					continue;
				}
				Err(e) => return Err(e),
			};

			let stabilized = stabilizer.stabilize(canvas);
			if canvas_tx.send(stabilized).await.is_err() {
				return Err(VrError::Other("Encoder stopped unexpectedly".to_string()));
			}

			written += 1;
			on_written(written);
		}
	}
	Ok(written)
}

/// Convert a video into a side-by-side VR180 clip.
///
/// Frames are rendered on blocking worker threads. At most `config.workers`
/// frames are rendering or waiting for an earlier frame at any time, and
/// canvases are put back in frame order before the temporal stabilizer sees them.
pub async fn process_video(
	input_path: &Path,
	output_path: &Path,
	pipeline: Arc<FramePipeline>,
	estimator: Arc<dyn DepthEstimator>,
	clip: ClipOptions,
	progress_cb: Option<ProgressCallback>,
) -> VrResult<()> {
	if !input_path.exists() {
		return Err(VrError::IoError(format!(
			"Input file not found: {:?}",
			input_path
		)));
	}

	let metadata = get_video_metadata(input_path).await?;
	let fps = clip.fps.unwrap_or(metadata.fps);
	let total_frames = match (&clip.duration, clip.fps) {
		(None, None) => metadata.total_frames,
		_ => 0,
	};
	info!(
		width = metadata.width,
		height = metadata.height,
		fps,
		output_resolution = %pipeline.config().target_resolution,
		"Processing video"
	);

	let mut frame_rx = extract_frames(input_path, &metadata, &clip)?;

	let (canvas_tx, canvas_rx) = mpsc::channel::<RgbImage>(4);
	let encode_handle = tokio::spawn(encode_packed_video(
		output_path.to_path_buf(),
		pipeline.config().target_resolution,
		fps,
		canvas_rx,
	));

	let workers = pipeline.config().workers;
	let (result_tx, mut result_rx) = mpsc::channel::<(u64, RenderedFrame)>(workers * 2);
	let permits = Arc::new(Semaphore::new(workers));
	let (width, height) = (metadata.width, metadata.height);

	let dispatch = {
		let pipeline = Arc::clone(&pipeline);
		tokio::spawn(async move {
			let mut index = 0u64;
			while let Some(frame_data) = frame_rx.recv().await {
				let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
					break;
				};
				let pipeline = Arc::clone(&pipeline);
				let estimator = Arc::clone(&estimator);
				let result_tx = result_tx.clone();
				let frame_index = index;

				tokio::task::spawn_blocking(move || {
					let result = frame_to_image(frame_index, frame_data, width, height)
						.and_then(|frame| pipeline.render_frame(&frame, estimator.as_ref()));
					let frame = RenderedFrame {
						result,
						_slot: Some(permit),
					};
					let _ = result_tx.blocking_send((frame_index, frame));
				});
				index += 1;
			}
			index
		})
	};

	if let Some(ref cb) = progress_cb {
		cb(VideoProgress::new(0, total_frames, "processing".to_string()));
	}

	let mut stabilizer = pipeline.stabilizer();
	let mut sequencer = FrameSequencer::new();

	let consumed = write_in_order(
		&mut result_rx,
		&mut sequencer,
		&mut stabilizer,
		&canvas_tx,
		|written| {
			if let Some(ref cb) = progress_cb {
				if written % 10 == 0 || written == total_frames {
					cb(VideoProgress::new(written, total_frames, "processing".to_string()));
				}
			}
		},
	)
	.await;

	let written = match consumed {
		Ok(written) => written,
		Err(e) => {
			dispatch.abort();
			stabilizer.reset();
			return Err(e);
		}
	};

	let dispatched = dispatch
		.await
		.map_err(|e| VrError::Other(format!("Frame dispatch failed: {}", e)))?;
	if sequencer.pending() > 0 || sequencer.next_index() != dispatched {
		return Err(VrError::Other(format!(
			"Lost frame results: released {} of {}",
			sequencer.next_index(),
			dispatched
		)));
	}
	drop(canvas_tx);

	if let Some(ref cb) = progress_cb {
		cb(VideoProgress::new(written, written, "encoding".to_string()));
	}

	encode_handle
		.await
		.map_err(|e| VrError::Other(format!("Encoding task failed: {}", e)))??;

	info!(frames = written, output = ?output_path, "Video complete");
	if let Some(ref cb) = progress_cb {
		cb(VideoProgress::new(written, written, "complete".to_string()));
	}

	Ok(())
}
