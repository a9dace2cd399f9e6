pub mod config;
pub mod depth;
pub mod disparity;
pub mod error;
pub mod filter;
pub mod foveation;
pub mod inpaint;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod projection;
pub mod remap;
pub mod sequencer;
pub mod stereo;
pub mod temporal;
pub mod video;

#[cfg(feature = "onnx")]
pub mod depth_onnx;

pub use config::VrConfig;
pub use depth::{normalize_depth, DepthEstimator, DepthField};
pub use disparity::{disparity_from_depth, max_disparity_px, DisparityField};
pub use error::{VrError, VrResult};
pub use foveation::{foveated_blur, FoveationParameters};
pub use inpaint::{InpaintMethod, InpaintModel, OcclusionInpainter};
pub use output::{create_sbs_image, save_frame, upscale, FramePacker, ImageEncoding, Resolution};
pub use pipeline::FramePipeline;
pub use projection::{panini_stereographic_blend, ProjectionParameters};
pub use sequencer::FrameSequencer;
pub use stereo::{create_stereo_pair, OcclusionMask, ViewPair};
pub use temporal::{TemporalStabilizer, TemporalWeights};
pub use video::{process_video, ClipOptions, VideoProgress};

#[cfg(feature = "onnx")]
pub use depth_onnx::OnnxDepthEstimator;

use std::path::Path;

/// Process a single photo into a packed VR180 canvas and save it.
///
/// A single image has no temporal neighbour, so no smoothing is applied.
pub fn process_photo(
	input: &Path,
	output: &Path,
	pipeline: &FramePipeline,
	estimator: &dyn DepthEstimator,
	encoding: ImageEncoding,
) -> VrResult<()> {
	let frame = image::open(input)
		.map_err(|e| VrError::ImageError(format!("Failed to load image {:?}: {}", input, e)))?
		.to_rgb8();
	let canvas = pipeline.render_frame(&frame, estimator)?;
	save_frame(&canvas, output, encoding)
}
