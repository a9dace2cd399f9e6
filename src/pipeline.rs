use crate::config::VrConfig;
use crate::depth::{DepthEstimator, DepthField};
use crate::disparity::disparity_from_depth;
use crate::error::{VrError, VrResult};
use crate::foveation::foveated_blur;
use crate::inpaint::{InpaintModel, OcclusionInpainter};
use crate::output::FramePacker;
use crate::projection::panini_stereographic_blend;
use crate::stereo::{create_stereo_pair, OcclusionMask};
use crate::temporal::TemporalStabilizer;
use image::RgbImage;
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{debug, warn};

/// The per-frame stages, depth through packing.
///
/// Rendering is a pure function of one frame and its depth, so a single
/// pipeline can be shared across worker threads. Temporal smoothing is not
/// part of it; callers own a [`TemporalStabilizer`] and feed it in order.
#[derive(Clone, Debug)]
pub struct FramePipeline {
	config: VrConfig,
	inpainter: OcclusionInpainter,
	packer: FramePacker,
}

impl FramePipeline {
	/// Validates the config up front so bad settings fail before any frame is rendered.
	pub fn new(config: VrConfig, inpaint_model: Option<Arc<dyn InpaintModel>>) -> VrResult<Self> {
		config.validate()?;
		let inpainter = OcclusionInpainter::new(config.inpaint_method, inpaint_model)?;
		let packer = FramePacker::new(config.target_resolution);
		Ok(Self {
			config,
			inpainter,
			packer,
		})
	}

	pub fn config(&self) -> &VrConfig {
		&self.config
	}

	/// A stabilizer configured with this pipeline's blend weights.
	pub fn stabilizer(&self) -> TemporalStabilizer {
		TemporalStabilizer::new(self.config.temporal)
	}

	/// Run every stage up to the packed, upscaled canvas.
	pub fn render(&self, frame: &RgbImage, depth: &DepthField) -> VrResult<RgbImage> {
		let (width, height) = frame.dimensions();
		if depth.dim() != (height as usize, width as usize) {
			return Err(VrError::ImageError(format!(
				"Depth field {:?} does not match frame {}x{}",
				depth.dim(),
				width,
				height
			)));
		}

		let disparity = disparity_from_depth(
			depth,
			self.config.assumed_fov_deg,
			self.config.max_disparity_deg,
		);
		let views = create_stereo_pair(frame, &disparity)?;
		debug!(
			left_occluded = views.left_mask.iter().filter(|&&m| m).count(),
			right_occluded = views.right_mask.iter().filter(|&&m| m).count(),
			"Synthesized stereo views"
		);

		let (left, right) = rayon::join(
			|| self.finish_view(&views.left, &views.left_mask),
			|| self.finish_view(&views.right, &views.right_mask),
		);

		self.packer.pack(&left?, &right?)
	}

	/// Estimate depth for `frame`, then [`render`](Self::render) it.
	pub fn render_frame(&self, frame: &RgbImage, estimator: &dyn DepthEstimator) -> VrResult<RgbImage> {
		let depth = estimator.estimate(frame)?;
		self.render(frame, &depth)
	}

	/// Render a batch in parallel, then stabilize the results in order.
	///
	/// `None` marks a frame that could not be decoded; it is skipped and the
	/// stream continues. Any other failure stops the batch.
	pub fn render_sequence(
		&self,
		frames: &[Option<RgbImage>],
		estimator: &dyn DepthEstimator,
		stabilizer: &mut TemporalStabilizer,
	) -> VrResult<Vec<RgbImage>> {
		let rendered: Vec<Option<VrResult<RgbImage>>> = frames
			.par_iter()
			.map(|frame| frame.as_ref().map(|f| self.render_frame(f, estimator)))
			.collect();

		let mut output = Vec::with_capacity(rendered.len());
		for (index, result) in rendered.into_iter().enumerate() {
			match result {
				None => warn!(index, "Skipping unavailable frame"),
				Some(Err(VrError::FrameUnavailable { index, reason })) => {
					warn!(index, %reason, "Skipping unavailable frame")
				}
				Some(Err(e)) => return Err(e),
				Some(Ok(canvas)) => output.push(stabilizer.stabilize(canvas)),
			}
		}
		Ok(output)
	}

	fn finish_view(&self, view: &RgbImage, mask: &OcclusionMask) -> VrResult<RgbImage> {
		let filled = self.inpainter.inpaint(view, mask)?;
		let widened = panini_stereographic_blend(&filled, &self.config.projection);
		Ok(foveated_blur(&widened, &self.config.foveation))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::inpaint::InpaintMethod;
	use crate::output::Resolution;
	use image::Rgb;
	use ndarray::Array2;

	fn small_config() -> VrConfig {
		VrConfig {
			target_resolution: Resolution::new(64, 32),
			workers: 2,
			..VrConfig::default()
		}
	}

	#[test]
	fn external_model_without_model_fails_before_rendering() {
		let config = VrConfig {
			inpaint_method: InpaintMethod::ExternalModel,
			..small_config()
		};
		assert!(matches!(
			FramePipeline::new(config, None),
			Err(VrError::ConfigError(_))
		));
	}

	#[test]
	fn invalid_config_is_rejected() {
		let mut config = small_config();
		config.foveation.start_deg = 120.0;
		assert!(FramePipeline::new(config, None).is_err());
	}

	#[test]
	fn render_produces_target_canvas() {
		let pipeline = FramePipeline::new(small_config(), None).unwrap();
		let frame = RgbImage::from_fn(40, 20, |x, y| Rgb([(x * 6) as u8, (y * 12) as u8, 90]));
		let depth = Array2::from_shape_fn((20, 40), |(_, x)| x as f32 / 39.0);
		let canvas = pipeline.render(&frame, &depth).unwrap();
		assert_eq!(canvas.dimensions(), (64, 32));
	}

	#[test]
	fn render_rejects_mismatched_depth() {
		let pipeline = FramePipeline::new(small_config(), None).unwrap();
		let err = pipeline
			.render(&RgbImage::new(10, 10), &Array2::zeros((10, 9)))
			.unwrap_err();
		assert!(matches!(err, VrError::ImageError(_)));
	}
}
