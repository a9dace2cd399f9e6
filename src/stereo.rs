use crate::disparity::DisparityField;
use crate::error::{VrError, VrResult};
use crate::remap::{sample_bilinear, to_u8, Border};
use image::RgbImage;
use ndarray::Array2;
use rayon::prelude::*;

/// True where a view's source sample fell outside the frame horizontally.
pub type OcclusionMask = Array2<bool>;

/// Left and right eye views with their occlusion masks, all the same size.
#[derive(Clone, Debug)]
pub struct ViewPair {
	pub left: RgbImage,
	pub right: RgbImage,
	pub left_mask: OcclusionMask,
	pub right_mask: OcclusionMask,
}

/// Create left and right eye views from an RGB frame and disparity field using DIBR
///
/// The left eye samples at `x - d/2` and the right eye at `x + d/2`. There is
/// no vertical parallax. Pixels whose sample left the frame are written with
/// the replicated edge colour and flagged in the view's mask for inpainting.
pub fn create_stereo_pair(frame: &RgbImage, disparity: &DisparityField) -> VrResult<ViewPair> {
	let (width, height) = frame.dimensions();
	if width == 0 || height == 0 {
		return Err(VrError::ImageError(format!(
			"Cannot synthesize views from an empty {}x{} frame",
			width, height
		)));
	}
	if disparity.dim() != (height as usize, width as usize) {
		return Err(VrError::ImageError(format!(
			"Disparity field {:?} does not match frame {}x{}",
			disparity.dim(),
			width,
			height
		)));
	}

	let (left, left_mask) = remap_image(frame, disparity, -0.5)?;
	let (right, right_mask) = remap_image(frame, disparity, 0.5)?;

	Ok(ViewPair {
		left,
		right,
		left_mask,
		right_mask,
	})
}

/// Shift every row horizontally by `disparity * shift_factor`.
///
/// This is equivalent to cv2.remap with INTER_LINEAR and BORDER_REPLICATE
fn remap_image(
	source: &RgbImage,
	disparity: &DisparityField,
	shift_factor: f32,
) -> VrResult<(RgbImage, OcclusionMask)> {
	let (width, height) = source.dimensions();
	let (w, h) = (width as usize, height as usize);
	let max_x = width.saturating_sub(1) as f32;

	let mut pixels = vec![0u8; w * h * 3];
	let mut occluded = vec![false; w * h];

	pixels
		.par_chunks_mut(w * 3)
		.zip(occluded.par_chunks_mut(w))
		.enumerate()
		.for_each(|(y, (row, mask_row))| {
			for x in 0..w {
				let src_x = x as f32 + disparity[[y, x]] * shift_factor;
				mask_row[x] = src_x < 0.0 || src_x > max_x;

				let pixel = sample_bilinear(source, src_x, y as f32, Border::Replicate);
				for c in 0..3 {
					row[x * 3 + c] = to_u8(pixel[c]);
				}
			}
		});

	let image = RgbImage::from_raw(width, height, pixels).ok_or_else(|| {
		VrError::ImageError(format!("Failed to build {}x{} view", width, height))
	})?;
	let mask = Array2::from_shape_vec((h, w), occluded)
		.map_err(|e| VrError::TensorError(format!("Failed to reshape mask: {}", e)))?;

	Ok((image, mask))
}
