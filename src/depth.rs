use crate::error::{VrError, VrResult};
use image::{ImageBuffer, Luma, RgbImage};
use ndarray::Array2;

/// Per-pixel depth in `[0, 1]` at frame resolution, shaped `(height, width)`.
/// Larger values are closer to the viewer.
pub type DepthField = Array2<f32>;

/// A depth model.
///
/// Implementors only produce the raw signal at whatever resolution the model
/// runs at; `estimate` turns that into a [`DepthField`] matching the frame.
pub trait DepthEstimator: Send + Sync {
	/// Raw depth, `(rows, cols)`, larger = closer, any scale.
	fn estimate_raw(&self, frame: &RgbImage) -> VrResult<Array2<f32>>;

	fn estimate(&self, frame: &RgbImage) -> VrResult<DepthField> {
		let raw = self.estimate_raw(frame).map_err(|e| match e {
			VrError::DepthError(msg) => VrError::DepthError(msg),
			other => VrError::DepthError(other.to_string()),
		})?;
		normalize_depth(&raw, frame.width(), frame.height())
	}
}

/// Resize a raw depth signal to `width`x`height` and rescale it to `[0, 1]`.
///
/// A flat signal carries no depth information and normalizes to all zeros.
pub fn normalize_depth(raw: &Array2<f32>, width: u32, height: u32) -> VrResult<DepthField> {
	let (rows, cols) = raw.dim();
	if rows == 0 || cols == 0 {
		return Err(VrError::DepthError("Estimator returned an empty depth map".to_string()));
	}
	if raw.iter().any(|v| !v.is_finite()) {
		return Err(VrError::DepthError(
			"Estimator returned non-finite depth values".to_string(),
		));
	}

	let depth_image: ImageBuffer<Luma<f32>, Vec<f32>> =
		ImageBuffer::from_fn(cols as u32, rows as u32, |x, y| {
			Luma([raw[[y as usize, x as usize]]])
		});

	let resized = if (cols as u32, rows as u32) == (width, height) {
		depth_image
	} else {
		image::imageops::resize(
			&depth_image,
			width,
			height,
			image::imageops::FilterType::Triangle,
		)
	};

	let data: Vec<f32> = resized.pixels().map(|p| p[0]).collect();
	let mut depth = Array2::from_shape_vec((height as usize, width as usize), data)
		.map_err(|e| VrError::TensorError(format!("Failed to reshape depth: {}", e)))?;

	let min = depth.iter().copied().fold(f32::INFINITY, f32::min);
	let max = depth.iter().copied().fold(f32::NEG_INFINITY, f32::max);
	let range = max - min;

	if range > 1e-6 {
		depth.mapv_inplace(|v| ((v - min) / range).clamp(0.0, 1.0));
	} else {
		depth.fill(0.0);
	}

	Ok(depth)
}
