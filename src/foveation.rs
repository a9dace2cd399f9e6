use crate::error::{VrError, VrResult};
use crate::filter::gaussian_blur;
use image::RgbImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Sigma of the peripheral blur, in pixels
pub const FOVEATION_BLUR_SIGMA: f32 = 7.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FoveationParameters {
	/// Angle from centre where blurring begins
	pub start_deg: f32,
	/// Field of view the frame's half-extent maps to (edge = full_fov_deg / 2)
	pub full_fov_deg: f32,
	/// 0 disables the vignette, 1 darkens the corners fully
	pub vignette_strength: f32,
}

impl Default for FoveationParameters {
	fn default() -> Self {
		Self {
			start_deg: 70.0,
			full_fov_deg: 180.0,
			vignette_strength: 0.2,
		}
	}
}

impl FoveationParameters {
	pub fn validate(&self) -> VrResult<()> {
		if !(self.full_fov_deg.is_finite() && self.full_fov_deg > 0.0) {
			return Err(VrError::ConfigError(format!(
				"foveation full_fov_deg must be positive, got {}",
				self.full_fov_deg
			)));
		}
		if !self.start_deg.is_finite() || self.start_deg >= self.full_fov_deg / 2.0 {
			return Err(VrError::ConfigError(format!(
				"foveation start_deg ({}) must be below half the field of view ({})",
				self.start_deg,
				self.full_fov_deg / 2.0
			)));
		}
		if !(0.0..=1.0).contains(&self.vignette_strength) {
			return Err(VrError::ConfigError(format!(
				"vignette_strength must be within [0, 1], got {}",
				self.vignette_strength
			)));
		}
		Ok(())
	}

	/// Share of the blurred copy at `deg` degrees from centre.
	pub fn blend_factor(&self, deg: f32) -> f32 {
		let half = self.full_fov_deg / 2.0;
		if deg <= self.start_deg {
			0.0
		} else if deg >= half {
			1.0
		} else {
			((deg - self.start_deg) / (half - self.start_deg)).clamp(0.0, 1.0)
		}
	}

	/// Brightness multiplier at normalized radius `r`.
	pub fn vignette(&self, r: f32) -> f32 {
		let s = self.vignette_strength;
		(1.0 - s) + s * (1.0 - r * r).clamp(0.0, 1.0)
	}
}

/// Blur and darken the periphery, leaving the centre sharp.
///
/// Normalized radius maps linearly to degrees (`r = 1` is `full_fov_deg / 2`).
/// Channel values truncate to 8 bits after each step.
pub fn foveated_blur(image: &RgbImage, params: &FoveationParameters) -> RgbImage {
	let (width, height) = image.dimensions();
	let (w, h) = (width as usize, height as usize);
	if w == 0 || h == 0 {
		return image.clone();
	}

	let blurred = gaussian_blur(image, FOVEATION_BLUR_SIGMA);
	let cx = width as f32 / 2.0;
	let cy = height as f32 / 2.0;
	let half_fov = params.full_fov_deg / 2.0;
	let src = image.as_raw();
	let soft = blurred.as_raw();

	let mut pixels = vec![0u8; w * h * 3];
	pixels.par_chunks_mut(w * 3).enumerate().for_each(|(y, row)| {
		let dy = (y as f32 - cy) / cy;
		for x in 0..w {
			let dx = (x as f32 - cx) / cx;
			let r = (dx * dx + dy * dy).sqrt();
			let t = params.blend_factor(r * half_fov);
			let vig = params.vignette(r);

			for c in 0..3 {
				let i = (y * w + x) * 3 + c;
				let base = src[i] as f32;
				let mut v = (base + (soft[i] as f32 - base) * t) as u8;
				if params.vignette_strength > 0.0 {
					v = (v as f32 * vig) as u8;
				}
				row[x * 3 + c] = v;
			}
		}
	});

	RgbImage::from_raw(width, height, pixels).unwrap_or_else(|| image.clone())
}
