use crate::remap::{sample_bilinear, to_u8, Border};
use image::RgbImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// Blend weights of the radial warp. Whatever is left of `1 - panini - stereo`
/// goes to the identity mapping.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionParameters {
	pub panini_weight: f32,
	pub stereo_weight: f32,
}

impl Default for ProjectionParameters {
	fn default() -> Self {
		Self {
			panini_weight: 0.7,
			stereo_weight: 0.2,
		}
	}
}

impl ProjectionParameters {
	/// Clamp into `pw in [0, 1]`, `sw in [0, 1 - pw]`.
	pub fn clamped(&self) -> Self {
		let panini_weight = finite_or_zero(self.panini_weight).clamp(0.0, 1.0);
		let stereo_weight = finite_or_zero(self.stereo_weight).clamp(0.0, 1.0 - panini_weight);
		Self {
			panini_weight,
			stereo_weight,
		}
	}

	/// Blended radius for a normalized input radius, before the frame-range clamp.
	pub fn blend_radius(&self, r: f32) -> f32 {
		let ProjectionParameters {
			panini_weight: pw,
			stereo_weight: sw,
		} = self.clamped();

		let panini = r / (1.0 + pw * r);
		let stereo = (PI * r / 4.0).tan() / (PI / 2.0);
		(1.0 - pw - sw) * r + pw * panini + sw * stereo
	}
}

fn finite_or_zero(v: f32) -> f32 {
	if v.is_finite() {
		v
	} else {
		0.0
	}
}

/// Radial panini/stereographic warp about the frame centre.
///
/// Offsets are normalized so `r = 1` at half-width / half-height. The source
/// coordinate is the output offset scaled by `r' / r`, sampled bilinearly with
/// a reflect-101 border. The centre pixel maps to itself.
pub fn panini_stereographic_blend(image: &RgbImage, params: &ProjectionParameters) -> RgbImage {
	let (width, height) = image.dimensions();
	let (w, h) = (width as usize, height as usize);
	if w == 0 || h == 0 {
		return image.clone();
	}

	let cx = width as f32 / 2.0;
	let cy = height as f32 / 2.0;
	let r_max = max_radius(width, height);
	let params = params.clamped();

	let mut pixels = vec![0u8; w * h * 3];
	pixels.par_chunks_mut(w * 3).enumerate().for_each(|(y, row)| {
		let dy = (y as f32 - cy) / cy;
		for x in 0..w {
			let dx = (x as f32 - cx) / cx;
			let r = (dx * dx + dy * dy).sqrt();
			let rb = params.blend_radius(r).clamp(0.0, r_max);
			let scale = if r > 1e-6 { rb / r } else { 1.0 };

			let map_x = cx + dx * scale * cx;
			let map_y = cy + dy * scale * cy;
			let pixel = sample_bilinear(image, map_x, map_y, Border::Reflect101);
			for c in 0..3 {
				row[x * 3 + c] = to_u8(pixel[c]);
			}
		}
	});

	RgbImage::from_raw(width, height, pixels).unwrap_or_else(|| image.clone())
}

/// Largest normalized radius of any pixel; the top-left corner sits at exactly sqrt(2).
fn max_radius(width: u32, height: u32) -> f32 {
	let cx = width as f32 / 2.0;
	let cy = height as f32 / 2.0;
	[(0.0, 0.0), (width as f32 - 1.0, height as f32 - 1.0)]
		.iter()
		.map(|&(x, y)| {
			let dx = (x - cx) / cx;
			let dy = (y - cy) / cy;
			(dx * dx + dy * dy).sqrt()
		})
		.fold(0.0f32, f32::max)
}

#[cfg(test)]
mod tests {
	use super::*;
	use image::Rgb;

	fn pattern(width: u32, height: u32) -> RgbImage {
		RgbImage::from_fn(width, height, |x, y| {
			Rgb([(x * 7 % 256) as u8, (y * 11 % 256) as u8, ((x + y) * 3 % 256) as u8])
		})
	}

	#[test]
	fn centre_pixel_is_identity() {
		let img = pattern(64, 32);
		for params in [
			ProjectionParameters::default(),
			ProjectionParameters { panini_weight: 0.0, stereo_weight: 1.0 },
			ProjectionParameters { panini_weight: 1.0, stereo_weight: 0.0 },
			ProjectionParameters { panini_weight: 3.0, stereo_weight: -2.0 },
		] {
			let out = panini_stereographic_blend(&img, &params);
			assert_eq!(out.get_pixel(32, 16), img.get_pixel(32, 16), "{params:?}");
		}
	}

	#[test]
	fn zero_weights_are_identity() {
		let img = pattern(40, 20);
		let params = ProjectionParameters { panini_weight: 0.0, stereo_weight: 0.0 };
		assert_eq!(panini_stereographic_blend(&img, &params), img);
	}

	#[test]
	fn weights_clamp_instead_of_failing() {
		let p = ProjectionParameters { panini_weight: 0.9, stereo_weight: 0.6 }.clamped();
		assert_eq!(p.panini_weight, 0.9);
		assert!((p.stereo_weight - 0.1).abs() < 1e-6);

		let p = ProjectionParameters { panini_weight: f32::NAN, stereo_weight: -1.0 }.clamped();
		assert_eq!(p, ProjectionParameters { panini_weight: 0.0, stereo_weight: 0.0 });
	}

	#[test]
	fn default_blend_pulls_edges_inward() {
		let params = ProjectionParameters::default();
		assert_eq!(params.blend_radius(0.0), 0.0);
		let r = params.blend_radius(1.0);
		assert!(r < 1.0 && r > 0.5, "got {r}");
	}

	#[test]
	fn keeps_resolution() {
		let img = pattern(33, 17);
		let out = panini_stereographic_blend(&img, &ProjectionParameters::default());
		assert_eq!(out.dimensions(), (33, 17));
	}

	#[test]
	fn max_radius_is_corner() {
		assert!((max_radius(64, 32) - 2.0f32.sqrt()).abs() < 1e-6);
	}
}
