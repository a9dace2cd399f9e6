use crate::error::{VrError, VrResult};
use crate::filter::{box_blur, dilate};
use crate::remap::to_u8;
use crate::stereo::OcclusionMask;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Neighbourhood radius used by both fast-marching fills
pub const INPAINT_RADIUS: f32 = 3.0;

/// Relaxation passes run over the hole after the diffusion fill's initial march
const DIFFUSION_PASSES: usize = 20;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InpaintMethod {
	/// Dilate the valid region, blur, then diffuse into the hole
	#[default]
	Mirror,
	/// Fast-marching fill
	Telea,
	/// Hand the hole to an [`InpaintModel`]
	#[serde(alias = "lama")]
	ExternalModel,
}

impl InpaintMethod {
	pub fn name(&self) -> &'static str {
		match self {
			InpaintMethod::Mirror => "mirror",
			InpaintMethod::Telea => "telea",
			InpaintMethod::ExternalModel => "external-model",
		}
	}
}

impl fmt::Display for InpaintMethod {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

impl FromStr for InpaintMethod {
	type Err = VrError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_lowercase().as_str() {
			"mirror" => Ok(InpaintMethod::Mirror),
			"telea" => Ok(InpaintMethod::Telea),
			"external-model" | "lama" => Ok(InpaintMethod::ExternalModel),
			other => Err(VrError::ConfigError(format!(
				"Unknown inpaint method '{}'. Use: mirror, telea, or external-model",
				other
			))),
		}
	}
}

/// A learned inpainting model living outside this crate.
pub trait InpaintModel: Send + Sync {
	fn inpaint(&self, frame: &RgbImage, mask: &OcclusionMask) -> VrResult<RgbImage>;
}

/// Fills occlusion holes left by view synthesis.
#[derive(Clone)]
pub struct OcclusionInpainter {
	method: InpaintMethod,
	model: Option<Arc<dyn InpaintModel>>,
}

impl fmt::Debug for OcclusionInpainter {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("OcclusionInpainter")
			.field("method", &self.method)
			.field("model", &self.model.is_some())
			.finish()
	}
}

impl OcclusionInpainter {
	/// `ExternalModel` without a model fails here, before any frame is touched.
	pub fn new(method: InpaintMethod, model: Option<Arc<dyn InpaintModel>>) -> VrResult<Self> {
		if method == InpaintMethod::ExternalModel && model.is_none() {
			return Err(VrError::ConfigError(
				"Inpaint method 'external-model' needs an inpainting model".to_string(),
			));
		}
		Ok(Self { method, model })
	}

	pub fn method(&self) -> InpaintMethod {
		self.method
	}

	pub fn inpaint(&self, frame: &RgbImage, mask: &OcclusionMask) -> VrResult<RgbImage> {
		let (width, height) = frame.dimensions();
		if mask.dim() != (height as usize, width as usize) {
			return Err(VrError::ImageError(format!(
				"Occlusion mask {:?} does not match view {}x{}",
				mask.dim(),
				width,
				height
			)));
		}

		if !mask.iter().any(|&m| m) {
			return Ok(frame.clone());
		}

		match self.method {
			InpaintMethod::Telea => Ok(telea_inpaint(frame, mask, INPAINT_RADIUS)),
			InpaintMethod::Mirror => Ok(mirror_inpaint(frame, mask)),
			InpaintMethod::ExternalModel => {
				let model = self.model.as_ref().ok_or_else(|| {
					VrError::ConfigError("No inpainting model configured".to_string())
				})?;
				let filled = model.inpaint(frame, mask)?;
				if filled.dimensions() != frame.dimensions() {
					return Err(VrError::ImageError(format!(
						"Inpainting model returned {:?}, expected {}x{}",
						filled.dimensions(),
						width,
						height
					)));
				}
				Ok(filled)
			}
		}
	}
}

/// Grow the valid region, black out what is left of the hole, box blur the
/// whole view, then diffuse into the original hole.
///
/// Despite the name this never reflects pixels; the blur also softens the
/// valid area by a 5x5 box.
pub fn mirror_inpaint(frame: &RgbImage, mask: &OcclusionMask) -> RgbImage {
	let valid = mask.mapv(|m| !m);
	let grown = dilate(&valid, 5, 2);

	let mut cleared = frame.clone();
	for (x, y, pixel) in cleared.enumerate_pixels_mut() {
		if !grown[[y as usize, x as usize]] {
			pixel.0 = [0, 0, 0];
		}
	}

	let blurred = box_blur(&cleared, 5);
	diffusion_inpaint(&blurred, mask, INPAINT_RADIUS)
}

/// Fast-marching inpaint weighted by direction, distance and level-set proximity.
pub fn telea_inpaint(frame: &RgbImage, mask: &OcclusionMask, radius: f32) -> RgbImage {
	let mut field = FillField::new(frame, mask);
	field.march(radius, Weighting::Directional);
	field.into_image(frame)
}

/// Fast-marching initial fill followed by Laplacian relaxation inside the hole.
pub fn diffusion_inpaint(frame: &RgbImage, mask: &OcclusionMask, radius: f32) -> RgbImage {
	let mut field = FillField::new(frame, mask);
	field.march(radius, Weighting::Isotropic);
	field.relax(DIFFUSION_PASSES);
	field.into_image(frame)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Flag {
	Known,
	Band,
	Inside,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Weighting {
	Directional,
	Isotropic,
}

/// Min-heap entry on arrival time
#[derive(Clone, Copy)]
struct Node {
	t: f32,
	idx: usize,
}

impl PartialEq for Node {
	fn eq(&self, other: &Self) -> bool {
		self.t.total_cmp(&other.t) == Ordering::Equal && self.idx == other.idx
	}
}

impl Eq for Node {}

impl PartialOrd for Node {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for Node {
	fn cmp(&self, other: &Self) -> Ordering {
		other
			.t
			.total_cmp(&self.t)
			.then_with(|| other.idx.cmp(&self.idx))
	}
}

struct FillField {
	width: usize,
	height: usize,
	color: Vec<[f32; 3]>,
	time: Vec<f32>,
	flags: Vec<Flag>,
	hole: Vec<bool>,
}

impl FillField {
	fn new(frame: &RgbImage, mask: &OcclusionMask) -> Self {
		let (width, height) = (frame.width() as usize, frame.height() as usize);
		let color = frame
			.pixels()
			.map(|p| [p[0] as f32, p[1] as f32, p[2] as f32])
			.collect();
		let hole: Vec<bool> = mask.iter().copied().collect();
		let flags = hole
			.iter()
			.map(|&h| if h { Flag::Inside } else { Flag::Known })
			.collect();
		let time = hole
			.iter()
			.map(|&h| if h { f32::INFINITY } else { 0.0 })
			.collect();

		Self {
			width,
			height,
			color,
			time,
			flags,
			hole,
		}
	}

	fn neighbours(&self, idx: usize) -> impl Iterator<Item = usize> {
		let (w, h) = (self.width, self.height);
		let (x, y) = (idx % w, idx / w);
		[
			(x > 0).then(|| idx - 1),
			(x + 1 < w).then(|| idx + 1),
			(y > 0).then(|| idx - w),
			(y + 1 < h).then(|| idx + w),
		]
		.into_iter()
		.flatten()
	}

	fn known_time(&self, idx: usize) -> f32 {
		if self.flags[idx] == Flag::Known {
			self.time[idx]
		} else {
			f32::INFINITY
		}
	}

	/// First-order upwind solution of |grad T| = 1 from known neighbours.
	fn arrival_time(&self, idx: usize) -> f32 {
		let (w, h) = (self.width, self.height);
		let (x, y) = (idx % w, idx / w);

		let mut tx = f32::INFINITY;
		if x > 0 {
			tx = tx.min(self.known_time(idx - 1));
		}
		if x + 1 < w {
			tx = tx.min(self.known_time(idx + 1));
		}
		let mut ty = f32::INFINITY;
		if y > 0 {
			ty = ty.min(self.known_time(idx - w));
		}
		if y + 1 < h {
			ty = ty.min(self.known_time(idx + w));
		}

		match (tx.is_finite(), ty.is_finite()) {
			(true, true) => {
				let d = tx - ty;
				if d.abs() >= 1.0 {
					tx.min(ty) + 1.0
				} else {
					(tx + ty + (2.0 - d * d).sqrt()) * 0.5
				}
			}
			(true, false) => tx + 1.0,
			(false, true) => ty + 1.0,
			(false, false) => f32::INFINITY,
		}
	}

	fn time_gradient(&self, idx: usize) -> (f32, f32) {
		let (w, h) = (self.width, self.height);
		let (x, y) = (idx % w, idx / w);
		let t = self.time[idx];
		let usable = |i: usize| self.flags[i] != Flag::Inside && self.time[i].is_finite();

		let axis = |lo: Option<usize>, hi: Option<usize>| -> f32 {
			match (lo.filter(|&i| usable(i)), hi.filter(|&i| usable(i))) {
				(Some(a), Some(b)) => (self.time[b] - self.time[a]) * 0.5,
				(Some(a), None) => t - self.time[a],
				(None, Some(b)) => self.time[b] - t,
				(None, None) => 0.0,
			}
		};

		let gx = axis((x > 0).then(|| idx - 1), (x + 1 < w).then(|| idx + 1));
		let gy = axis((y > 0).then(|| idx - w), (y + 1 < h).then(|| idx + w));
		(gx, gy)
	}

	fn fill_pixel(&mut self, idx: usize, radius: f32, weighting: Weighting) {
		let (w, h) = (self.width, self.height);
		let (px, py) = ((idx % w) as i64, (idx / w) as i64);
		let reach = radius.ceil() as i64;
		let (gx, gy) = self.time_gradient(idx);
		let t = self.time[idx];

		let mut sum = [0.0f32; 3];
		let mut weight_sum = 0.0f32;

		for qy in (py - reach).max(0)..=(py + reach).min(h as i64 - 1) {
			for qx in (px - reach).max(0)..=(px + reach).min(w as i64 - 1) {
				let q = qy as usize * w + qx as usize;
				if q == idx || self.flags[q] != Flag::Known {
					continue;
				}
				let rx = (px - qx) as f32;
				let ry = (py - qy) as f32;
				let len2 = rx * rx + ry * ry;
				if len2 > radius * radius {
					continue;
				}

				let dst = 1.0 / (len2 * len2.sqrt());
				let lev = 1.0 / (1.0 + (self.time[q] - t).abs());
				let mut weight = dst * lev;
				if weighting == Weighting::Directional {
					let mut dir = rx * gx + ry * gy;
					if dir.abs() <= 0.01 {
						dir = 1e-6;
					}
					weight *= dir.abs();
				}

				for c in 0..3 {
					sum[c] += weight * self.color[q][c];
				}
				weight_sum += weight;
			}
		}

		if weight_sum > 0.0 {
			for c in 0..3 {
				self.color[idx][c] = sum[c] / weight_sum;
			}
		}
	}

	fn march(&mut self, radius: f32, weighting: Weighting) {
		let mut heap = BinaryHeap::new();

		// Narrow band: known pixels touching the hole
		for idx in 0..self.flags.len() {
			if self.flags[idx] == Flag::Known
				&& self.neighbours(idx).any(|n| self.flags[n] == Flag::Inside)
			{
				self.flags[idx] = Flag::Band;
				heap.push(Node { t: 0.0, idx });
			}
		}

		while let Some(Node { t, idx }) = heap.pop() {
			if self.flags[idx] == Flag::Known || t > self.time[idx] {
				continue;
			}

			if self.hole[idx] {
				self.fill_pixel(idx, radius, weighting);
			}
			self.flags[idx] = Flag::Known;

			for n in self.neighbours(idx) {
				if self.flags[n] == Flag::Known {
					continue;
				}
				let arrival = self.arrival_time(n);
				if arrival < self.time[n] {
					self.time[n] = arrival;
					self.flags[n] = Flag::Band;
					heap.push(Node { t: arrival, idx: n });
				}
			}
		}
	}

	/// Jacobi passes replacing each hole pixel by its 4-neighbour mean.
	fn relax(&mut self, passes: usize) {
		let holes: Vec<usize> = (0..self.hole.len()).filter(|&i| self.hole[i]).collect();
		if holes.is_empty() {
			return;
		}

		for _ in 0..passes {
			let next: Vec<[f32; 3]> = holes
				.iter()
				.map(|&idx| {
					let mut sum = [0.0f32; 3];
					let mut count = 0.0f32;
					for n in self.neighbours(idx) {
						for c in 0..3 {
							sum[c] += self.color[n][c];
						}
						count += 1.0;
					}
					if count > 0.0 {
						sum.map(|v| v / count)
					} else {
						self.color[idx]
					}
				})
				.collect();

			for (&idx, value) in holes.iter().zip(next) {
				self.color[idx] = value;
			}
		}
	}

	fn into_image(self, frame: &RgbImage) -> RgbImage {
		let mut out = frame.clone();
		for (i, pixel) in out.pixels_mut().enumerate() {
			if self.hole[i] {
				pixel.0 = self.color[i].map(to_u8);
			}
		}
		out
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use image::Rgb;
	use ndarray::Array2;

	fn holed(width: u32, height: u32, columns: std::ops::Range<usize>) -> OcclusionMask {
		Array2::from_shape_fn((height as usize, width as usize), |(_, x)| columns.contains(&x))
	}

	#[test]
	fn method_parsing() {
		assert_eq!("mirror".parse::<InpaintMethod>().unwrap(), InpaintMethod::Mirror);
		assert_eq!("Telea".parse::<InpaintMethod>().unwrap(), InpaintMethod::Telea);
		assert_eq!(
			"external-model".parse::<InpaintMethod>().unwrap(),
			InpaintMethod::ExternalModel
		);
		assert_eq!("lama".parse::<InpaintMethod>().unwrap(), InpaintMethod::ExternalModel);
		assert!(matches!(
			"navier".parse::<InpaintMethod>(),
			Err(VrError::ConfigError(_))
		));
	}

	#[test]
	fn empty_mask_returns_input_unchanged() {
		let frame = RgbImage::from_fn(9, 7, |x, y| Rgb([x as u8 * 13, y as u8 * 31, 200]));
		let mask = Array2::from_elem((7, 9), false);
		for method in [InpaintMethod::Mirror, InpaintMethod::Telea] {
			let inpainter = OcclusionInpainter::new(method, None).unwrap();
			assert_eq!(inpainter.inpaint(&frame, &mask).unwrap(), frame);
		}
	}

	#[test]
	fn external_model_without_model_fails_at_construction() {
		let err = OcclusionInpainter::new(InpaintMethod::ExternalModel, None).unwrap_err();
		assert!(matches!(err, VrError::ConfigError(_)));
	}

	#[test]
	fn telea_fills_hole_from_surroundings() {
		let mut frame = RgbImage::from_pixel(16, 8, Rgb([90, 120, 150]));
		let mask = holed(16, 8, 0..3);
		for y in 0..8 {
			for x in 0..3 {
				frame.put_pixel(x, y, Rgb([255, 0, 255]));
			}
		}

		let filled = telea_inpaint(&frame, &mask, INPAINT_RADIUS);
		for (x, y, p) in filled.enumerate_pixels() {
			assert_eq!(p.0, [90, 120, 150], "pixel ({x}, {y})");
		}
	}

	#[test]
	fn telea_only_touches_masked_pixels() {
		let frame = RgbImage::from_fn(12, 6, |x, y| Rgb([x as u8 * 20, y as u8 * 40, 9]));
		let mask = holed(12, 6, 10..12);
		let filled = telea_inpaint(&frame, &mask, INPAINT_RADIUS);
		for (x, y, p) in filled.enumerate_pixels() {
			if x < 10 {
				assert_eq!(p, frame.get_pixel(x, y));
			}
		}
	}

	#[test]
	fn mirror_fill_replaces_blacked_out_hole() {
		// columns 22.. sit beyond the grown valid region and are zeroed before the blur
		let frame = RgbImage::from_pixel(24, 10, Rgb([60, 60, 60]));
		let inpainter = OcclusionInpainter::new(InpaintMethod::Mirror, None).unwrap();
		let filled = inpainter.inpaint(&frame, &holed(24, 10, 18..24)).unwrap();
		for (x, y, p) in filled.enumerate_pixels() {
			assert_eq!(p.0, [60, 60, 60], "pixel ({x}, {y})");
		}
	}

	#[test]
	fn mirror_fill_softens_valid_area() {
		let frame = RgbImage::from_fn(20, 10, |x, _| {
			if x % 2 == 0 { Rgb([200, 200, 200]) } else { Rgb([0, 0, 0]) }
		});
		let filled = mirror_inpaint(&frame, &holed(20, 10, 0..2));
		assert_ne!(filled.get_pixel(10, 5), frame.get_pixel(10, 5));
	}

	struct Paint(Rgb<u8>);

	impl InpaintModel for Paint {
		fn inpaint(&self, frame: &RgbImage, mask: &OcclusionMask) -> VrResult<RgbImage> {
			let mut out = frame.clone();
			for (x, y, p) in out.enumerate_pixels_mut() {
				if mask[[y as usize, x as usize]] {
					*p = self.0;
				}
			}
			Ok(out)
		}
	}

	#[test]
	fn external_model_is_delegated_to() {
		let inpainter = OcclusionInpainter::new(
			InpaintMethod::ExternalModel,
			Some(Arc::new(Paint(Rgb([1, 2, 3])))),
		)
		.unwrap();
		let frame = RgbImage::new(6, 2);
		let filled = inpainter.inpaint(&frame, &holed(6, 2, 0..1)).unwrap();
		assert_eq!(filled.get_pixel(0, 1).0, [1, 2, 3]);
		assert_eq!(filled.get_pixel(1, 1).0, [0, 0, 0]);
	}
}
