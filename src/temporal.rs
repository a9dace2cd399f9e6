use crate::remap::to_u8;
use image::RgbImage;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalWeights {
	pub current: f32,
	pub previous: f32,
}

impl Default for TemporalWeights {
	fn default() -> Self {
		Self {
			current: 0.8,
			previous: 0.2,
		}
	}
}

/// First-order exponential smoother over packed canvases.
///
/// Holds the last output it produced and nothing else. Frame N is only
/// defined once frame N-1 went through, so a single owner must feed it frames
/// in presentation order.
#[derive(Debug, Default)]
pub struct TemporalStabilizer {
	weights: TemporalWeights,
	previous: Option<RgbImage>,
}

impl TemporalStabilizer {
	pub fn new(weights: TemporalWeights) -> Self {
		Self {
			weights,
			previous: None,
		}
	}

	pub fn weights(&self) -> TemporalWeights {
		self.weights
	}

	pub fn has_state(&self) -> bool {
		self.previous.is_some()
	}

	/// Blend `current` with the previous output and remember the result.
	pub fn stabilize(&mut self, current: RgbImage) -> RgbImage {
		let output = match self.previous.take() {
			None => current,
			Some(previous) if previous.dimensions() != current.dimensions() => {
				tracing::warn!(
					previous = ?previous.dimensions(),
					current = ?current.dimensions(),
					"Canvas size changed, dropping temporal state"
				);
				current
			}
			Some(previous) => blend(&current, &previous, self.weights),
		};

		self.previous = Some(output.clone());
		output
	}

	/// Forget the carried frame, e.g. when a stream is cancelled.
	pub fn reset(&mut self) {
		self.previous = None;
	}
}

/// `round(wc * current + wp * previous)` per channel, saturating (cv2.addWeighted).
fn blend(current: &RgbImage, previous: &RgbImage, weights: TemporalWeights) -> RgbImage {
	let TemporalWeights {
		current: wc,
		previous: wp,
	} = weights;

	let data: Vec<u8> = current
		.as_raw()
		.iter()
		.zip(previous.as_raw())
		.map(|(&c, &p)| to_u8(c as f32 * wc + p as f32 * wp))
		.collect();

	RgbImage::from_raw(current.width(), current.height(), data)
		.unwrap_or_else(|| current.clone())
}

#[cfg(test)]
mod tests {
	use super::*;
	use image::Rgb;

	#[test]
	fn first_frame_passes_through() {
		let mut stabilizer = TemporalStabilizer::default();
		let frame = RgbImage::from_fn(8, 4, |x, y| Rgb([x as u8 * 30, y as u8 * 60, 255]));
		assert_eq!(stabilizer.stabilize(frame.clone()), frame);
		assert!(stabilizer.has_state());
	}

	#[test]
	fn identical_frames_are_a_fixed_point() {
		let mut stabilizer = TemporalStabilizer::default();
		let frame = RgbImage::from_fn(16, 8, |x, y| Rgb([(x * 16) as u8, (y * 32) as u8, 255]));
		stabilizer.stabilize(frame.clone());
		assert_eq!(stabilizer.stabilize(frame.clone()), frame);
		assert_eq!(stabilizer.stabilize(frame.clone()), frame);
	}

	#[test]
	fn blends_with_previous_output() {
		let mut stabilizer = TemporalStabilizer::default();
		stabilizer.stabilize(RgbImage::from_pixel(2, 2, Rgb([0, 100, 255])));
		let out = stabilizer.stabilize(RgbImage::from_pixel(2, 2, Rgb([100, 0, 255])));
		assert_eq!(out.get_pixel(0, 0).0, [80, 20, 255]);

		// the smoothed frame, not the raw input, becomes the next reference
		let out = stabilizer.stabilize(RgbImage::from_pixel(2, 2, Rgb([100, 0, 255])));
		assert_eq!(out.get_pixel(1, 1).0, [96, 4, 255]);
	}

	#[test]
	fn reset_and_resize_drop_state() {
		let mut stabilizer = TemporalStabilizer::default();
		stabilizer.stabilize(RgbImage::from_pixel(2, 2, Rgb([200, 200, 200])));
		stabilizer.reset();
		assert!(!stabilizer.has_state());

		let black = RgbImage::new(2, 2);
		assert_eq!(stabilizer.stabilize(black.clone()), black);

		let bigger = RgbImage::from_pixel(4, 2, Rgb([9, 9, 9]));
		assert_eq!(stabilizer.stabilize(bigger.clone()), bigger);
	}
}
