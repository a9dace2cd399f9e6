use crate::depth::DepthField;
use ndarray::Array2;

/// Horizontal pixel offset between the two eyes, shaped like the depth field.
pub type DisparityField = Array2<f32>;

/// Smallest depth used when inverting, so depth 0 stays finite.
pub const DEPTH_EPSILON: f32 = 1e-3;

/// `width / fov_deg * max_deg`: the largest disparity any pixel may receive.
pub fn max_disparity_px(width: usize, fov_deg: f32, max_deg: f32) -> f32 {
	width as f32 / fov_deg * max_deg
}

/// Map depth to disparity proportional to inverse depth.
///
/// Values are normalized by the frame's own maximum, so the closest pixel
/// always lands exactly on the cap. A uniform depth field therefore produces
/// a uniform field at the cap, not zero disparity.
pub fn disparity_from_depth(depth: &DepthField, fov_deg: f32, max_deg: f32) -> DisparityField {
	let (_, width) = depth.dim();
	let max_disp_px = max_disparity_px(width, fov_deg, max_deg);

	let mut disp = depth.mapv(|d| 1.0 / d.max(DEPTH_EPSILON));
	let peak = disp.iter().copied().fold(0.0f32, f32::max).max(1e-6);
	disp.mapv_inplace(|v| v / peak * max_disp_px);
	disp
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cap_follows_width_and_fov() {
		assert_eq!(max_disparity_px(900, 90.0, 1.5), 15.0);
		assert_eq!(max_disparity_px(1920, 90.0, 1.0), 1920.0 / 90.0);
	}

	#[test]
	fn never_exceeds_cap() {
		let depth = Array2::from_shape_fn((20, 180), |(y, x)| ((x * 7 + y * 13) % 101) as f32 / 100.0);
		let cap = max_disparity_px(180, 90.0, 1.5);
		let disp = disparity_from_depth(&depth, 90.0, 1.5);
		assert!(disp.iter().all(|&d| d <= cap));
		assert!(disp.iter().any(|&d| d == cap));
	}

	#[test]
	fn uniform_depth_gives_uniform_cap() {
		// Self-normalization: uniform depth is "all equally closest", not "flat".
		for value in [0.0, 0.25, 1.0] {
			let depth = Array2::from_elem((8, 90), value);
			let disp = disparity_from_depth(&depth, 90.0, 1.5);
			assert!(disp.iter().all(|&d| d == 1.5), "depth {value}");
		}
	}

	#[test]
	fn smallest_depth_value_takes_the_cap() {
		let mut depth = Array2::from_elem((1, 90), 1.0);
		depth[[0, 10]] = 0.5;
		let disp = disparity_from_depth(&depth, 90.0, 1.5);
		// 1/0.5 = 2 is the largest inverse, everything else scales against it
		assert!((disp[[0, 10]] - 1.5).abs() < 1e-6);
		assert!((disp[[0, 0]] - 0.75).abs() < 1e-6);
	}
}
