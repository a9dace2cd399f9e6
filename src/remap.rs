use image::RgbImage;

/// How a sampling coordinate outside the image is folded back inside.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Border {
	/// Clamp to the nearest edge pixel (`aaa|abcd|ddd`)
	Replicate,
	/// Mirror about the edge pixel without repeating it (`dcb|abcd|cba`)
	Reflect101,
}

impl Border {
	/// Map an integer index into `0..len`.
	pub fn fold(self, i: i64, len: usize) -> usize {
		let n = len as i64;
		if n <= 1 {
			return 0;
		}
		match self {
			Border::Replicate => i.clamp(0, n - 1) as usize,
			Border::Reflect101 => {
				let period = 2 * (n - 1);
				let mut j = i.rem_euclid(period);
				if j >= n {
					j = period - j;
				}
				j as usize
			}
		}
	}
}

/// Bilinear sample at a fractional coordinate.
///
/// Equivalent to cv2.remap with INTER_LINEAR and the given border mode.
pub fn sample_bilinear(image: &RgbImage, x: f32, y: f32, border: Border) -> [f32; 3] {
	let (width, height) = image.dimensions();
	let (width, height) = (width as usize, height as usize);

	let x0f = x.floor();
	let y0f = y.floor();
	let fx = x - x0f;
	let fy = y - y0f;

	let x0 = border.fold(x0f as i64, width) as u32;
	let x1 = border.fold(x0f as i64 + 1, width) as u32;
	let y0 = border.fold(y0f as i64, height) as u32;
	let y1 = border.fold(y0f as i64 + 1, height) as u32;

	let p00 = image.get_pixel(x0, y0);
	let p10 = image.get_pixel(x1, y0);
	let p01 = image.get_pixel(x0, y1);
	let p11 = image.get_pixel(x1, y1);

	let mut result = [0.0f32; 3];
	for c in 0..3 {
		let v0 = p00[c] as f32 * (1.0 - fx) + p10[c] as f32 * fx;
		let v1 = p01[c] as f32 * (1.0 - fx) + p11[c] as f32 * fx;
		result[c] = v0 * (1.0 - fy) + v1 * fy;
	}
	result
}

pub(crate) fn to_u8(v: f32) -> u8 {
	v.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
	use super::*;
	use image::Rgb;

	#[test]
	fn replicate_clamps() {
		assert_eq!(Border::Replicate.fold(-3, 5), 0);
		assert_eq!(Border::Replicate.fold(2, 5), 2);
		assert_eq!(Border::Replicate.fold(9, 5), 4);
	}

	#[test]
	fn reflect101_mirrors_without_edge_repeat() {
		// dcb|abcd|cba for len 4
		assert_eq!(Border::Reflect101.fold(-1, 4), 1);
		assert_eq!(Border::Reflect101.fold(-3, 4), 3);
		assert_eq!(Border::Reflect101.fold(4, 4), 2);
		assert_eq!(Border::Reflect101.fold(6, 4), 0);
		assert_eq!(Border::Reflect101.fold(0, 1), 0);
	}

	#[test]
	fn integer_coordinates_sample_exact_pixels() {
		let mut img = RgbImage::new(4, 3);
		img.put_pixel(2, 1, Rgb([200, 100, 50]));
		assert_eq!(sample_bilinear(&img, 2.0, 1.0, Border::Replicate), [200.0, 100.0, 50.0]);
	}

	#[test]
	fn half_pixel_sample_averages_neighbours() {
		let mut img = RgbImage::new(2, 1);
		img.put_pixel(0, 0, Rgb([0, 0, 0]));
		img.put_pixel(1, 0, Rgb([100, 200, 50]));
		let v = sample_bilinear(&img, 0.5, 0.0, Border::Replicate);
		assert_eq!(v, [50.0, 100.0, 25.0]);
	}
}
