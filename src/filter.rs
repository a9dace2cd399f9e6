use crate::remap::{to_u8, Border};
use image::RgbImage;
use ndarray::Array2;
use rayon::prelude::*;

/// Separable Gaussian blur with a reflect-101 border, kernel radius `ceil(3 * sigma)`.
pub fn gaussian_blur(image: &RgbImage, sigma: f32) -> RgbImage {
	if sigma <= 0.0 {
		return image.clone();
	}

	let radius = (sigma * 3.0).ceil() as i32;
	let kernel_size = (2 * radius + 1) as usize;
	let mut kernel = vec![0.0f32; kernel_size];
	let coeff = -0.5 / (sigma * sigma);

	for (i, k) in kernel.iter_mut().enumerate() {
		let d = i as f32 - radius as f32;
		*k = (d * d * coeff).exp();
	}
	let ksum: f32 = kernel.iter().sum();
	for v in &mut kernel {
		*v /= ksum;
	}

	separable(image, &kernel, Border::Reflect101)
}

/// Normalized `size`x`size` box filter (cv2.blur) with a reflect-101 border.
pub fn box_blur(image: &RgbImage, size: usize) -> RgbImage {
	if size <= 1 {
		return image.clone();
	}
	let kernel = vec![1.0 / size as f32; size];
	separable(image, &kernel, Border::Reflect101)
}

fn separable(image: &RgbImage, kernel: &[f32], border: Border) -> RgbImage {
	let (w, h) = (image.width() as usize, image.height() as usize);
	if w == 0 || h == 0 {
		return image.clone();
	}
	let anchor = (kernel.len() / 2) as i64;
	let src = image.as_raw();

	let mut temp = vec![0.0f32; w * h * 3];
	temp.par_chunks_mut(w * 3).enumerate().for_each(|(y, row)| {
		let src_row = &src[y * w * 3..(y + 1) * w * 3];
		for x in 0..w {
			let mut sum = [0.0f32; 3];
			for (i, k) in kernel.iter().enumerate() {
				let nx = border.fold(x as i64 + i as i64 - anchor, w);
				for c in 0..3 {
					sum[c] += src_row[nx * 3 + c] as f32 * k;
				}
			}
			row[x * 3..x * 3 + 3].copy_from_slice(&sum);
		}
	});

	let mut out = vec![0u8; w * h * 3];
	out.par_chunks_mut(w * 3).enumerate().for_each(|(y, row)| {
		for x in 0..w {
			let mut sum = [0.0f32; 3];
			for (i, k) in kernel.iter().enumerate() {
				let ny = border.fold(y as i64 + i as i64 - anchor, h);
				for c in 0..3 {
					sum[c] += temp[(ny * w + x) * 3 + c] * k;
				}
			}
			for c in 0..3 {
				row[x * 3 + c] = to_u8(sum[c]);
			}
		}
	});

	RgbImage::from_raw(w as u32, h as u32, out).unwrap_or_else(|| image.clone())
}

/// Binary dilation with a square `size`x`size` structuring element.
///
/// Pixels outside the image never contribute, matching cv2.dilate's default border.
pub fn dilate(mask: &Array2<bool>, size: usize, iterations: u32) -> Array2<bool> {
	let (h, w) = mask.dim();
	let r = (size / 2) as isize;
	let mut current = mask.clone();

	for _ in 0..iterations {
		let prev = current.clone();
		current = Array2::from_shape_fn((h, w), |(y, x)| {
			let y0 = (y as isize - r).max(0) as usize;
			let y1 = (y as isize + r).min(h as isize - 1) as usize;
			let x0 = (x as isize - r).max(0) as usize;
			let x1 = (x as isize + r).min(w as isize - 1) as usize;
			(y0..=y1).any(|ny| (x0..=x1).any(|nx| prev[[ny, nx]]))
		});
	}

	current
}
