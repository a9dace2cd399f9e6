use crate::error::{VrError, VrResult};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
	pub width: u32,
	pub height: u32,
}

impl Resolution {
	pub const fn new(width: u32, height: u32) -> Self {
		Self { width, height }
	}
}

/// 8K side-by-side, what the fisheye playback shader expects
impl Default for Resolution {
	fn default() -> Self {
		Self::new(7680, 3840)
	}
}

impl fmt::Display for Resolution {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}x{}", self.width, self.height)
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageEncoding {
	Jpeg { quality: u8 },
	Png,
}

impl ImageEncoding {
	pub fn from_path<P: AsRef<Path>>(path: P, quality: u8) -> Self {
		let ext = path
			.as_ref()
			.extension()
			.and_then(|e| e.to_str())
			.unwrap_or("")
			.to_lowercase();

		match ext.as_str() {
			"png" => ImageEncoding::Png,
			_ => ImageEncoding::Jpeg { quality },
		}
	}
}

/// Places the two eye views side by side and scales the canvas to the
/// playback resolution.
///
/// Left always occupies the first half-width and right the second; the player
/// shader depends on both that order and the target size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FramePacker {
	target: Resolution,
}

impl Default for FramePacker {
	fn default() -> Self {
		Self::new(Resolution::default())
	}
}

impl FramePacker {
	pub fn new(target: Resolution) -> Self {
		Self { target }
	}

	pub fn target(&self) -> Resolution {
		self.target
	}

	pub fn pack(&self, left: &RgbImage, right: &RgbImage) -> VrResult<RgbImage> {
		let canvas = create_sbs_image(left, right)?;
		Ok(upscale(&canvas, self.target))
	}
}

pub fn create_sbs_image(left: &RgbImage, right: &RgbImage) -> VrResult<RgbImage> {
	if left.dimensions() != right.dimensions() {
		return Err(VrError::ImageError(format!(
			"Left and right views must have the same size: {:?} != {:?}",
			left.dimensions(),
			right.dimensions()
		)));
	}

	let (width, height) = left.dimensions();
	let mut combined = RgbImage::new(width * 2, height);

	image::imageops::overlay(&mut combined, left, 0, 0);
	image::imageops::overlay(&mut combined, right, width as i64, 0);

	Ok(combined)
}

/// Lanczos3 resample to `target`; a canvas already at that size is returned as is.
pub fn upscale(canvas: &RgbImage, target: Resolution) -> RgbImage {
	if canvas.dimensions() == (target.width, target.height) {
		return canvas.clone();
	}
	image::imageops::resize(
		canvas,
		target.width,
		target.height,
		image::imageops::FilterType::Lanczos3,
	)
}

pub fn save_frame(
	canvas: &RgbImage,
	output_path: impl AsRef<Path>,
	encoding: ImageEncoding,
) -> VrResult<()> {
	let output_path = output_path.as_ref();

	if let Some(parent) = output_path.parent() {
		if !parent.as_os_str().is_empty() {
			std::fs::create_dir_all(parent).map_err(|e| {
				VrError::IoError(format!("Failed to create output directory: {}", e))
			})?;
		}
	}

	match encoding {
		ImageEncoding::Jpeg { quality } => {
			let file = std::fs::File::create(output_path).map_err(|e| {
				VrError::IoError(format!("Failed to create output file: {}", e))
			})?;

			let mut jpeg_encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
				std::io::BufWriter::new(file),
				quality,
			);
			jpeg_encoder
				.encode(
					canvas.as_raw(),
					canvas.width(),
					canvas.height(),
					image::ExtendedColorType::Rgb8,
				)
				.map_err(|e| VrError::ImageError(format!("Failed to encode JPEG: {}", e)))?;
		}
		ImageEncoding::Png => {
			canvas
				.save_with_format(output_path, image::ImageFormat::Png)
				.map_err(|e| VrError::ImageError(format!("Failed to save PNG: {}", e)))?;
		}
	}

	Ok(())
}
