use crate::depth::DepthEstimator;
use crate::error::{VrError, VrResult};
use image::RgbImage;
use ndarray::Array2;
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::sync::Mutex;

/// MiDaS v2.1 small runs at a fixed 256x256 input
const INPUT_SIZE: u32 = 256;
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

pub struct OnnxDepthEstimator {
	session: Mutex<Session>,
}

impl OnnxDepthEstimator {
	pub fn new(model_path: &str) -> VrResult<Self> {
		let session = Session::builder()
			.map_err(|e| VrError::ModelError(format!("Failed to create session: {}", e)))?
			.with_optimization_level(GraphOptimizationLevel::Level3)
			.map_err(|e| VrError::ModelError(format!("Failed to set opt level: {}", e)))?
			.with_intra_threads(4)
			.map_err(|e| VrError::ModelError(format!("Failed to set threads: {}", e)))?
			.commit_from_file(model_path)
			.map_err(|e| VrError::ModelError(format!("Failed to load ONNX model: {}", e)))?;

		tracing::info!(model = model_path, "ONNX depth model loaded");

		Ok(Self {
			session: Mutex::new(session),
		})
	}
}

impl DepthEstimator for OnnxDepthEstimator {
	fn estimate_raw(&self, frame: &RgbImage) -> VrResult<Array2<f32>> {
		let size = INPUT_SIZE as usize;

		let resized = image::imageops::resize(
			frame,
			INPUT_SIZE,
			INPUT_SIZE,
			image::imageops::FilterType::Triangle,
		);

		// NCHW, mean-subtracted only
		let mut input_data = vec![0.0f32; 3 * size * size];
		for (i, pixel) in resized.pixels().enumerate() {
			for c in 0..3 {
				input_data[c * size * size + i] = pixel[c] as f32 / 255.0 - IMAGENET_MEAN[c];
			}
		}

		let input_value = ort::value::Value::from_array(([1usize, 3, size, size], input_data))
			.map_err(|e| VrError::TensorError(format!("Failed to create input: {}", e)))?;

		let mut session = self
			.session
			.lock()
			.map_err(|_| VrError::ModelError("Depth session lock poisoned".to_string()))?;

		let outputs = session
			.run(ort::inputs![input_value])
			.map_err(|e| VrError::DepthError(format!("Inference failed: {}", e)))?;

		let (shape, data) = outputs[0]
			.try_extract_tensor::<f32>()
			.map_err(|e| VrError::TensorError(format!("Failed to extract output: {}", e)))?;

		// [1, H, W] or [1, 1, H, W]
		let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
		if dims.len() < 2 {
			return Err(VrError::TensorError(format!(
				"Unexpected depth output shape: {:?}",
				dims
			)));
		}
		let h = dims[dims.len() - 2];
		let w = dims[dims.len() - 1];

		Array2::from_shape_vec((h, w), data[..h * w].to_vec())
			.map_err(|e| VrError::TensorError(format!("Failed to reshape depth: {}", e)))
	}
}
