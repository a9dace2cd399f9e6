use thiserror::Error;

pub type VrResult<T> = Result<T, VrError>;

#[derive(Debug, Error)]
pub enum VrError {
	#[error("Model error: {0}")]
	ModelError(String),
	#[error("Image error: {0}")]
	ImageError(String),
	#[error("Tensor error: {0}")]
	TensorError(String),
	#[error("I/O error: {0}")]
	IoError(String),
	#[error("Configuration error: {0}")]
	ConfigError(String),
	/// The depth estimator failed; the frame cannot be rendered without a depth field.
	#[error("Depth estimation failed: {0}")]
	DepthError(String),
	/// A frame could not be decoded. Streams skip these and keep going.
	#[error("Frame {index} unavailable: {reason}")]
	FrameUnavailable { index: u64, reason: String },
	#[error("Error: {0}")]
	Other(String),
}

impl From<std::io::Error> for VrError {
	fn from(e: std::io::Error) -> Self {
		VrError::IoError(e.to_string())
	}
}

impl From<image::ImageError> for VrError {
	fn from(e: image::ImageError) -> Self {
		VrError::ImageError(e.to_string())
	}
}

impl From<serde_json::Error> for VrError {
	fn from(e: serde_json::Error) -> Self {
		VrError::ConfigError(e.to_string())
	}
}
