use crate::error::{VrError, VrResult};
use crate::foveation::FoveationParameters;
use crate::inpaint::InpaintMethod;
use crate::output::Resolution;
use crate::projection::ProjectionParameters;
use crate::temporal::TemporalWeights;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Every tunable value the frame pipeline consumes.
///
/// Missing JSON fields fall back to the defaults below, so a config file only
/// needs to name what it changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VrConfig {
	/// Comfort cap on stereo disparity, in degrees of visual angle (1.0-1.5 recommended)
	pub max_disparity_deg: f32,
	/// Horizontal field of view assumed when converting degrees to pixels
	pub assumed_fov_deg: f32,
	pub inpaint_method: InpaintMethod,
	pub projection: ProjectionParameters,
	pub foveation: FoveationParameters,
	pub target_resolution: Resolution,
	pub temporal: TemporalWeights,
	/// Frames rendered concurrently by the video path
	pub workers: usize,
}

impl Default for VrConfig {
	fn default() -> Self {
		Self {
			max_disparity_deg: 1.5,
			assumed_fov_deg: 90.0,
			inpaint_method: InpaintMethod::Mirror,
			projection: ProjectionParameters::default(),
			foveation: FoveationParameters::default(),
			target_resolution: Resolution::default(),
			temporal: TemporalWeights::default(),
			workers: default_workers(),
		}
	}
}

fn default_workers() -> usize {
	std::thread::available_parallelism()
		.map(|n| n.get())
		.unwrap_or(4)
}

impl VrConfig {
	pub fn from_json_str(json: &str) -> VrResult<Self> {
		let config: VrConfig = serde_json::from_str(json)?;
		config.validate()?;
		Ok(config)
	}

	pub fn from_json_file(path: impl AsRef<Path>) -> VrResult<Self> {
		let path = path.as_ref();
		let raw = std::fs::read_to_string(path).map_err(|e| {
			VrError::ConfigError(format!("Failed to read config {:?}: {}", path, e))
		})?;
		Self::from_json_str(&raw)
	}

	/// Rejects values the pipeline cannot work with. Projection weights are
	/// not checked here; they are clamped when the warp is applied.
	pub fn validate(&self) -> VrResult<()> {
		if !self.max_disparity_deg.is_finite() || self.max_disparity_deg < 0.0 {
			return Err(VrError::ConfigError(format!(
				"max_disparity_deg must be a non-negative number, got {}",
				self.max_disparity_deg
			)));
		}
		if !(self.assumed_fov_deg.is_finite() && self.assumed_fov_deg > 0.0) {
			return Err(VrError::ConfigError(format!(
				"assumed_fov_deg must be positive, got {}",
				self.assumed_fov_deg
			)));
		}

		self.foveation.validate()?;

		if self.target_resolution.width == 0 || self.target_resolution.height == 0 {
			return Err(VrError::ConfigError(format!(
				"target_resolution must be non-zero, got {}",
				self.target_resolution
			)));
		}

		let TemporalWeights { current, previous } = self.temporal;
		if !(current.is_finite() && previous.is_finite()) || current < 0.0 || previous < 0.0 {
			return Err(VrError::ConfigError(format!(
				"temporal weights must be non-negative, got {} / {}",
				current, previous
			)));
		}

		if self.workers == 0 {
			return Err(VrError::ConfigError("workers must be at least 1".to_string()));
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	#[test]
	fn defaults_match_documented_values() {
		let config = VrConfig::default();
		assert_eq!(config.max_disparity_deg, 1.5);
		assert_eq!(config.assumed_fov_deg, 90.0);
		assert_eq!(config.inpaint_method, InpaintMethod::Mirror);
		assert_eq!(config.projection.panini_weight, 0.7);
		assert_eq!(config.projection.stereo_weight, 0.2);
		assert_eq!(config.foveation.start_deg, 70.0);
		assert_eq!(config.foveation.full_fov_deg, 180.0);
		assert_eq!(config.foveation.vignette_strength, 0.2);
		assert_eq!(config.target_resolution, Resolution::new(7680, 3840));
		assert_eq!(config.temporal.current, 0.8);
		assert_eq!(config.temporal.previous, 0.2);
		assert!(config.validate().is_ok());
	}

	#[test]
	fn partial_json_keeps_defaults() {
		let config = VrConfig::from_json_str(
			r#"{ "max_disparity_deg": 1.0, "inpaint_method": "telea", "target_resolution": { "width": 3840, "height": 1920 } }"#,
		)
		.unwrap();
		assert_eq!(config.max_disparity_deg, 1.0);
		assert_eq!(config.inpaint_method, InpaintMethod::Telea);
		assert_eq!(config.target_resolution, Resolution::new(3840, 1920));
		assert_eq!(config.assumed_fov_deg, 90.0);
		assert_eq!(config.foveation, FoveationParameters::default());
	}

	#[test]
	fn unknown_inpaint_method_is_config_error() {
		let err = VrConfig::from_json_str(r#"{ "inpaint_method": "smear" }"#).unwrap_err();
		assert!(matches!(err, VrError::ConfigError(_)), "got {err:?}");
	}

	#[test]
	fn foveation_start_past_half_fov_is_rejected() {
		let mut config = VrConfig::default();
		config.foveation.start_deg = 90.0;
		assert!(matches!(config.validate(), Err(VrError::ConfigError(_))));
	}

	#[test]
	fn zero_fov_and_zero_resolution_are_rejected() {
		let mut config = VrConfig::default();
		config.assumed_fov_deg = 0.0;
		assert!(config.validate().is_err());

		let mut config = VrConfig::default();
		config.target_resolution = Resolution::new(0, 3840);
		assert!(config.validate().is_err());

		let mut config = VrConfig::default();
		config.temporal.previous = -0.1;
		assert!(config.validate().is_err());
	}

	#[test]
	fn out_of_range_projection_weights_are_accepted() {
		let mut config = VrConfig::default();
		config.projection.panini_weight = 0.9;
		config.projection.stereo_weight = 0.9;
		assert!(config.validate().is_ok());
	}

	#[test]
	fn loads_from_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(file, r#"{{ "workers": 2, "foveation": {{ "start_deg": 60.0 }} }}"#).unwrap();

		let config = VrConfig::from_json_file(file.path()).unwrap();
		assert_eq!(config.workers, 2);
		assert_eq!(config.foveation.start_deg, 60.0);
		assert_eq!(config.foveation.full_fov_deg, 180.0);
	}

	#[test]
	fn missing_file_is_config_error() {
		let dir = tempfile::tempdir().unwrap();
		let err = VrConfig::from_json_file(dir.path().join("absent.json")).unwrap_err();
		assert!(matches!(err, VrError::ConfigError(_)));
	}
}
