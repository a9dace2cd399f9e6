use anyhow::Result;
use std::path::PathBuf;

/// MiDaS v2.1 small, 256x256 input
pub const DEFAULT_DEPTH_MODEL: &str = "midas_v21_small_256.onnx";

/// Environment variable naming an extra checkpoint directory, searched first
pub const CHECKPOINTS_ENV: &str = "VR180_MAKER_CHECKPOINTS";

/// Candidate locations for a checkpoint, in search order (after the env var).
pub fn checkpoint_search_paths(checkpoint_name: &str) -> Vec<PathBuf> {
	vec![
		// Development: relative to the crate
		PathBuf::from(env!("CARGO_MANIFEST_DIR"))
			.join("checkpoints")
			.join(checkpoint_name),
		dirs::home_dir()
			.unwrap_or_default()
			.join(".vr180-maker")
			.join("checkpoints")
			.join(checkpoint_name),
		dirs::data_dir()
			.unwrap_or_default()
			.join("vr180-maker")
			.join("checkpoints")
			.join(checkpoint_name),
		PathBuf::from("checkpoints").join(checkpoint_name),
	]
}

/// Find the checkpoint file for a given model name
///
/// Searches `$VR180_MAKER_CHECKPOINTS` first, then the crate directory, the
/// home directory, the XDG data directory and finally `./checkpoints/`. A
/// name containing a path separator that exists as given is used directly.
pub fn find_checkpoint(checkpoint_name: &str) -> Result<PathBuf> {
	let direct = PathBuf::from(checkpoint_name);
	if direct.components().count() > 1 && direct.is_file() {
		return Ok(direct);
	}

	if let Ok(env_dir) = std::env::var(CHECKPOINTS_ENV) {
		let env_path = PathBuf::from(env_dir).join(checkpoint_name);
		if env_path.exists() {
			return Ok(env_path);
		}
	}

	let search_paths = checkpoint_search_paths(checkpoint_name);
	for path in &search_paths {
		if path.exists() {
			return Ok(path.clone());
		}
	}

	anyhow::bail!(
		"Checkpoint '{}' not found.\nSearched locations:\n{}",
		checkpoint_name,
		search_paths
			.iter()
			.map(|p| format!("  - {}", p.display()))
			.collect::<Vec<_>>()
			.join("\n")
	);
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn explicit_path_is_used_as_is() {
		let dir = tempfile::tempdir().unwrap();
		let model = dir.path().join("depth.onnx");
		std::fs::write(&model, b"onnx").unwrap();
		assert_eq!(find_checkpoint(model.to_str().unwrap()).unwrap(), model);
	}

	#[test]
	fn missing_checkpoint_lists_search_paths() {
		let err = find_checkpoint("definitely-not-a-model-3f9a.onnx").unwrap_err();
		let msg = err.to_string();
		assert!(msg.contains("definitely-not-a-model-3f9a.onnx"));
		assert!(msg.contains("checkpoints"));
	}
}
