//! Repository configuration: `.store/config.json`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, StrataError};

/// The highest config schema version this binary understands. Opening a
/// repository whose `config.json` names a newer version is refused rather
/// than silently ignoring fields it doesn't know about.
pub const CURRENT_VERSION: &str = "1";

/// Built-in blob size ceiling used when `max_blob_size` is `0`.
pub const DEFAULT_MAX_BLOB_SIZE: u64 = 100 * 1024 * 1024;

/// Typed view over `.store/config.json`. Unknown keys are preserved in
/// `extra` so `strata init`-then-edit round-trips without losing fields an
/// older or newer binary doesn't recognize.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RepoConfig {
    pub version: String,
    #[serde(default = "default_lane")]
    pub default_lane: String,
    #[serde(default)]
    pub created_at: f64,
    /// `0` means "use the built-in default."
    #[serde(default)]
    pub max_blob_size: i64,
    /// `0` means "use the built-in default."
    #[serde(default)]
    pub max_tree_depth: i64,
    /// `0` disables filesystem overflow.
    #[serde(default)]
    pub blob_threshold: i64,
    /// Subprocess evaluators run by `strata evaluate` / `strata accept --run-evaluators`.
    #[serde(default)]
    pub evaluators: Vec<crate::evaluator::EvaluatorConfig>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

fn default_lane() -> String {
    "main".to_owned()
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION.to_owned(),
            default_lane: default_lane(),
            created_at: 0.0,
            max_blob_size: 0,
            max_tree_depth: 0,
            blob_threshold: 0,
            evaluators: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }
}

impl RepoConfig {
    #[must_use]
    pub fn max_blob_size_u64(&self) -> u64 {
        let value = u64::try_from(self.max_blob_size).unwrap_or(0);
        if value == 0 {
            DEFAULT_MAX_BLOB_SIZE
        } else {
            value
        }
    }

    #[must_use]
    pub fn max_tree_depth_u64(&self) -> u64 {
        u64::try_from(self.max_tree_depth).unwrap_or(0)
    }

    #[must_use]
    pub fn blob_threshold_u64(&self) -> u64 {
        u64::try_from(self.blob_threshold).unwrap_or(0)
    }
}

/// Loads and validates `.store/config.json`. Missing file yields defaults.
pub fn load(path: &Path) -> Result<RepoConfig> {
    if !path.exists() {
        return Ok(RepoConfig::default());
    }
    let bytes = std::fs::read(path).map_err(|e| StrataError::IoFailure {
        context: "reading config.json".to_owned(),
        source: e,
    })?;
    let config: RepoConfig = serde_json::from_slice(&bytes).map_err(|e| StrataError::ConfigInvalid {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    validate(&config, path)?;
    Ok(config)
}

fn validate(config: &RepoConfig, path: &Path) -> Result<()> {
    if version_tuple(&config.version) > version_tuple(CURRENT_VERSION) {
        return Err(StrataError::ConfigInvalid {
            path: path.to_path_buf(),
            detail: format!("config version '{}' is newer than this binary supports ('{CURRENT_VERSION}')", config.version),
        });
    }
    for (field, value) in [
        ("max_blob_size", config.max_blob_size),
        ("max_tree_depth", config.max_tree_depth),
        ("blob_threshold", config.blob_threshold),
    ] {
        if value < 0 {
            return Err(StrataError::ConfigInvalid {
                path: path.to_path_buf(),
                detail: format!("'{field}' must not be negative, got {value}"),
            });
        }
    }
    Ok(())
}

/// Parses a dotted version string into a comparable tuple, tolerating
/// non-numeric or short strings by treating missing components as zero.
fn version_tuple(s: &str) -> Vec<u64> {
    s.split('.').map(|p| p.parse().unwrap_or(0)).collect()
}

/// Writes `.store/config.json` atomically.
pub fn save(path: &Path, config: &RepoConfig) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(|e| StrataError::IoFailure {
        context: "creating .store directory".to_owned(),
        source: e,
    })?;
    let bytes = serde_json::to_vec_pretty(config).unwrap_or_default();
    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| StrataError::IoFailure {
        context: "creating temp config file".to_owned(),
        source: e,
    })?;
    use std::io::Write;
    tmp.write_all(&bytes).map_err(|e| StrataError::IoFailure {
        context: "writing temp config file".to_owned(),
        source: e,
    })?;
    tmp.persist(path).map_err(|e| StrataError::IoFailure {
        context: "renaming config file into place".to_owned(),
        source: e.error,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(&dir.path().join("config.json")).unwrap();
        assert_eq!(config.default_lane, "main");
    }

    #[test]
    fn round_trips_through_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = RepoConfig::default();
        config.max_blob_size = 4096;
        save(&path, &config).unwrap();
        let read_back = load(&path).unwrap();
        assert_eq!(read_back.max_blob_size, 4096);
    }

    #[test]
    fn refuses_newer_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, br#"{"version": "999"}"#).unwrap();
        assert!(matches!(load(&path), Err(StrataError::ConfigInvalid { .. })));
    }

    #[test]
    fn rejects_negative_limits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, br#"{"version": "1", "max_blob_size": -1}"#).unwrap();
        assert!(matches!(load(&path), Err(StrataError::ConfigInvalid { .. })));
    }

    #[test]
    fn unknown_keys_are_preserved_not_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, br#"{"version": "1", "some_future_key": {"a": 1}}"#).unwrap();
        let config = load(&path).unwrap();
        assert!(config.extra.contains_key("some_future_key"));
    }

    #[test]
    fn zero_means_default() {
        let config = RepoConfig::default();
        assert_eq!(config.max_blob_size_u64(), DEFAULT_MAX_BLOB_SIZE);
        assert_eq!(config.max_tree_depth_u64(), 0);
    }
}
