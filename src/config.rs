use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::alert::ToneSettings;
use crate::court::CourtModel;
use crate::detection::{BallDetectorSettings, BounceSettings};
use crate::error::ConfigError;
use crate::replay::ReplaySettings;
use crate::runtime::RuntimeSettings;
use crate::state::CallSettings;

/// Directory name under the platform config dir
pub const APP_DIR_NAME: &str = "LineCall";

const CONFIG_FILE_NAME: &str = "config.json";

/// Session configuration.
///
/// Every section falls back to its defaults when missing from the file, so a
/// partial `config.json` only overrides what it names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Color segmentation of the ball
    pub detector: BallDetectorSettings,

    /// Bounce thresholds (normalized-y per second, seconds)
    pub bounce: BounceSettings,

    /// OUT-call debounce
    pub call: CallSettings,

    /// Replay retention, query window and capture spacing
    pub replay: ReplaySettings,

    /// Court polygon in normalized frame coordinates
    pub court: CourtModel,

    /// Worker frame budget and progress logging
    pub runtime: RuntimeSettings,

    /// OUT tone
    pub tone: ToneSettings,
}

impl Config {
    /// Load from the platform config directory.
    /// Creates a default config if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;

        if path.exists() {
            Self::load_from(&path)
        } else {
            let config = Config::default();
            config.save_to(&path)?;
            tracing::info!("✓ Created default config at: {}", path.display());
            tracing::info!("  Edit this file to customize settings.");
            Ok(config)
        }
    }

    /// Load from an explicit file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let load_failed = |source: Box<dyn std::error::Error + Send + Sync>| {
            ConfigError::LoadFailed {
                path: path.display().to_string(),
                source,
            }
        };

        let content = fs::read_to_string(path).map_err(|e| load_failed(Box::new(e)))?;
        let config: Config = serde_json::from_str(&content).map_err(|e| load_failed(Box::new(e)))?;

        tracing::info!("✓ Loaded config from: {}", path.display());
        Ok(config)
    }

    /// Save to the platform config directory
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::DirectoryCreationFailed {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let save_failed = |source: Box<dyn std::error::Error + Send + Sync>| {
            ConfigError::SaveFailed {
                path: path.display().to_string(),
                source,
            }
        };

        let json = serde_json::to_string_pretty(self).map_err(|e| save_failed(Box::new(e)))?;
        fs::write(path, json).map_err(|e| save_failed(Box::new(e)))?;

        Ok(())
    }

    /// `<config_dir>/LineCall`
    pub fn app_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::app_dir()?.join(CONFIG_FILE_NAME))
    }

    /// Config file path for display purposes
    pub fn config_path_display() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    }

    /// Clamp every section to usable values, logging each correction.
    ///
    /// Only corrections are logged, so validating an already validated
    /// config is silent. The court is kept as given.
    pub fn validated(self) -> Self {
        Self {
            detector: self.detector.validated(),
            bounce: self.bounce.validated(),
            call: self.call.validated(),
            replay: self.replay.validated(),
            court: self.court,
            runtime: self.runtime.validated(),
            tone: self.tone,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::NormalizedPoint;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.detector.sampling_stride, 2);
        assert_eq!(config.detector.minimum_matches, 24);
        assert_eq!(config.bounce.min_bounce_interval, 0.35);
        assert_eq!(config.call.out_debounce_seconds, 0.8);
        assert_eq!(config.replay.retention_seconds, 8.0);
        assert_eq!(config.replay.window_seconds, 5.0);
        assert_eq!(config.court, CourtModel::default_singles());
        assert_eq!(config.runtime.frame_budget_ms, 33.0);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let json = r#"{
            "call": { "out_debounce_seconds": 1.5 },
            "court": { "boundary": [
                { "x": 0.0, "y": 0.0 }, { "x": 1.0, "y": 0.0 }, { "x": 0.5, "y": 1.0 }
            ] }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.call.out_debounce_seconds, 1.5);
        assert_eq!(config.court.boundary().len(), 3);
        assert!(config.court.contains(NormalizedPoint::new(0.5, 0.3)));
        assert_eq!(config.bounce, BounceSettings::default());
        assert_eq!(config.replay, ReplaySettings::default());
    }

    #[test]
    fn test_validated_clamps_sections() {
        let mut config = Config::default();
        config.detector.sampling_stride = 0;
        config.bounce.min_down_velocity = -3.0;
        config.call.out_debounce_seconds = f64::INFINITY;
        config.replay.window_seconds = 20.0;

        let config = config.validated();
        assert_eq!(config.detector.sampling_stride, 2);
        assert_eq!(config.bounce.min_down_velocity, 0.10);
        assert_eq!(config.call.out_debounce_seconds, 0.8);
        assert_eq!(config.replay.window_seconds, 8.0);
    }

    #[test]
    fn test_second_validation_changes_nothing() {
        let mut config = Config::default();
        config.detector.minimum_matches = 0;
        config.detector.max_fill_ratio = f64::NAN;
        config.bounce.min_bounce_interval = -1.0;
        config.replay.retention_seconds = 0.0;
        config.replay.window_seconds = 30.0;
        config.replay.snapshot_interval_seconds = -0.5;
        config.runtime.frame_budget_ms = 0.0;
        config.court = CourtModel::new(vec![NormalizedPoint::new(0.5, 0.5)]);

        // Components validate their own sections again; that pass must be a no-op
        let once = config.validated();
        assert_eq!(once.clone().validated(), once);
        assert_eq!(once.detector.clone().validated(), once.detector);
        assert_eq!(once.replay.clone().validated(), once.replay);

        // A degenerate court is kept, not replaced
        assert_eq!(once.court.boundary().len(), 1);
    }

    #[test]
    fn test_save_and_load_from_path() {
        let dir = std::env::temp_dir().join(format!("line-call-config-{}", std::process::id()));
        let path = dir.join("nested").join(CONFIG_FILE_NAME);

        let mut config = Config::default();
        config.replay.window_seconds = 3.0;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.replay.window_seconds, 3.0);

        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::LoadFailed { .. })
        ));

        fs::remove_dir_all(&dir).unwrap();
    }
}
