use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::audio::{DEFAULT_SAMPLE_RATE, MIN_WAVEPOINT_HISTORY};
use crate::node::NodeConfig;
use crate::sound::SequenceApi;

/// Returns the path to the settings file: `~/.config/livewave/settings.json`
pub fn settings_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("livewave");
    path.push("settings.json");
    path
}

/// Persisted application settings.
///
/// Serialized as JSON to the platform config directory.
/// Fields use `#[serde(default)]` so that adding new settings
/// won't break existing config files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    // Node
    pub node: NodeConfig,

    // Capture
    pub sample_rate: u32,
    pub retention: usize,

    // Host
    pub fps: f64,
    pub sequence_api: SequenceApi,

    // View
    pub line_width: f32,
    pub zoom: f32,
    pub show_graticule: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),

            sample_rate: DEFAULT_SAMPLE_RATE,
            retention: MIN_WAVEPOINT_HISTORY,

            fps: 24.0,
            sequence_api: SequenceApi::default(),

            line_width: 1.5,
            zoom: 1.0,
            show_graticule: true,
        }
    }
}

impl AppSettings {
    /// Load settings from disk, falling back to defaults on any error.
    pub fn load() -> Self {
        Self::load_from(&settings_path())
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Self>(&contents) {
                Ok(settings) => {
                    log::info!("Loaded settings from {}", path.display());
                    settings.sanitized()
                }
                Err(e) => {
                    log::warn!("Failed to parse settings ({}), using defaults", e);
                    Self::default()
                }
            },
            Err(e) => {
                log::info!("No settings file found ({}), using defaults", e);
                Self::default()
            }
        }
    }

    /// Save settings to disk as pretty JSON.
    pub fn save(&self) {
        self.save_to(&settings_path());
    }

    pub fn save_to(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::warn!("Failed to create config directory: {}", e);
                return;
            }
        }
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    log::warn!("Failed to write settings: {}", e);
                }
            }
            Err(e) => {
                log::warn!("Failed to serialize settings: {}", e);
            }
        }
    }

    /// A zero frame rate or sample rate would break the time arithmetic
    fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if !(self.fps.is_finite() && self.fps > 0.0) {
            log::warn!("Ignoring invalid fps {}, using {}", self.fps, defaults.fps);
            self.fps = defaults.fps;
        }
        if self.sample_rate == 0 {
            log::warn!("Ignoring zero sample rate, using {}", defaults.sample_rate);
            self.sample_rate = defaults.sample_rate;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = AppSettings::load_from(&dir.path().join("settings.json"));
        assert_eq!(settings, AppSettings::default());
        assert_eq!(settings.retention, 1 << 15);
        assert!(settings.node.mono);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut settings = AppSettings::default();
        settings.node.device_id = "3".to_string();
        settings.node.gain = 0.5;
        settings.node.mono = false;
        settings.sequence_api = SequenceApi::Legacy;
        settings.save_to(&path);

        assert_eq!(AppSettings::load_from(&path), settings);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "fps": 30.0, "node": { "gain": 2.0 } }"#).unwrap();

        let settings = AppSettings::load_from(&path);
        assert_eq!(settings.fps, 30.0);
        assert_eq!(settings.node.gain, 2.0);
        assert_eq!(settings.node.frame_offset, 0);
        assert_eq!(settings.sample_rate, 44_100);
    }

    #[test]
    fn test_invalid_values_are_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "fps": 0.0, "sample_rate": 0 }"#).unwrap();

        let settings = AppSettings::load_from(&path);
        assert_eq!(settings.fps, 24.0);
        assert_eq!(settings.sample_rate, 44_100);
    }

    #[test]
    fn test_garbage_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json").unwrap();

        assert_eq!(AppSettings::load_from(&path), AppSettings::default());
    }
}
