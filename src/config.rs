//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\wavviz\config.toml
//! - macOS: ~/Library/Application Support/wavviz/config.toml
//! - Linux: ~/.config/wavviz/config.toml
//!
//! The file is human-readable and every section is optional; missing
//! fields take their defaults, and out-of-range visualizer values are
//! corrected when applied rather than rejected here.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::viz::Settings;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Capture and frame-rate settings used by the CLI hosts
    pub capture: CaptureConfig,

    /// Visualizer settings snapshot
    pub visualizer: Settings,
}

/// Capture settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Video frames per second (tick rate)
    pub fps: u32,

    /// Synthetic source sample rate
    pub sample_rate: u32,

    /// Synthetic source channel count
    pub channels: usize,

    /// Synthetic tone frequency in Hz
    pub tone_frequency: f64,

    /// Synthetic tone amplitude (0.0 - 1.0)
    pub tone_amplitude: f32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            fps: 60,
            sample_rate: 48000,
            channels: 2,
            tone_frequency: 1000.0,
            tone_amplitude: 0.5,
        }
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("wavviz"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from the default location.
///
/// Returns default config if the file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail: we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };

    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match load_from(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            tracing::warn!("Using default configuration");
            Config::default()
        }
    }
}

/// Load configuration from an explicit path.
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
    let config =
        toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
    tracing::info!("Loaded config from {:?}", path);
    Ok(config)
}

/// Save configuration to the default location.
///
/// Creates the config directory if it doesn't exist.
pub fn save(config: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path().ok_or(ConfigError::NoConfigDir)?;
    save_to(config, &path)?;
    Ok(path)
}

/// Save configuration to an explicit path.
pub fn save_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;
    }

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| ConfigError::Rename(temp_path, path.to_path_buf(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to read config file {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("Failed to parse config file {0}: {1}")]
    Parse(PathBuf, toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viz::settings::{CaptureTarget, DisplayMode, WindowFunction};

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[capture]"));
        assert!(toml.contains("[visualizer]"));
        assert!(toml.contains("display_mode = \"curve\""));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.capture.fps = 30;
        config.visualizer.display_mode = DisplayMode::SteppedBar;
        config.visualizer.window = WindowFunction::BlackmanHarris;
        config.visualizer.capture = CaptureTarget::OutputBus { mix: 3 };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        save_to(&config, &path).unwrap();
        assert!(!path.with_extension("toml.tmp").exists());

        let parsed = load_from(&path).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml = r#"
[visualizer]
display_mode = "meter"
floor = -80
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.visualizer.display_mode, DisplayMode::Meter);
        assert_eq!(config.visualizer.floor, -80);

        // Other fields use defaults
        assert_eq!(config.visualizer.ceiling, 0);
        assert_eq!(config.capture, CaptureConfig::default());
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "visualizer = [").unwrap();
        assert!(matches!(load_from(&path), Err(ConfigError::Parse(..))));

        let missing = dir.path().join("missing.toml");
        assert!(matches!(load_from(&missing), Err(ConfigError::Read(..))));
    }
}
