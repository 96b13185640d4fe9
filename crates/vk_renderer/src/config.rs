//! Renderer configuration
//!
//! All knobs that used to be scattered global constants live in one
//! immutable struct, constructed once at startup and passed by reference
//! into the Vulkan initialization path. The struct can be overridden from
//! an optional TOML file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file exists but could not be read
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid TOML for this schema
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Immutable renderer configuration, fixed for the process lifetime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name reported to the Vulkan instance and window title
    pub app_name: String,
    /// Initial window width in screen coordinates
    pub window_width: u32,
    /// Initial window height in screen coordinates
    pub window_height: u32,
    /// Path to the pre-compiled vertex shader SPIR-V blob
    pub vertex_shader_path: String,
    /// Path to the pre-compiled fragment shader SPIR-V blob
    pub fragment_shader_path: String,
    /// Number of frame-in-flight synchronization slots
    pub max_frames_in_flight: usize,
    /// Exact-match allow-list of benign driver diagnostics to suppress.
    ///
    /// These are host/driver specific; the defaults cover the Epic Games
    /// overlay layer complaining about its own missing manifest files.
    pub suppressed_diagnostics: Vec<String>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            app_name: "Vulkan Renderer".to_string(),
            window_width: 800,
            window_height: 600,
            vertex_shader_path: "res/shaders/mesh.vert.spv".to_string(),
            fragment_shader_path: "res/shaders/mesh.frag.spv".to_string(),
            max_frames_in_flight: 2,
            suppressed_diagnostics: vec![
                "loader_get_json: Failed to open JSON file D:\\Gry i Programy\\Epic Games\\Launcher\\Portal\\Extras\\Overlay\\EOSOverlayVkLayer-Win32.json".to_string(),
                "loader_get_json: Failed to open JSON file D:\\Gry i Programy\\Epic Games\\Launcher\\Portal\\Extras\\Overlay\\EOSOverlayVkLayer-Win64.json".to_string(),
            ],
        }
    }
}

impl RendererConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = RendererConfig::default();
        assert_eq!(config.max_frames_in_flight, 2);
        assert_eq!(config.window_width, 800);
        assert_eq!(config.window_height, 600);
        assert_eq!(config.suppressed_diagnostics.len(), 2);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: RendererConfig = toml::from_str(
            r#"
            app_name = "Test App"
            window_width = 1024
            "#,
        )
        .unwrap();
        assert_eq!(config.app_name, "Test App");
        assert_eq!(config.window_width, 1024);
        assert_eq!(config.window_height, 600);
        assert_eq!(config.max_frames_in_flight, 2);
    }

    #[test]
    fn suppression_list_round_trips_through_toml() {
        let mut config = RendererConfig::default();
        config.suppressed_diagnostics = vec!["some driver warning".to_string()];
        let serialized = toml::to_string(&config).unwrap();
        let parsed: RendererConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.suppressed_diagnostics, config.suppressed_diagnostics);
    }

    #[test]
    fn load_or_default_falls_back_for_missing_file() {
        let config = RendererConfig::load_or_default("does/not/exist.toml").unwrap();
        assert_eq!(config.app_name, "Vulkan Renderer");
    }
}
