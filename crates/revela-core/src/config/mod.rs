//! Configuration management for Revela.
//!
//! Configuration is loaded from the platform config directory with sensible
//! defaults. Every section implements `Default`, so a partial file is valid.

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure for Revela.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Frame enumeration
    pub input: InputConfig,

    /// Resource limits
    pub limits: LimitsConfig,

    /// Roll analysis
    pub analysis: AnalysisConfig,

    /// Frame rendering
    pub render: RenderConfig,

    /// Export driver
    pub export: ExportConfig,

    /// Progress reporting
    pub progress: ProgressConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// Uses platform-appropriate directories:
    /// - macOS: ~/Library/Application Support/com.revela.revela/config.toml
    /// - Linux: ~/.config/revela/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\revela\config\config.toml
    ///
    /// Falls back to ~/.revela/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "revela", "revela")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".revela").join("config.toml")
            })
    }

    /// Get the resolved LUT directory path (with ~ expansion).
    pub fn lut_dir(&self) -> PathBuf {
        let expanded = shellexpand::tilde(&self.render.lut_dir);
        PathBuf::from(expanded.into_owned())
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::RenderingTransform;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.analysis.proxy_size, 1024);
        assert_eq!(config.analysis.memory_limit_mb, 800);
        assert_eq!(config.analysis.batch_size, 5);
        assert_eq!(config.export.memory_limit_mb, 1000);
        assert_eq!(config.export.lookahead, 1);
        assert_eq!(config.input.extensions, vec!["tif", "tiff"]);
    }

    #[test]
    fn test_config_to_toml() {
        let config = Config::default();
        let toml = config.to_toml().unwrap();
        assert!(toml.contains("[analysis]"));
        assert!(toml.contains("[render.rendering]"));
        assert!(toml.contains("[export]"));
    }

    #[test]
    fn test_toml_round_trip() {
        let text = Config::default().to_toml().unwrap();
        let back = Config::from_toml(&text).unwrap();
        assert_eq!(back.render.rendering, RenderingTransform::default());
        assert_eq!(back.export.default_dir_name, "@Exports");
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config = Config::from_toml("[analysis]\nproxy_size = 512\n").unwrap();
        assert_eq!(config.analysis.proxy_size, 512);
        assert_eq!(config.analysis.extrema_check_interval, 10);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_lut_dir_expands_tilde() {
        let config = Config::default();
        assert!(!config.lut_dir().to_string_lossy().starts_with('~'));
    }
}
