//! Sub-configuration structs with their defaults.

use serde::{Deserialize, Serialize};

use crate::kernels::RenderingTransform;

/// Frame enumeration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// File extensions treated as frames (case-insensitive)
    pub extensions: Vec<String>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["tif".to_string(), "tiff".to_string()],
        }
    }
}

/// Resource limits to protect against problematic inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum file size in megabytes
    pub max_file_size_mb: u64,

    /// Maximum image dimension (width or height)
    pub max_image_dimension: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 2048,
            max_image_dimension: 30000,
        }
    }
}

/// Roll analysis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Long edge of the downsampled proxy each frame is analyzed at
    pub proxy_size: u32,

    /// Resident memory ceiling in megabytes
    pub memory_limit_mb: u64,

    /// Frames between memory checks in the extrema pass
    pub extrema_check_interval: usize,

    /// Frames between memory checks in the histogram pass
    pub histogram_check_interval: usize,

    /// Frames between memory checks in the alignment pass
    pub alignment_check_interval: usize,

    /// Use the batched extrema pass
    pub batched: bool,

    /// Frames per group in the batched extrema pass
    pub batch_size: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            proxy_size: 1024,
            memory_limit_mb: 800,
            extrema_check_interval: 10,
            histogram_check_interval: 8,
            alignment_check_interval: 6,
            batched: false,
            batch_size: 5,
        }
    }
}

/// Frame rendering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Long edge of preview renders
    pub preview_size: u32,

    /// Directory holding `<name>.cube` film-emulation LUTs
    pub lut_dir: String,

    /// Normalized density to scene-linear mapping
    pub rendering: RenderingTransform,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            preview_size: 1024,
            lut_dir: "~/.revela/luts".to_string(),
            rendering: RenderingTransform::default(),
        }
    }
}

/// Export driver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Resident memory ceiling in megabytes
    pub memory_limit_mb: u64,

    /// Fraction of the ceiling that triggers buffer eviction
    pub pressure_fraction: f64,

    /// Frames between memory checks
    pub memory_check_interval: usize,

    /// Frames after the current one kept resident when evicting
    pub lookahead: usize,

    /// Folder created inside the roll when no destination is given
    pub default_dir_name: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            memory_limit_mb: 1000,
            pressure_fraction: 0.8,
            memory_check_interval: 1,
            lookahead: 1,
            default_dir_name: "@Exports".to_string(),
        }
    }
}

/// Progress reporting cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// Report every N frames (the last frame is always reported)
    pub interval: usize,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self { interval: 1 }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
