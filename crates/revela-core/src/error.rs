//! Error types for the Revela calibration and rendering engine.
//!
//! Errors are organized by stage so messages carry the context needed to act
//! on them (frame paths, the field that failed to parse, the missing input).

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for Revela operations.
#[derive(Error, Debug)]
pub enum RevelaError {
    /// Configuration and recipe errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Pipeline processing errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    /// A mode or name field held a value outside its closed set
    #[error("Unknown {field} '{value}' (expected one of: {expected})")]
    UnknownVariant {
        field: &'static str,
        value: String,
        expected: String,
    },
}

/// Pipeline processing errors, organized by stage.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A required buffer or profile was not available
    #[error("{what} not loaded for {path}")]
    Precondition { path: PathBuf, what: &'static str },

    /// Image decoding failed
    #[error("Decode error for {path}: {message}")]
    Decode { path: PathBuf, message: String },

    /// Image encoding or writing failed
    #[error("Encode error for {path}: {message}")]
    Encode { path: PathBuf, message: String },

    /// LUT lookup or parsing failed
    #[error("LUT error for '{name}': {message}")]
    Lut { name: String, message: String },

    /// Color profile parsing or conversion failed
    #[error("Color profile error: {0}")]
    Profile(String),

    /// Calibration cache could not be read or written
    #[error("Calibration cache error at {path}: {message}")]
    Cache { path: PathBuf, message: String },

    /// File exceeds size limit
    #[error("File too large: {path} ({size_mb}MB > {max_mb}MB)")]
    FileTooLarge {
        path: PathBuf,
        size_mb: u64,
        max_mb: u64,
    },

    /// Image dimensions exceed limit
    #[error("Image too large: {path} ({width}x{height} > {max_dim})")]
    ImageTooLarge {
        path: PathBuf,
        width: u32,
        height: u32,
        max_dim: u32,
    },

    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// The roll has no frames to analyze
    #[error("Roll at {0} contains no frames")]
    EmptyRoll(PathBuf),

    /// A requested frame index is outside the roll
    #[error("Frame index {index} out of range (roll has {len} frames)")]
    FrameOutOfRange { index: usize, len: usize },

    /// A technical recipe failed validation before any work started
    #[error("Invalid recipe: {0}")]
    InvalidRecipe(#[from] ConfigError),

    /// The caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,
}

impl From<moxcms::CmsError> for PipelineError {
    fn from(e: moxcms::CmsError) -> Self {
        PipelineError::Profile(e.to_string())
    }
}

/// Convenience type alias for Revela results.
pub type Result<T> = std::result::Result<T, RevelaError>;

/// Convenience type alias for pipeline-specific results.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
