//! Roll processing pipeline components.
//!
//! This module contains the stages that turn a folder of scans into
//! calibrated output files:
//! - **discovery**: Find a roll's frames
//! - **validate**: Pre-decode validation
//! - **decode**: Load frame samples and embedded color profiles
//! - **analyzer**: Three-pass roll calibration
//! - **hash**: Calibration cache keys
//! - **coordinator**: On-disk calibration cache
//! - **renderer**: Per-frame render pipeline
//! - **encode**: JPEG/PNG/TIFF encoding
//! - **export**: Batch export under a memory ceiling
//! - **memory**: Resident memory checks
//! - **progress**: Progress events and cancellation

pub mod analyzer;
pub mod coordinator;
pub mod decode;
pub mod discovery;
pub mod encode;
pub mod export;
pub mod hash;
pub mod memory;
pub mod progress;
pub mod renderer;
pub mod validate;

// Re-exports for convenient access
pub use analyzer::{Analyzer, ExtremaCandidates, RollAnalysis};
pub use coordinator::{CacheOutcome, CalibrationCoordinator};
pub use decode::{FrameSource, ImageFileSource, LoadedFrame, Resolution};
pub use discovery::FrameDiscovery;
pub use export::{DirectorySink, ExportFailure, ExportSink, ExportSummary, Exporter};
pub use hash::RecipeKey;
pub use memory::{MemoryProbe, ProcessMemory};
pub use progress::{CancelToken, NoProgress, ProgressEvent, ProgressSink, Stage};
pub use renderer::{RenderReport, Renderer};
pub use validate::Validator;
