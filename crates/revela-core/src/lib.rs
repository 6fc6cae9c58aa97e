//! Revela Core - Embeddable film negative calibration and rendering library.
//!
//! Revela turns a roll of scanned film negatives into calibrated,
//! color-corrected images. Calibration statistics are derived once per roll
//! and cached on disk; every frame is then rendered through the same
//! deterministic pipeline.
//!
//! # Architecture
//!
//! ```text
//! Roll folder -> Analyzer (3 passes) -> CalibrationProfile -> .cache/<key>.profile.json
//!                                              |
//! Frame + CreativeRecipe ------------------> Renderer -> Exporter -> JPEG/PNG/TIFF
//! ```
//!
//! The core is synchronous. Callers that run an async runtime should dispatch
//! engine calls onto a blocking thread.
//!
//! # Usage
//!
//! ```rust,ignore
//! use revela_core::{CancelToken, Config, ExportRecipe, NoProgress, Revela};
//!
//! fn main() -> revela_core::Result<()> {
//!     let revela = Revela::new(Config::load()?);
//!     let mut roll = revela.open_roll("./scans/roll_07", "Portra400")?;
//!     revela.calibrate(&mut roll, &NoProgress, &CancelToken::new())?;
//!
//!     let all: Vec<usize> = (0..roll.len()).collect();
//!     let summary = revela.export(&mut roll, &all, &ExportRecipe::default(), &NoProgress, &CancelToken::new())?;
//!     println!("Exported {} frames", summary.exported.len());
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod calibration;
pub mod color;
pub mod config;
pub mod error;
pub mod kernels;
pub mod math;
pub mod pipeline;
pub mod recipe;
pub mod roll;

use std::path::PathBuf;
use std::sync::Arc;

// Re-exports for convenient access
pub use calibration::{CalibrationProfile, RollHistogram};
pub use config::Config;
pub use error::{ConfigError, PipelineError, PipelineResult, Result, RevelaError};
pub use pipeline::{
    Analyzer, CacheOutcome, CalibrationCoordinator, CancelToken, DirectorySink, ExportSummary,
    Exporter, FrameSource, ImageFileSource, NoProgress, ProgressEvent, ProgressSink,
    RenderReport, Renderer, Stage,
};
pub use recipe::{CreativeRecipe, ExportFormat, ExportRecipe, TechnicalRecipe};
pub use roll::{Frame, Roll, SourceProfile};

use kernels::{
    AlignmentEstimator, FixedAlignment, FixedTarget, LutDirectory, LutProvider, TargetEstimator,
};
use pipeline::memory::MemoryProbe;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Revela engine - the main entry point for calibrating and rendering rolls.
pub struct Revela {
    config: Config,
    coordinator: CalibrationCoordinator<Analyzer>,
    renderer: Arc<Renderer>,
    exporter: Exporter,
}

impl Revela {
    /// Engine reading frames from disk and LUTs from the configured directory.
    pub fn new(config: Config) -> Self {
        RevelaBuilder::new(config).build()
    }

    /// Engine with configuration from the default location.
    pub fn with_defaults() -> Result<Self> {
        let config = Config::load()?;
        Ok(Self::new(config))
    }

    pub fn builder(config: Config) -> RevelaBuilder {
        RevelaBuilder::new(config)
    }

    /// Get a reference to the current configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn coordinator(&self) -> &CalibrationCoordinator<Analyzer> {
        &self.coordinator
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    /// Enumerate a roll folder's frames.
    pub fn open_roll(&self, folder: impl Into<PathBuf>, film_type: &str) -> PipelineResult<Roll> {
        Roll::open(folder, film_type, &self.config.input)
    }

    /// Attach the roll's calibration, from the cache or a fresh analysis.
    pub fn calibrate(
        &self,
        roll: &mut Roll,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> PipelineResult<(Arc<CalibrationProfile>, CacheOutcome)> {
        self.coordinator.get_or_compute(roll, progress, cancel)
    }

    /// Render a preview of one frame into its `processed` buffer.
    ///
    /// `max_edge` defaults to the configured preview size.
    pub fn preview(
        &self,
        roll: &mut Roll,
        index: usize,
        max_edge: Option<u32>,
    ) -> PipelineResult<RenderReport> {
        let profile = roll
            .calibration()
            .cloned()
            .ok_or_else(|| PipelineError::Precondition {
                path: roll.folder().to_path_buf(),
                what: "calibration profile",
            })?;
        let max_edge = max_edge.unwrap_or(self.config.render.preview_size);
        let (frame, shared) = roll.frame_with_recipe(index)?;
        self.renderer.render_preview(frame, shared, &profile, max_edge)
    }

    /// Export frames into the recipe's directory, or `<roll>/@Exports`.
    pub fn export(
        &self,
        roll: &mut Roll,
        selection: &[usize],
        recipe: &ExportRecipe,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<ExportSummary> {
        let sink = DirectorySink::for_recipe(roll, recipe, &self.config.export);
        self.exporter
            .export(roll, selection, recipe, &sink, progress, cancel)
    }
}

/// Assembles a [`Revela`] engine with custom collaborators.
pub struct RevelaBuilder {
    config: Config,
    source: Option<Arc<dyn FrameSource>>,
    luts: Option<Arc<dyn LutProvider>>,
    target: Arc<dyn TargetEstimator>,
    alignment: Arc<dyn AlignmentEstimator>,
    memory: Option<Arc<dyn MemoryProbe>>,
}

impl RevelaBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            source: None,
            luts: None,
            target: Arc::new(FixedTarget::default()),
            alignment: Arc::new(FixedAlignment::default()),
            memory: None,
        }
    }

    pub fn frame_source(mut self, source: Arc<dyn FrameSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn lut_provider(mut self, luts: Arc<dyn LutProvider>) -> Self {
        self.luts = Some(luts);
        self
    }

    /// Used by both the analyzer and the renderer.
    pub fn target_estimator(mut self, target: Arc<dyn TargetEstimator>) -> Self {
        self.target = target;
        self
    }

    pub fn alignment_estimator(mut self, alignment: Arc<dyn AlignmentEstimator>) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn memory_probe(mut self, memory: Arc<dyn MemoryProbe>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn build(self) -> Revela {
        let config = self.config;
        tracing::debug!("Initializing Revela v{}", VERSION);

        let source = self
            .source
            .unwrap_or_else(|| Arc::new(ImageFileSource::new(config.limits.clone())));
        let luts = self
            .luts
            .unwrap_or_else(|| Arc::new(LutDirectory::new(config.lut_dir())));
        let memory = self
            .memory
            .unwrap_or_else(|| Arc::new(pipeline::ProcessMemory::new()));

        let analyzer = Analyzer::new(source.clone(), config.analysis.clone())
            .with_target_estimator(self.target.clone())
            .with_alignment_estimator(self.alignment)
            .with_memory_probe(memory.clone())
            .with_progress_interval(config.progress.interval);
        let renderer = Arc::new(
            Renderer::new(source, luts)
                .with_target_estimator(self.target)
                .with_rendering(config.render.rendering),
        );
        let exporter = Exporter::new(renderer.clone(), config.export.clone())
            .with_memory_probe(memory)
            .with_progress_interval(config.progress.interval);

        Revela {
            config,
            coordinator: CalibrationCoordinator::new(analyzer),
            renderer,
            exporter,
        }
    }
}
