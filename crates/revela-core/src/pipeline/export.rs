//! Export driver: full-quality render, encode and write for a selection of
//! frames under a memory ceiling.

use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::color::DestinationProfile;
use crate::config::ExportConfig;
use crate::error::{PipelineError, PipelineResult, Result};
use crate::recipe::ExportRecipe;
use crate::roll::Roll;

use super::encode::encode;
use super::memory::{MemoryGuard, MemoryProbe, ProcessMemory};
use super::progress::{CancelToken, ProgressSink, Reporter, Stage};
use super::renderer::Renderer;

/// Where encoded files go.
pub trait ExportSink: Send + Sync {
    /// Open a writer for `name`, returning it with the location it writes to.
    fn create(&self, name: &str) -> std::io::Result<(PathBuf, Box<dyn Write + Send>)>;
}

/// Writes files into a directory, creating it on first use.
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The recipe's directory, or `<roll>/<default_dir_name>`.
    pub fn for_recipe(roll: &Roll, recipe: &ExportRecipe, config: &ExportConfig) -> Self {
        let dir = recipe
            .output_directory
            .clone()
            .unwrap_or_else(|| roll.folder().join(&config.default_dir_name));
        Self::new(dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ExportSink for DirectorySink {
    fn create(&self, name: &str) -> std::io::Result<(PathBuf, Box<dyn Write + Send>)> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(name);
        let file = std::fs::File::create(&path)?;
        Ok((path, Box::new(std::io::BufWriter::new(file))))
    }
}

/// A frame that could not be exported.
#[derive(Debug, Clone, Serialize)]
pub struct ExportFailure {
    pub frame: PathBuf,
    pub error: String,
}

/// Outcome of an export batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportSummary {
    pub exported: Vec<PathBuf>,
    pub failed: Vec<ExportFailure>,
    /// The batch stopped early on request
    pub cancelled: bool,
}

/// Drives the renderer over a frame selection.
pub struct Exporter {
    renderer: Arc<Renderer>,
    config: ExportConfig,
    memory: Arc<dyn MemoryProbe>,
    progress_interval: usize,
}

impl Exporter {
    pub fn new(renderer: Arc<Renderer>, config: ExportConfig) -> Self {
        Self {
            renderer,
            config,
            memory: Arc::new(ProcessMemory::new()),
            progress_interval: 1,
        }
    }

    pub fn with_memory_probe(mut self, memory: Arc<dyn MemoryProbe>) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval.max(1);
        self
    }

    /// Export `selection` (frame indices, in the given order).
    ///
    /// Recipe, destination profile, calibration and selection are checked
    /// up front. After that, a failing frame is logged, recorded and skipped.
    pub fn export(
        &self,
        roll: &mut Roll,
        selection: &[usize],
        recipe: &ExportRecipe,
        sink: &dyn ExportSink,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<ExportSummary> {
        recipe.validate()?;
        roll.technical().validate()?;
        let destination = recipe
            .icc_profile
            .clone()
            .map(DestinationProfile::from_bytes)
            .transpose()?;
        let profile = roll
            .calibration()
            .cloned()
            .ok_or_else(|| PipelineError::Precondition {
                path: roll.folder().to_path_buf(),
                what: "calibration profile",
            })?;
        let len = roll.len();
        if let Some(&index) = selection.iter().find(|&&i| i >= len) {
            return Err(PipelineError::FrameOutOfRange { index, len }.into());
        }

        let threshold_mb =
            (self.config.memory_limit_mb as f64 * self.config.pressure_fraction) as u64;
        let guard = MemoryGuard::new(
            self.memory.as_ref(),
            threshold_mb,
            self.config.memory_check_interval,
        );
        let reporter = Reporter::new(progress, self.progress_interval);
        let total = selection.len();
        let mut summary = ExportSummary::default();

        tracing::info!(
            "Exporting {} frame(s) of {} as {}",
            total,
            roll.name(),
            recipe.format
        );

        for (position, &index) in selection.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::warn!("Export cancelled after {} of {} frame(s)", position, total);
                summary.cancelled = true;
                break;
            }

            if guard.due(position + 1) {
                if let Some(used) = guard.over_limit() {
                    tracing::warn!(
                        "Memory usage {} MB exceeds {} MB, releasing frames outside the export window",
                        used,
                        guard.limit_mb()
                    );
                    roll.release_outside_window(index, 0, self.config.lookahead);
                }
            }

            let (frame, shared) = roll.frame_with_recipe(index)?;
            let frame_path = frame.path().to_path_buf();
            let name = recipe.file_name(&frame.stem());

            let result = self
                .renderer
                .render_full(frame, shared, &profile, destination.as_ref())
                .and_then(|_| {
                    let image = frame.processed.take().ok_or(PipelineError::Precondition {
                        path: frame_path.clone(),
                        what: "rendered output",
                    })?;
                    encode(
                        &image,
                        recipe.format,
                        recipe.quality,
                        recipe.icc_profile.as_deref(),
                        &frame_path,
                    )
                })
                .and_then(|bytes| write_output(sink, &name, &bytes));
            frame.release_all_data();

            match result {
                Ok(path) => {
                    tracing::debug!("Exported {:?}", path);
                    summary.exported.push(path);
                }
                Err(e) => {
                    tracing::warn!("Failed to export {:?}: {}", frame_path, e);
                    summary.failed.push(ExportFailure {
                        frame: frame_path,
                        error: e.to_string(),
                    });
                }
            }

            reporter.tick(Stage::Export, position + 1, total, name);
        }

        roll.release_all_frames();
        tracing::info!(
            "Export finished: {} written, {} failed{}",
            summary.exported.len(),
            summary.failed.len(),
            if summary.cancelled { ", cancelled" } else { "" }
        );
        Ok(summary)
    }
}

fn write_output(sink: &dyn ExportSink, name: &str, bytes: &[u8]) -> PipelineResult<PathBuf> {
    let write = || -> std::io::Result<PathBuf> {
        let (path, mut writer) = sink.create(name)?;
        writer.write_all(bytes)?;
        writer.flush()?;
        Ok(path)
    };
    write().map_err(|e| PipelineError::Encode {
        path: PathBuf::from(name),
        message: format!("Cannot write output: {e}"),
    })
}
