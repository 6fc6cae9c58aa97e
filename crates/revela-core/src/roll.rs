//! Rolls and frames: the owned data model the engine operates on.
//!
//! A [`Roll`] exclusively owns its [`Frame`]s. Frame pixel buffers are
//! transient: they are populated on demand by the renderer and released as
//! soon as a stage no longer needs them.

use image::Rgb32FImage;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::calibration::CalibrationProfile;
use crate::config::InputConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::discovery::FrameDiscovery;
use crate::recipe::{CreativeRecipe, TechnicalRecipe};

/// Color profile carried by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceProfile {
    /// Raw ICC bytes embedded in the file
    Embedded(Vec<u8>),
    /// The file carried no profile; samples are treated as linear
    Untagged,
}

impl SourceProfile {
    pub fn icc_bytes(&self) -> Option<&[u8]> {
        match self {
            SourceProfile::Embedded(bytes) => Some(bytes),
            SourceProfile::Untagged => None,
        }
    }
}

/// Bytes currently held by a frame's buffers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FrameMemory {
    pub thumbnail: usize,
    pub full_quality: usize,
    pub processed: usize,
    pub profile: usize,
}

impl FrameMemory {
    pub fn total(&self) -> usize {
        self.thumbnail + self.full_quality + self.processed + self.profile
    }
}

impl std::ops::Add for FrameMemory {
    type Output = FrameMemory;

    fn add(self, rhs: FrameMemory) -> FrameMemory {
        FrameMemory {
            thumbnail: self.thumbnail + rhs.thumbnail,
            full_quality: self.full_quality + rhs.full_quality,
            processed: self.processed + rhs.processed,
            profile: self.profile + rhs.profile,
        }
    }
}

fn buffer_bytes(image: &Option<Rgb32FImage>) -> usize {
    image
        .as_ref()
        .map_or(0, |img| img.as_raw().len() * std::mem::size_of::<f32>())
}

/// One scanned image.
#[derive(Debug, Clone)]
pub struct Frame {
    path: PathBuf,
    /// Replaces the roll's shared technical recipe when set
    pub technical_override: Option<TechnicalRecipe>,
    pub creative: CreativeRecipe,
    /// Reduced-resolution samples for previews
    pub thumbnail: Option<Rgb32FImage>,
    /// Full-resolution samples
    pub full_quality: Option<Rgb32FImage>,
    pub source_profile: Option<SourceProfile>,
    /// Output of the last render
    pub processed: Option<Rgb32FImage>,
}

impl Frame {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            technical_override: None,
            creative: CreativeRecipe::default(),
            thumbnail: None,
            full_quality: None,
            source_profile: None,
            processed: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File stem used to name exports.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "frame".to_string())
    }

    /// The recipe this frame renders with.
    pub fn technical<'a>(&'a self, shared: &'a TechnicalRecipe) -> &'a TechnicalRecipe {
        self.technical_override.as_ref().unwrap_or(shared)
    }

    /// Drop the sample and output buffers, keeping the source profile.
    pub fn release_large_data(&mut self) {
        self.thumbnail = None;
        self.full_quality = None;
        self.processed = None;
    }

    /// Drop every cached buffer including the source profile.
    pub fn release_all_data(&mut self) {
        self.release_large_data();
        self.source_profile = None;
    }

    pub fn has_large_data(&self) -> bool {
        self.thumbnail.is_some() || self.full_quality.is_some() || self.processed.is_some()
    }

    pub fn memory_usage(&self) -> FrameMemory {
        FrameMemory {
            thumbnail: buffer_bytes(&self.thumbnail),
            full_quality: buffer_bytes(&self.full_quality),
            processed: buffer_bytes(&self.processed),
            profile: self
                .source_profile
                .as_ref()
                .and_then(SourceProfile::icc_bytes)
                .map_or(0, <[u8]>::len),
        }
    }
}

/// Roll-wide memory summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RollMemory {
    pub frames: usize,
    pub frames_with_data: usize,
    pub bytes: FrameMemory,
}

/// An ordered batch of frames sharing one technical recipe.
#[derive(Debug, Clone)]
pub struct Roll {
    folder: PathBuf,
    film_type: String,
    frames: Vec<Frame>,
    technical: TechnicalRecipe,
    calibration: Option<Arc<CalibrationProfile>>,
}

impl Roll {
    /// Enumerate a roll folder's frames, sorted lexicographically by path.
    pub fn open(
        folder: impl Into<PathBuf>,
        film_type: impl Into<String>,
        input: &InputConfig,
    ) -> PipelineResult<Self> {
        let folder = folder.into();
        if !folder.is_dir() {
            return Err(PipelineError::FileNotFound(folder));
        }
        let paths = FrameDiscovery::new(input.clone()).discover(&folder);
        tracing::debug!("Found {} frame(s) in {:?}", paths.len(), folder);
        let frames = paths.into_iter().map(Frame::new).collect();
        Ok(Self::from_frames(folder, film_type, frames))
    }

    /// Build a roll from frames already in the desired order.
    pub fn from_frames(
        folder: impl Into<PathBuf>,
        film_type: impl Into<String>,
        frames: Vec<Frame>,
    ) -> Self {
        Self {
            folder: folder.into(),
            film_type: film_type.into(),
            frames,
            technical: TechnicalRecipe::default(),
            calibration: None,
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn film_type(&self) -> &str {
        &self.film_type
    }

    /// `<parent folder name>_<film type>`.
    pub fn name(&self) -> String {
        let parent = self
            .folder
            .parent()
            .and_then(Path::file_name)
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{parent}_{}", self.film_type)
    }

    /// Directory holding cached calibration profiles.
    pub fn cache_dir(&self) -> PathBuf {
        self.folder.join(".cache")
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn frames_mut(&mut self) -> &mut [Frame] {
        &mut self.frames
    }

    pub fn frame(&self, index: usize) -> PipelineResult<&Frame> {
        let len = self.frames.len();
        self.frames
            .get(index)
            .ok_or(PipelineError::FrameOutOfRange { index, len })
    }

    /// A frame together with the roll's shared recipe, borrowed disjointly.
    pub fn frame_with_recipe(
        &mut self,
        index: usize,
    ) -> PipelineResult<(&mut Frame, &TechnicalRecipe)> {
        let len = self.frames.len();
        let frame = self
            .frames
            .get_mut(index)
            .ok_or(PipelineError::FrameOutOfRange { index, len })?;
        Ok((frame, &self.technical))
    }

    /// Shared calibration recipe.
    pub fn technical(&self) -> &TechnicalRecipe {
        &self.technical
    }

    pub fn calibration(&self) -> Option<&Arc<CalibrationProfile>> {
        self.calibration.as_ref()
    }

    pub fn set_calibration(&mut self, profile: Arc<CalibrationProfile>) {
        self.calibration = Some(profile);
    }

    /// Replace the shared recipe. Any attached calibration was computed for
    /// the old recipe and is dropped.
    pub fn set_technical(&mut self, recipe: TechnicalRecipe) {
        if recipe != self.technical {
            self.calibration = None;
        }
        self.technical = recipe;
    }

    pub fn release_all_frames(&mut self) {
        for frame in &mut self.frames {
            frame.release_all_data();
        }
    }

    /// Release large buffers of every frame outside
    /// `[current - keep_before, current + keep_after]`.
    pub fn release_outside_window(&mut self, current: usize, keep_before: usize, keep_after: usize) {
        let lo = current.saturating_sub(keep_before);
        let hi = current.saturating_add(keep_after);
        let mut released = 0usize;
        for (i, frame) in self.frames.iter_mut().enumerate() {
            if (i < lo || i > hi) && frame.has_large_data() {
                frame.release_large_data();
                released += 1;
            }
        }
        if released > 0 {
            tracing::debug!("Released buffers of {released} frame(s) outside window {lo}..={hi}");
        }
    }

    pub fn memory_usage(&self) -> RollMemory {
        self.frames.iter().fold(
            RollMemory {
                frames: self.frames.len(),
                ..Default::default()
            },
            |mut acc, frame| {
                let usage = frame.memory_usage();
                if usage.total() > 0 {
                    acc.frames_with_data += 1;
                }
                acc.bytes = acc.bytes + usage;
                acc
            },
        )
    }
}
