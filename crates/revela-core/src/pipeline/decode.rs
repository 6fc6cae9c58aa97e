//! Frame decoding: raster file to linear-range `f32` samples plus the
//! embedded color profile.

use image::imageops::FilterType;
use image::{DynamicImage, ImageDecoder, ImageReader, Rgb32FImage};
use std::path::Path;

use crate::config::LimitsConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::roll::SourceProfile;

use super::validate::Validator;

/// Size a frame is loaded at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Downsampled so the long edge is at most `max_edge`
    Downsampled { max_edge: u32 },
    /// Original resolution
    Full,
}

/// Decoded samples in `[0, 1]` and the scan's color profile.
#[derive(Debug, Clone)]
pub struct LoadedFrame {
    pub samples: Rgb32FImage,
    pub profile: SourceProfile,
}

/// Supplies frame samples to the analyzer and renderer.
pub trait FrameSource: Send + Sync {
    fn load(&self, path: &Path, resolution: Resolution) -> PipelineResult<LoadedFrame>;
}

/// Reads frames from disk with the `image` crate.
pub struct ImageFileSource {
    validator: Validator,
}

impl ImageFileSource {
    pub fn new(limits: LimitsConfig) -> Self {
        Self {
            validator: Validator::new(limits),
        }
    }
}

impl Default for ImageFileSource {
    fn default() -> Self {
        Self::new(LimitsConfig::default())
    }
}

impl FrameSource for ImageFileSource {
    fn load(&self, path: &Path, resolution: Resolution) -> PipelineResult<LoadedFrame> {
        self.validator.validate(path)?;

        let decode_err = |message: String| PipelineError::Decode {
            path: path.to_path_buf(),
            message,
        };

        let reader = ImageReader::open(path)
            .map_err(|e| decode_err(format!("Cannot open file: {e}")))?
            .with_guessed_format()
            .map_err(|e| decode_err(format!("Cannot detect image format: {e}")))?;
        let mut decoder = reader
            .into_decoder()
            .map_err(|e| decode_err(e.to_string()))?;

        let (width, height) = decoder.dimensions();
        self.validator.check_dimensions(path, width, height)?;

        let profile = match decoder.icc_profile() {
            Ok(Some(bytes)) if !bytes.is_empty() => SourceProfile::Embedded(bytes),
            Ok(_) => SourceProfile::Untagged,
            Err(e) => {
                tracing::warn!("Cannot read ICC profile from {:?}: {}", path, e);
                SourceProfile::Untagged
            }
        };

        let image = DynamicImage::from_decoder(decoder).map_err(|e| decode_err(e.to_string()))?;
        let samples = downsample(image.into_rgb32f(), resolution);

        tracing::trace!(
            "Decoded {:?} at {}x{} (source {}x{})",
            path,
            samples.width(),
            samples.height(),
            width,
            height
        );

        Ok(LoadedFrame { samples, profile })
    }
}

/// Dimensions that fit inside `max_edge` with the aspect ratio kept.
/// Never upscales.
pub fn fit_within(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    let long = width.max(height);
    if long <= max_edge || long == 0 {
        return (width, height);
    }
    let scale = f64::from(max_edge) / f64::from(long);
    let w = ((f64::from(width) * scale).round() as u32).max(1);
    let h = ((f64::from(height) * scale).round() as u32).max(1);
    (w, h)
}

/// Resize to the requested resolution.
pub fn downsample(samples: Rgb32FImage, resolution: Resolution) -> Rgb32FImage {
    match resolution {
        Resolution::Full => samples,
        Resolution::Downsampled { max_edge } => {
            let (w, h) = fit_within(samples.width(), samples.height(), max_edge);
            if (w, h) == samples.dimensions() {
                samples
            } else {
                image::imageops::resize(&samples, w, h, FilterType::Triangle)
            }
        }
    }
}
