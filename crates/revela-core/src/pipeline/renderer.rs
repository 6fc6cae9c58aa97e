//! Per-frame render pipeline: scan samples to display- or export-ready
//! pixels.
//!
//! The stages run in a fixed order:
//!
//! ```text
//! samples -> density -> net density -> normalize(target/extrema) -> align
//!   -> clip -> scene-linear (AP0) -> rolloff -> display transform | LUT
//!   -> tone curve -> destination profile (full only) -> flip
//! ```
//!
//! The input buffer is moved out of the frame before processing, so it is
//! released on every exit path.

use image::Rgb32FImage;
use serde::Serialize;
use std::sync::Arc;

use crate::calibration::CalibrationProfile;
use crate::color::{
    apply_matrix, convert_to_destination, source_curves, DestinationProfile, OutputSpace,
};
use crate::error::{PipelineError, PipelineResult};
use crate::kernels::{
    align_channels, apply_tone_curve, clip_above, frame_target, normalize,
    rolloff_preserving_max, samples_to_density, to_net_density, FixedTarget, LutProvider,
    RenderingTransform, RolloffParams, TargetEstimator,
};
use crate::math::max_value;
use crate::recipe::{CreativeRecipe, DisplayMode, TechnicalRecipe};
use crate::roll::{Frame, SourceProfile};

use super::decode::{downsample, FrameSource, Resolution};

/// Summary of one render.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RenderReport {
    /// Target density the frame was normalized to
    pub target: f64,
    /// Net density the frame was clipped at
    pub clip_bound: f64,
    pub rolloff_applied: bool,
    pub width: u32,
    pub height: u32,
}

/// Renders frames against a calibration profile.
pub struct Renderer {
    source: Arc<dyn FrameSource>,
    luts: Arc<dyn LutProvider>,
    target: Arc<dyn TargetEstimator>,
    rendering: RenderingTransform,
}

impl Renderer {
    pub fn new(source: Arc<dyn FrameSource>, luts: Arc<dyn LutProvider>) -> Self {
        Self {
            source,
            luts,
            target: Arc::new(FixedTarget::default()),
            rendering: RenderingTransform::default(),
        }
    }

    pub fn with_target_estimator(mut self, target: Arc<dyn TargetEstimator>) -> Self {
        self.target = target;
        self
    }

    pub fn with_rendering(mut self, rendering: RenderingTransform) -> Self {
        self.rendering = rendering;
        self
    }

    /// Render a downsampled frame, left in its display encoding.
    pub fn render_preview(
        &self,
        frame: &mut Frame,
        shared: &TechnicalRecipe,
        profile: &CalibrationProfile,
        max_edge: u32,
    ) -> PipelineResult<RenderReport> {
        let resolution = Resolution::Downsampled { max_edge };
        if frame.thumbnail.is_none() || frame.source_profile.is_none() {
            let loaded = self.source.load(frame.path(), resolution)?;
            frame.thumbnail = Some(loaded.samples);
            frame.source_profile = Some(loaded.profile);
        }
        let samples = frame
            .thumbnail
            .take()
            .map(|s| downsample(s, resolution))
            .ok_or(PipelineError::Precondition {
                path: frame.path().to_path_buf(),
                what: "thumbnail samples",
            })?;
        tracing::debug!("Rendering preview of {:?}", frame.path());
        self.render(frame, samples, shared, profile, None)
    }

    /// Render at full resolution, converted into `destination` when given.
    pub fn render_full(
        &self,
        frame: &mut Frame,
        shared: &TechnicalRecipe,
        profile: &CalibrationProfile,
        destination: Option<&DestinationProfile>,
    ) -> PipelineResult<RenderReport> {
        if frame.full_quality.is_none() || frame.source_profile.is_none() {
            let loaded = self.source.load(frame.path(), Resolution::Full)?;
            frame.full_quality = Some(loaded.samples);
            frame.source_profile = Some(loaded.profile);
        }
        let samples = frame
            .full_quality
            .take()
            .ok_or(PipelineError::Precondition {
                path: frame.path().to_path_buf(),
                what: "full-resolution samples",
            })?;
        tracing::debug!("Rendering {:?} at full resolution", frame.path());
        self.render(frame, samples, shared, profile, destination)
    }

    fn render(
        &self,
        frame: &mut Frame,
        samples: Rgb32FImage,
        shared: &TechnicalRecipe,
        profile: &CalibrationProfile,
        destination: Option<&DestinationProfile>,
    ) -> PipelineResult<RenderReport> {
        let (width, height) = samples.dimensions();
        if width == 0 || height == 0 {
            return Err(PipelineError::Precondition {
                path: frame.path().to_path_buf(),
                what: "non-empty sample buffer",
            });
        }
        let source_profile = frame.source_profile.as_ref().ok_or(PipelineError::Precondition {
            path: frame.path().to_path_buf(),
            what: "source color profile",
        })?;
        let recipe = frame.technical(shared).clone();
        recipe.validate()?;
        let creative = frame.creative.clone();

        let curves = source_curves(source_profile);
        let mut data = samples.into_raw();
        samples_to_density(&mut data, &curves, recipe.light_ratio);
        to_net_density(&mut data, profile.d_min);

        let target = frame_target(&recipe, &data, self.target.as_ref());
        normalize(&mut data, profile.extrema_density, target);
        align_channels(&mut data, profile.alignment);

        let clip_bound = profile.clip_bound(target);
        clip_above(&mut data, clip_bound);

        self.rendering.apply(&mut data);

        let rolloff_applied = target > recipe.rolloff_activation
            && rolloff_preserving_max(&mut data, &RolloffParams::from_recipe(&recipe));

        let space = self.to_output(&mut data, &creative)?;
        apply_tone_curve(&mut data, creative.tone_curve);

        if let Some(destination) = destination {
            convert_to_destination(&mut data, &space, destination)?;
        }

        let mut output =
            Rgb32FImage::from_raw(width, height, data).ok_or(PipelineError::Precondition {
                path: frame.path().to_path_buf(),
                what: "RGB sample layout",
            })?;
        if creative.flip_vertical {
            image::imageops::flip_vertical_in_place(&mut output);
        }
        frame.processed = Some(output);

        tracing::debug!(
            "Rendered {:?}: target {:.4}, clip {:.4}, rolloff {}",
            frame.path(),
            target,
            clip_bound,
            rolloff_applied
        );

        Ok(RenderReport {
            target,
            clip_bound,
            rolloff_applied,
            width,
            height,
        })
    }

    /// Scene-linear AP0 to the creative recipe's output encoding. Returns the
    /// space the buffer ends up in.
    fn to_output(&self, data: &mut [f32], creative: &CreativeRecipe) -> PipelineResult<OutputSpace> {
        match creative.display_mode {
            DisplayMode::Displays => {
                let space = OutputSpace::for_display(creative.display_space);
                display_transform(data, &space)?;
                Ok(space)
            }
            DisplayMode::Lut => {
                let lut = self.luts.load(&creative.lut_name)?;
                lut.apply(data);
                Ok(OutputSpace::rec709())
            }
        }
    }
}

/// Gamut-map AP0 into the display primaries, normalize to a unit max and
/// apply the display encoding.
pub fn display_transform(data: &mut [f32], space: &OutputSpace) -> PipelineResult<()> {
    apply_matrix(data, &space.from_working());
    for v in data.iter_mut() {
        *v = v.max(0.0);
    }
    let max = max_value(data);
    if max > 0.0 {
        for v in data.iter_mut() {
            *v /= max;
        }
    }
    space.encoding()?.apply(data);
    Ok(())
}

/// Mark a frame whose samples were supplied by the caller as untagged.
pub fn untagged_if_missing(frame: &mut Frame) {
    if frame.source_profile.is_none() {
        frame.source_profile = Some(SourceProfile::Untagged);
    }
}
