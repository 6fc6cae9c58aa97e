//! Optical density conversions over interleaved RGB buffers.

use serde::{Deserialize, Serialize};

use crate::color::ChannelCurves;

/// Transmittance floor; `t = 0` maps to a density of 10.
pub const TRANSMITTANCE_FLOOR: f32 = 1e-10;

/// `-log10(max(t, floor))`.
pub fn transmittance_to_density(t: f32) -> f32 {
    -t.max(TRANSMITTANCE_FLOOR).log10()
}

/// Scan samples to optical density, in place.
///
/// Samples are linearized with the source curves, divided by the per-channel
/// light ratio to get transmittance, then converted to density.
pub fn samples_to_density(data: &mut [f32], curves: &ChannelCurves, light_ratio: [f64; 3]) {
    curves.apply(data);
    let inv = light_ratio.map(|r| (1.0 / r) as f32);
    for px in data.chunks_exact_mut(3) {
        for c in 0..3 {
            px[c] = transmittance_to_density(px[c] * inv[c]);
        }
    }
}

/// Density relative to the film base: `density - d_min` per channel.
pub fn to_net_density(data: &mut [f32], d_min: [f64; 3]) {
    let d_min = d_min.map(|d| d as f32);
    for px in data.chunks_exact_mut(3) {
        for c in 0..3 {
            px[c] -= d_min[c];
        }
    }
}

/// Scale net density so `reference` lands on `target`.
pub fn normalize(data: &mut [f32], reference: f64, target: f64) {
    if reference <= 0.0 || !reference.is_finite() {
        tracing::debug!("Skipping normalization against non-positive reference {reference}");
        return;
    }
    let scale = (target / reference) as f32;
    for v in data.iter_mut() {
        *v *= scale;
    }
}

/// Clamp every sample to at most `bound`.
pub fn clip_above(data: &mut [f32], bound: f64) {
    let bound = bound as f32;
    for v in data.iter_mut() {
        *v = v.min(bound);
    }
}

/// Maps normalized net density to scene-linear light.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderingTransform {
    /// `10^(gain * d) - 1`: density is a log-exposure axis
    Exponential { gain: f64 },
    /// `gain * d`
    Linear { gain: f64 },
}

impl Default for RenderingTransform {
    fn default() -> Self {
        RenderingTransform::Exponential { gain: 1.0 }
    }
}

impl RenderingTransform {
    pub fn apply(&self, data: &mut [f32]) {
        match *self {
            RenderingTransform::Exponential { gain } => {
                let gain = gain as f32;
                for v in data.iter_mut() {
                    *v = 10f32.powf(gain * *v) - 1.0;
                }
            }
            RenderingTransform::Linear { gain } => {
                let gain = gain as f32;
                for v in data.iter_mut() {
                    *v *= gain;
                }
            }
        }
    }

    pub fn gain(&self) -> f64 {
        match *self {
            RenderingTransform::Exponential { gain } | RenderingTransform::Linear { gain } => gain,
        }
    }
}
