//! Per-frame target density and per-channel alignment.
//!
//! Both statistics sit behind traits. The defaults reproduce fixed constants
//! (target `0.5 x factor`, coefficients `[1.0, 0.9, 0.95]`); the alternative
//! estimators here are opt-in and carry their own identifiers so switching
//! estimators invalidates cached calibrations.

use crate::math::{percentile, percentile_in_place};
use crate::recipe::{TargetMode, TechnicalRecipe};

/// Chooses a frame's target density from its net density.
pub trait TargetEstimator: Send + Sync {
    /// Stable identifier, part of the calibration cache key.
    fn id(&self) -> String;

    fn estimate(&self, net_density: &[f32], factor: f64) -> f64;
}

/// Derives per-channel alignment coefficients from a frame's normalized net
/// density.
pub trait AlignmentEstimator: Send + Sync {
    /// Stable identifier, part of the calibration cache key.
    fn id(&self) -> String;

    fn coefficients(&self, normalized: &[f32], efficiency_power: f64) -> [f64; 3];
}

/// Constant target, scaled by the recipe factor.
#[derive(Debug, Clone, Copy)]
pub struct FixedTarget {
    pub value: f64,
}

impl Default for FixedTarget {
    fn default() -> Self {
        Self { value: 0.5 }
    }
}

impl TargetEstimator for FixedTarget {
    fn id(&self) -> String {
        format!("fixed-target:{}", self.value)
    }

    fn estimate(&self, _net_density: &[f32], factor: f64) -> f64 {
        self.value * factor
    }
}

/// Target from a high percentile of the frame's own net density.
#[derive(Debug, Clone, Copy)]
pub struct PercentileTarget {
    pub percentile: f64,
}

impl Default for PercentileTarget {
    fn default() -> Self {
        Self { percentile: 99.0 }
    }
}

impl TargetEstimator for PercentileTarget {
    fn id(&self) -> String {
        format!("percentile-target:{}", self.percentile)
    }

    fn estimate(&self, net_density: &[f32], factor: f64) -> f64 {
        percentile(net_density, self.percentile).unwrap_or(0.0) * factor
    }
}

/// Constant coefficients.
#[derive(Debug, Clone, Copy)]
pub struct FixedAlignment {
    pub coefficients: [f64; 3],
}

impl Default for FixedAlignment {
    fn default() -> Self {
        Self {
            coefficients: [1.0, 0.9, 0.95],
        }
    }
}

impl AlignmentEstimator for FixedAlignment {
    fn id(&self) -> String {
        let [r, g, b] = self.coefficients;
        format!("fixed-alignment:{r},{g},{b}")
    }

    fn coefficients(&self, _normalized: &[f32], _efficiency_power: f64) -> [f64; 3] {
        self.coefficients
    }
}

/// Scales red and blue so near-neutral mid-tones match green.
///
/// Pixels are kept when their luminance lies inside a percentile band and
/// their chroma (max - min across channels) is below a percentile cutoff.
/// Each kept pixel is weighted by `luminance^efficiency_power`. Falls back to
/// unit coefficients when nothing qualifies.
#[derive(Debug, Clone, Copy)]
pub struct NeutralAxisAlignment {
    pub luma_band: (f64, f64),
    pub chroma_percentile: f64,
}

impl Default for NeutralAxisAlignment {
    fn default() -> Self {
        Self {
            luma_band: (5.0, 95.0),
            chroma_percentile: 25.0,
        }
    }
}

impl AlignmentEstimator for NeutralAxisAlignment {
    fn id(&self) -> String {
        format!(
            "neutral-axis:{}-{}:{}",
            self.luma_band.0, self.luma_band.1, self.chroma_percentile
        )
    }

    fn coefficients(&self, normalized: &[f32], efficiency_power: f64) -> [f64; 3] {
        let pixels: Vec<[f32; 3]> = normalized
            .chunks_exact(3)
            .map(|p| [p[0], p[1], p[2]])
            .collect();
        if pixels.is_empty() {
            return [1.0; 3];
        }
        let luma: Vec<f32> = pixels.iter().map(|p| (p[0] + p[1] + p[2]) / 3.0).collect();
        let mut chroma: Vec<f32> = pixels
            .iter()
            .map(|p| p[0].max(p[1]).max(p[2]) - p[0].min(p[1]).min(p[2]))
            .collect();
        let (Some(lo), Some(hi), Some(chroma_cut)) = (
            percentile(&luma, self.luma_band.0),
            percentile(&luma, self.luma_band.1),
            percentile_in_place(&mut chroma, self.chroma_percentile),
        ) else {
            return [1.0; 3];
        };

        let mut sums = [0.0f64; 3];
        let mut weight_total = 0.0;
        for (p, l) in pixels.iter().zip(&luma) {
            let l64 = f64::from(*l);
            let c = f64::from(p[0].max(p[1]).max(p[2]) - p[0].min(p[1]).min(p[2]));
            if l64 < lo || l64 > hi || c > chroma_cut || l64 <= 0.0 {
                continue;
            }
            let w = l64.powf(efficiency_power);
            for ch in 0..3 {
                sums[ch] += w * f64::from(p[ch]);
            }
            weight_total += w;
        }
        if weight_total <= 0.0 || sums.iter().any(|s| *s <= 0.0) {
            return [1.0; 3];
        }
        [sums[1] / sums[0], 1.0, sums[1] / sums[2]]
    }
}

/// Target density for a frame under the recipe's target mode.
pub fn frame_target(
    recipe: &TechnicalRecipe,
    net_density: &[f32],
    estimator: &dyn TargetEstimator,
) -> f64 {
    match recipe.target_mode {
        TargetMode::Auto => estimator.estimate(net_density, recipe.target_factor),
        TargetMode::Manual => recipe.manual_target,
    }
}

/// Multiply each channel by its coefficient.
pub fn align_channels(data: &mut [f32], coefficients: [f64; 3]) {
    let k = coefficients.map(|k| k as f32);
    for px in data.chunks_exact_mut(3) {
        for c in 0..3 {
            px[c] *= k[c];
        }
    }
}

/// Running arithmetic mean of per-frame coefficient vectors.
#[derive(Debug, Clone, Default)]
pub struct CoefficientAccumulator {
    sum: [f64; 3],
    frames: u64,
}

impl CoefficientAccumulator {
    pub fn add(&mut self, k: [f64; 3]) {
        for (s, v) in self.sum.iter_mut().zip(k) {
            *s += v;
        }
        self.frames += 1;
    }

    pub fn merge(&mut self, other: &CoefficientAccumulator) {
        for (s, v) in self.sum.iter_mut().zip(other.sum) {
            *s += v;
        }
        self.frames += other.frames;
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn finish(&self) -> Option<[f64; 3]> {
        if self.frames == 0 {
            return None;
        }
        let n = self.frames as f64;
        Some(self.sum.map(|s| s / n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_defaults() {
        assert_eq!(FixedTarget::default().estimate(&[], 2.0), 1.0);
        assert_eq!(
            FixedAlignment::default().coefficients(&[], 1.0),
            [1.0, 0.9, 0.95]
        );
    }

    #[test]
    fn test_estimator_ids_differ() {
        assert_ne!(FixedTarget::default().id(), PercentileTarget::default().id());
        assert_ne!(
            FixedAlignment::default().id(),
            NeutralAxisAlignment::default().id()
        );
        assert_ne!(
            FixedTarget { value: 0.5 }.id(),
            FixedTarget { value: 0.6 }.id()
        );
    }

    #[test]
    fn test_frame_target_modes() {
        let mut recipe = TechnicalRecipe::default();
        let estimator = FixedTarget::default();
        assert_eq!(frame_target(&recipe, &[], &estimator), 0.5);
        recipe.target_mode = TargetMode::Manual;
        recipe.manual_target = 0.33;
        assert_eq!(frame_target(&recipe, &[], &estimator), 0.33);
    }

    #[test]
    fn test_align_channels() {
        let mut data = vec![1.0, 1.0, 1.0, 2.0, 2.0, 2.0];
        align_channels(&mut data, [1.0, 0.5, 2.0]);
        assert_eq!(data, vec![1.0, 0.5, 2.0, 2.0, 1.0, 4.0]);
    }

    #[test]
    fn test_neutral_axis_recovers_channel_gain() {
        // neutral grey ramp with red running 25% hot and blue 20% cold
        let mut data = Vec::new();
        for i in 1..=200 {
            let v = i as f32 / 200.0;
            data.extend_from_slice(&[v * 1.25, v, v * 0.8]);
        }
        let k = NeutralAxisAlignment {
            luma_band: (0.0, 100.0),
            chroma_percentile: 100.0,
        }
        .coefficients(&data, 1.0);
        assert!((k[0] - 0.8).abs() < 1e-3, "{k:?}");
        assert_eq!(k[1], 1.0);
        assert!((k[2] - 1.25).abs() < 1e-3, "{k:?}");
    }

    #[test]
    fn test_neutral_axis_empty_falls_back() {
        assert_eq!(NeutralAxisAlignment::default().coefficients(&[], 1.0), [1.0; 3]);
    }

    #[test]
    fn test_coefficient_mean_and_merge() {
        let mut a = CoefficientAccumulator::default();
        a.add([1.0, 0.9, 0.8]);
        let mut b = CoefficientAccumulator::default();
        b.add([1.0, 1.1, 1.2]);
        b.add([1.0, 1.0, 1.0]);
        a.merge(&b);
        let k = a.finish().unwrap();
        assert!((k[1] - 1.0).abs() < 1e-12);
        assert!((k[2] - 1.0).abs() < 1e-12);
        assert!(CoefficientAccumulator::default().finish().is_none());
    }
}
