//! Tone curves and highlight rolloff.

use crate::math::{max_value, percentile};
use crate::recipe::{TechnicalRecipe, ToneCurve};

/// Cubic smooth-step `3t^2 - 2t^3`.
pub fn smoothstep(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Quintic smoother-step `6t^5 - 15t^4 + 10t^3`.
pub fn smootherstep(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * t * (t * (6.0 * t - 15.0) + 10.0)
}

/// Apply a tone curve to `x / max(x)` and re-normalize to a unit max.
pub fn apply_tone_curve(data: &mut [f32], curve: ToneCurve) {
    let max = max_value(data);
    if max <= 0.0 {
        return;
    }
    let f: fn(f32) -> f32 = match curve {
        ToneCurve::None => |t: f32| t.max(0.0),
        ToneCurve::Standard => smoothstep,
        ToneCurve::Enhanced => smootherstep,
    };
    for v in data.iter_mut() {
        *v = f(*v / max);
    }
    let out_max = max_value(data);
    if out_max > 0.0 {
        for v in data.iter_mut() {
            *v /= out_max;
        }
    }
}

/// Percentile/multiplier pairs that place the rolloff shoulder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RolloffParams {
    pub threshold_percentile: f64,
    pub threshold_multiplier: f64,
    pub ceiling_percentile: f64,
    pub ceiling_multiplier: f64,
}

impl RolloffParams {
    pub fn from_recipe(recipe: &TechnicalRecipe) -> Self {
        Self {
            threshold_percentile: recipe.threshold_percentile,
            threshold_multiplier: recipe.threshold_multiplier,
            ceiling_percentile: recipe.extrema_high_density_percentile,
            ceiling_multiplier: recipe.extrema_high_density_multiplier,
        }
    }
}

/// Compress values above the threshold toward the ceiling.
///
/// Below the threshold `T` values pass through. Above it
/// `y = T + (x - T) / (1 + (x - T) / (M - T))`, which is continuous with unit
/// slope at `T` and approaches `M`. Returns false when the buffer has no
/// usable shoulder (`M <= T`) and was left unchanged.
pub fn rolloff(data: &mut [f32], params: &RolloffParams) -> bool {
    let (Some(threshold), Some(ceiling)) = (
        percentile(data, params.threshold_percentile),
        percentile(data, params.ceiling_percentile),
    ) else {
        return false;
    };
    let t = (threshold * params.threshold_multiplier) as f32;
    let m = (ceiling * params.ceiling_multiplier) as f32;
    if m <= t {
        return false;
    }
    let span = m - t;
    for v in data.iter_mut() {
        if *v > t {
            let over = *v - t;
            *v = t + over / (1.0 + over / span);
        }
    }
    true
}

/// Rolloff followed by a rescale so the post-rolloff max equals the
/// pre-rolloff max.
pub fn rolloff_preserving_max(data: &mut [f32], params: &RolloffParams) -> bool {
    let before = max_value(data);
    if !rolloff(data, params) {
        return false;
    }
    let after = max_value(data);
    if after > 0.0 {
        let scale = before / after;
        for v in data.iter_mut() {
            *v *= scale;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> RolloffParams {
        RolloffParams {
            threshold_percentile: 50.0,
            threshold_multiplier: 1.0,
            ceiling_percentile: 100.0,
            ceiling_multiplier: 1.0,
        }
    }

    #[test]
    fn test_curve_endpoints() {
        for f in [smoothstep, smootherstep] {
            assert_eq!(f(0.0), 0.0);
            assert!((f(1.0) - 1.0).abs() < 1e-6);
            assert!((f(0.5) - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn test_tone_curve_renormalizes_to_unit_max() {
        for curve in ToneCurve::ALL {
            let mut data: Vec<f32> = (0..30).map(|i| i as f32 * 0.37).collect();
            apply_tone_curve(&mut data, *curve);
            assert!((max_value(&data) - 1.0).abs() < 1e-6, "{curve}");
            assert!(data.iter().all(|v| *v >= 0.0));
        }
    }

    #[test]
    fn test_rolloff_preserves_max() {
        let mut data: Vec<f32> = (0..300).map(|i| (i as f32 / 30.0).powi(2)).collect();
        let before = max_value(&data);
        assert!(rolloff_preserving_max(&mut data, &params()));
        assert!((max_value(&data) - before).abs() <= before * 1e-5);
    }

    #[test]
    fn test_rolloff_compresses_and_keeps_order() {
        let original: Vec<f32> = (0..100).map(|i| i as f32 / 10.0).collect();
        let mut data = original.clone();
        assert!(rolloff(&mut data, &params()));
        let t = percentile(&original, 50.0).unwrap() as f32;
        for (a, b) in original.iter().zip(&data) {
            if *a <= t {
                assert_eq!(a, b);
            } else {
                assert!(b < a);
            }
        }
        assert!(data.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_rolloff_without_shoulder_is_noop() {
        let mut data = vec![0.5; 12];
        assert!(!rolloff_preserving_max(&mut data, &params()));
        assert_eq!(data, vec![0.5; 12]);
    }
}
