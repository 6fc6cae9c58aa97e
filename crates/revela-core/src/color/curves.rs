//! Per-channel tone response curves taken from ICC profiles.

use moxcms::{CmsError, ColorProfile, ToneCurveEvaluator, ToneReprCurve};

use crate::error::{PipelineError, PipelineResult};

type Evaluator = Box<dyn ToneCurveEvaluator + Send + Sync>;

/// One evaluator per RGB channel, applied in a single direction
/// (encoded to linear, or linear to encoded). No evaluators is the identity.
#[derive(Default)]
pub struct ChannelCurves {
    evaluators: Option<[Evaluator; 3]>,
}

impl ChannelCurves {
    pub fn linear() -> Self {
        Self::default()
    }

    /// Encoded samples to linear light through the profile's TRCs.
    pub fn linearizing(profile: &ColorProfile) -> PipelineResult<Self> {
        Self::build(profile, ToneReprCurve::make_linear_evaluator)
    }

    /// Linear light into the profile's encoding.
    pub fn encoding(profile: &ColorProfile) -> PipelineResult<Self> {
        Self::build(profile, ToneReprCurve::make_gamma_evaluator)
    }

    fn build<F>(profile: &ColorProfile, make: F) -> PipelineResult<Self>
    where
        F: Fn(&ToneReprCurve) -> Result<Evaluator, CmsError>,
    {
        let [r, g, b] = match (
            &profile.red_trc,
            &profile.green_trc,
            &profile.blue_trc,
            &profile.gray_trc,
        ) {
            (Some(r), Some(g), Some(b), _) => [r, g, b],
            (_, _, _, Some(k)) => [k, k, k],
            _ => {
                return Err(PipelineError::Profile(
                    "profile has no tone response curves".into(),
                ))
            }
        };
        let make = |curve: &ToneReprCurve| make(curve).map_err(PipelineError::from);
        Ok(Self {
            evaluators: Some([make(r)?, make(g)?, make(b)?]),
        })
    }

    pub fn is_identity(&self) -> bool {
        self.evaluators.is_none()
    }

    /// Evaluate one channel's curve; input is clamped to `[0, 1]`.
    pub fn evaluate(&self, channel: usize, value: f32) -> f32 {
        match &self.evaluators {
            Some(evaluators) => evaluators[channel].evaluate_value(value.clamp(0.0, 1.0)),
            None => value,
        }
    }

    /// Apply the curves to an interleaved RGB buffer, in place.
    pub fn apply(&self, data: &mut [f32]) {
        let Some(evaluators) = &self.evaluators else {
            return;
        };
        for px in data.chunks_exact_mut(3) {
            for (v, curve) in px.iter_mut().zip(evaluators) {
                *v = curve.evaluate_value(v.clamp(0.0, 1.0));
            }
        }
    }
}

impl std::fmt::Debug for ChannelCurves {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelCurves")
            .field("identity", &self.is_identity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_srgb_curves_known_values() {
        let profile = ColorProfile::new_srgb();
        let decode = ChannelCurves::linearizing(&profile).unwrap();
        let encode = ChannelCurves::encoding(&profile).unwrap();
        assert!((decode.evaluate(0, 0.5) - 0.21404).abs() < 1e-3);
        assert!((encode.evaluate(1, 0.21404) - 0.5).abs() < 1e-3);
        assert!(decode.evaluate(2, 0.0).abs() < 1e-6);
        assert!((decode.evaluate(2, 1.0) - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_encoding_inverts_linearizing() {
        let profile = ColorProfile::new_display_p3();
        let decode = ChannelCurves::linearizing(&profile).unwrap();
        let encode = ChannelCurves::encoding(&profile).unwrap();
        for i in 0..=20 {
            let v = i as f32 / 20.0;
            let back = encode.evaluate(0, decode.evaluate(0, v));
            assert!((back - v).abs() < 2e-3, "{v} -> {back}");
        }
    }

    #[test]
    fn test_gray_profile_repeats_curve() {
        let profile = ColorProfile::new_gray_with_gamma(2.0);
        let curves = ChannelCurves::linearizing(&profile).unwrap();
        let mut data = vec![0.5, 0.5, 0.5];
        curves.apply(&mut data);
        for v in data {
            assert!((v - 0.25).abs() < 1e-2, "{v}");
        }
    }

    #[test]
    fn test_profile_without_curves_rejected() {
        assert!(ChannelCurves::linearizing(&ColorProfile::default()).is_err());
    }

    #[test]
    fn test_identity_leaves_buffer_alone() {
        let curves = ChannelCurves::linear();
        assert!(curves.is_identity());
        let mut data = vec![1.5, -0.2, 0.3];
        curves.apply(&mut data);
        assert_eq!(data, vec![1.5, -0.2, 0.3]);
    }
}
