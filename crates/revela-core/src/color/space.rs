//! Output spaces and destination profiles.

use moxcms::{
    curve_from_gamma, ColorProfile, DataColorSpace, Layout, LocalizableString, Matrix3d,
    ProfileText, TransformExecutor, TransformOptions,
};

use crate::error::{PipelineError, PipelineResult};
use crate::recipe::DisplayTarget;

use super::curves::ChannelCurves;

/// The scene-linear working space renders pass through (ACES 2065-1, AP0).
pub fn working_space() -> ColorProfile {
    ColorProfile::new_aces_aces_2065_1_linear()
}

/// Where a rendered buffer lives: a display profile and its name.
#[derive(Debug, Clone)]
pub struct OutputSpace {
    pub name: &'static str,
    profile: ColorProfile,
}

impl OutputSpace {
    /// Output space for a named display target.
    pub fn for_display(target: DisplayTarget) -> Self {
        match target {
            DisplayTarget::DisplayP3 => Self {
                name: "Display P3",
                profile: ColorProfile::new_display_p3(),
            },
            DisplayTarget::Srgb => Self {
                name: "sRGB",
                profile: ColorProfile::new_srgb(),
            },
            DisplayTarget::Rec709 => Self::rec709(),
        }
    }

    /// BT.709 primaries with a BT.1886 (2.4) display encoding.
    ///
    /// Film-emulation LUT output is assumed to be in this space.
    pub fn rec709() -> Self {
        let mut profile = ColorProfile::new_srgb();
        let curve = curve_from_gamma(2.4);
        profile.red_trc = Some(curve.clone());
        profile.green_trc = Some(curve.clone());
        profile.blue_trc = Some(curve);
        profile.cicp = None;
        profile.description = Some(ProfileText::Localizable(vec![LocalizableString::new(
            "en".to_string(),
            "US".to_string(),
            "Rec.709".to_string(),
        )]));
        Self {
            name: "Rec.709",
            profile,
        }
    }

    pub fn profile(&self) -> &ColorProfile {
        &self.profile
    }

    /// Linear AP0 to linear RGB in this space's primaries, adapted through
    /// the D50 connection space.
    pub fn from_working(&self) -> Matrix3d {
        working_space().transform_matrix(&self.profile)
    }

    /// Linear light into this space's display encoding.
    pub fn encoding(&self) -> PipelineResult<ChannelCurves> {
        ChannelCurves::encoding(&self.profile)
    }

    /// Serialized ICC profile for embedding.
    pub fn icc(&self) -> PipelineResult<Vec<u8>> {
        Ok(self.profile.encode()?)
    }
}

/// Destination profile for full-quality renders: parsed form plus the raw
/// bytes for embedding.
#[derive(Debug, Clone)]
pub struct DestinationProfile {
    pub profile: ColorProfile,
    pub bytes: Vec<u8>,
}

impl DestinationProfile {
    pub fn from_bytes(bytes: Vec<u8>) -> PipelineResult<Self> {
        let profile = ColorProfile::new_from_slice(&bytes)?;
        if profile.color_space != DataColorSpace::Rgb {
            return Err(PipelineError::Profile(
                "destination profile is not RGB".into(),
            ));
        }
        Ok(Self { profile, bytes })
    }
}

/// Convert an encoded buffer from `space` into a destination profile's
/// encoding, in place. Samples are clamped to `[0, 1]` first.
pub fn convert_to_destination(
    data: &mut [f32],
    space: &OutputSpace,
    destination: &DestinationProfile,
) -> PipelineResult<()> {
    let options = TransformOptions {
        prefer_fixed_point: false,
        ..TransformOptions::default()
    };
    let transform =
        space
            .profile
            .create_transform_f32(Layout::Rgb, &destination.profile, Layout::Rgb, options)?;
    let source: Vec<f32> = data.iter().map(|v| v.clamp(0.0, 1.0)).collect();
    transform.transform(&source, data)?;
    Ok(())
}

/// Multiply every pixel of an interleaved RGB buffer by `m`.
pub fn apply_matrix(data: &mut [f32], m: &Matrix3d) {
    let m = m.v;
    for px in data.chunks_exact_mut(3) {
        let [r, g, b] = [px[0], px[1], px[2]].map(f64::from);
        for (out, row) in px.iter_mut().zip(m) {
            *out = (row[0] * r + row[1] * g + row[2] * b) as f32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_working_white_maps_to_display_white() {
        for target in [DisplayTarget::Srgb, DisplayTarget::DisplayP3, DisplayTarget::Rec709] {
            let space = OutputSpace::for_display(target);
            let mut white = vec![1.0, 1.0, 1.0];
            apply_matrix(&mut white, &space.from_working());
            for v in white {
                assert!((v - 1.0).abs() < 2e-3, "{}: {v}", space.name);
            }
        }
    }

    #[test]
    fn test_same_space_conversion_is_near_identity() {
        let space = OutputSpace::for_display(DisplayTarget::Srgb);
        let destination = DestinationProfile::from_bytes(space.icc().unwrap()).unwrap();
        let mut data = vec![0.1, 0.5, 0.9, 1.0, 0.0, 0.25];
        let before = data.clone();
        convert_to_destination(&mut data, &space, &destination).unwrap();
        for (a, b) in data.iter().zip(&before) {
            assert!((a - b).abs() < 2e-3, "{data:?} vs {before:?}");
        }
    }

    #[test]
    fn test_p3_red_is_inside_srgb_gamut_edge() {
        let p3 = OutputSpace::for_display(DisplayTarget::DisplayP3);
        let srgb = OutputSpace::for_display(DisplayTarget::Srgb);
        let destination = DestinationProfile::from_bytes(srgb.icc().unwrap()).unwrap();
        // P3 red lies outside sRGB, so it lands on the sRGB red edge
        let mut data = vec![0.9, 0.0, 0.0];
        convert_to_destination(&mut data, &p3, &destination).unwrap();
        assert!(data[0] > 0.9);
        assert!(data[1] < 0.05);
    }

    #[test]
    fn test_rec709_uses_bt1886_encoding() {
        let space = OutputSpace::rec709();
        let encode = space.encoding().unwrap();
        let expected = 0.5f32.powf(1.0 / 2.4);
        assert!((encode.evaluate(0, 0.5) - expected).abs() < 5e-3);
    }

    #[test]
    fn test_non_rgb_destination_rejected() {
        let gray = ColorProfile::new_gray_with_gamma(2.2).encode().unwrap();
        assert!(DestinationProfile::from_bytes(gray).is_err());
        assert!(DestinationProfile::from_bytes(vec![1, 2, 3]).is_err());
    }
}
