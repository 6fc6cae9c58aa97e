//! Recipes: the immutable parameter bags that drive calibration, rendering
//! and export.
//!
//! The technical recipe is the calibration cache key. The creative recipe only
//! affects rendering. Every string-valued mode is a closed enum: parsing an
//! unrecognized name is a [`ConfigError::UnknownVariant`], never a fallback.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigError;

/// Declares a closed, string-named enum that round-trips through serde as its
/// label and rejects unknown names.
macro_rules! named_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident ($field:literal) {
            $( $(#[$vmeta:meta])* $variant:ident => $label:literal $(| $alias:literal)* ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        $vis enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Canonical label.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = ConfigError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = s.trim();
                $(
                    if wanted.eq_ignore_ascii_case($label)
                        $(|| wanted.eq_ignore_ascii_case($alias))*
                    {
                        return Ok($name::$variant);
                    }
                )+
                Err(ConfigError::UnknownVariant {
                    field: $field,
                    value: s.to_string(),
                    expected: [$($label),+].join(", "),
                })
            }
        }

        impl TryFrom<String> for $name {
            type Error = ConfigError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.parse()
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> String {
                value.as_str().to_string()
            }
        }
    };
}

named_enum! {
    /// Where Dmin/Dmax come from.
    pub enum ReferenceMode ("reference_mode") {
        /// Measured from the roll in the extrema pass
        Auto => "Auto",
        /// Taken from `manual_d_min` / `manual_d_max`
        Manual => "Manual",
    }
}

named_enum! {
    /// Where the channel alignment coefficients come from.
    pub enum AlignMode ("align_mode") {
        Auto => "Auto",
        Manual => "Manual",
    }
}

named_enum! {
    /// How the per-frame target density is chosen.
    pub enum TargetMode ("target_mode") {
        /// Robust statistic over the frame's net density
        Auto => "Auto",
        /// The recipe's `manual_target`
        Manual => "Manual",
    }
}

named_enum! {
    /// Final tone curve applied after the display transform.
    pub enum ToneCurve ("tone_curve") {
        None => "None" | "Linear",
        Standard => "Standard" | "smoothstep",
        Enhanced => "Enhanced" | "smootherstep",
    }
}

named_enum! {
    /// Output transform family.
    pub enum DisplayMode ("display_mode") {
        /// Gamut conversion plus display encoding for a named display target
        Displays => "Displays" | "Display",
        /// Film-emulation 3-D LUT
        Lut => "LUT",
    }
}

named_enum! {
    /// Named display targets.
    pub enum DisplayTarget ("display_space") {
        DisplayP3 => "Display P3 - Display" | "display-p3" | "p3",
        Srgb => "sRGB - Display" | "srgb",
        Rec709 => "Rec.1886 Rec.709 - Display" | "rec709" | "rec1886",
    }
}

named_enum! {
    /// Export container and bit depth.
    pub enum ExportFormat ("format") {
        Jpg => "JPG" | "jpeg",
        Png => "PNG",
        Tif8 => "TIF8" | "tiff8",
        Tif16 => "TIF16" | "tiff16" | "tif" | "tiff",
    }
}

impl ExportFormat {
    /// File extension written for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Jpg => "jpg",
            ExportFormat::Png => "png",
            ExportFormat::Tif8 | ExportFormat::Tif16 => "tif",
        }
    }

    /// Bits per channel in the encoded file.
    pub fn bit_depth(&self) -> u8 {
        match self {
            ExportFormat::Tif16 => 16,
            _ => 8,
        }
    }
}

/// Calibration parameters. Any change yields a new calibration cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TechnicalRecipe {
    pub reference_mode: ReferenceMode,
    pub align_mode: AlignMode,

    /// Low percentile of per-frame density used for the Dmin candidate
    pub dmin_percentile: f64,
    /// High percentile of per-frame density used for the Dmax candidate
    pub dmax_percentile: f64,

    /// Percentile of the roll histogram defining the extrema density
    pub extrema_high_density_percentile: f64,
    /// Multiplier on the rolloff ceiling percentile
    pub extrema_high_density_multiplier: f64,
    /// Percentile where the rolloff shoulder starts
    pub threshold_percentile: f64,
    pub threshold_multiplier: f64,
    /// Percentile of the roll histogram defining the high density
    pub high_density_percentile: f64,
    /// Divides the extrema-to-high span when placing the clip threshold
    pub interpolation_factor: f64,
    /// Histogram bin count
    pub bins: usize,

    pub target_mode: TargetMode,
    /// Scale applied by the automatic target estimator
    pub target_factor: f64,
    /// Target density when `target_mode` is Manual
    pub manual_target: f64,
    /// Rolloff only runs when the frame target exceeds this density
    pub rolloff_activation: f64,

    /// Exponent handed to the alignment estimator
    pub efficiency_power: f64,
    /// Per-channel light source balance divided out of the samples
    pub light_ratio: [f64; 3],

    pub manual_d_min: [f64; 3],
    pub manual_d_max: [f64; 3],
    pub manual_alignment: [f64; 3],
}

impl Default for TechnicalRecipe {
    fn default() -> Self {
        Self {
            reference_mode: ReferenceMode::Auto,
            align_mode: AlignMode::Auto,
            dmin_percentile: 3.0,
            dmax_percentile: 99.9,
            extrema_high_density_percentile: 99.9999,
            extrema_high_density_multiplier: 1.0,
            threshold_percentile: 98.0,
            threshold_multiplier: 1.0,
            high_density_percentile: 99.0,
            interpolation_factor: 2.0,
            bins: 1024,
            target_mode: TargetMode::Auto,
            target_factor: 1.0,
            manual_target: 0.2,
            rolloff_activation: 0.45,
            efficiency_power: 1.0,
            light_ratio: [1.0, 1.0, 1.0],
            manual_d_min: [0.1838453, 0.49051684, 0.86234473],
            manual_d_max: [1.4, 2.6, 2.8],
            manual_alignment: [1.0, 0.94, 0.88],
        }
    }
}

impl TechnicalRecipe {
    /// Range-check every field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let percentiles = [
            ("dmin_percentile", self.dmin_percentile),
            ("dmax_percentile", self.dmax_percentile),
            (
                "extrema_high_density_percentile",
                self.extrema_high_density_percentile,
            ),
            ("threshold_percentile", self.threshold_percentile),
            ("high_density_percentile", self.high_density_percentile),
        ];
        for (name, value) in percentiles {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigError::ValidationError(format!(
                    "technical.{name} must be between 0 and 100"
                )));
            }
        }
        if self.dmin_percentile >= self.dmax_percentile {
            return Err(ConfigError::ValidationError(
                "technical.dmin_percentile must be below dmax_percentile".into(),
            ));
        }
        if self.bins < 2 {
            return Err(ConfigError::ValidationError(
                "technical.bins must be >= 2".into(),
            ));
        }
        let positives = [
            ("interpolation_factor", self.interpolation_factor),
            ("target_factor", self.target_factor),
            ("manual_target", self.manual_target),
            ("efficiency_power", self.efficiency_power),
            (
                "extrema_high_density_multiplier",
                self.extrema_high_density_multiplier,
            ),
            ("threshold_multiplier", self.threshold_multiplier),
        ];
        for (name, value) in positives {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::ValidationError(format!(
                    "technical.{name} must be > 0"
                )));
            }
        }
        if self.light_ratio.iter().any(|r| !(r.is_finite() && *r > 0.0)) {
            return Err(ConfigError::ValidationError(
                "technical.light_ratio entries must be > 0".into(),
            ));
        }
        if self.manual_alignment.iter().any(|k| !k.is_finite()) {
            return Err(ConfigError::ValidationError(
                "technical.manual_alignment entries must be finite".into(),
            ));
        }
        for c in 0..3 {
            if self.manual_d_max[c] <= self.manual_d_min[c] {
                return Err(ConfigError::ValidationError(
                    "technical.manual_d_max must exceed manual_d_min in every channel".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Rendering-only parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreativeRecipe {
    pub tone_curve: ToneCurve,
    pub display_mode: DisplayMode,
    pub display_space: DisplayTarget,
    /// LUT looked up through the LUT provider when `display_mode` is LUT
    pub lut_name: String,
    /// Scans come off the holder upside down
    pub flip_vertical: bool,
    /// Encoder quality for lossy formats (1-100)
    pub quality: u8,
}

impl Default for CreativeRecipe {
    fn default() -> Self {
        Self {
            tone_curve: ToneCurve::Standard,
            display_mode: DisplayMode::Displays,
            display_space: DisplayTarget::DisplayP3,
            lut_name: "Kodak 2383 (D65)".to_string(),
            flip_vertical: true,
            quality: 90,
        }
    }
}

/// Export parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportRecipe {
    pub format: ExportFormat,
    /// JPEG quality (1-100); ignored by lossless formats
    pub quality: u8,
    /// Defaults to `<roll>/@Exports`
    pub output_directory: Option<PathBuf>,
    /// Appended to the frame stem as `<stem>_<suffix>`
    pub filename_suffix: String,
    /// Destination matrix/TRC profile; converted to and embedded when set
    #[serde(skip)]
    pub icc_profile: Option<Vec<u8>>,
}

impl Default for ExportRecipe {
    fn default() -> Self {
        Self {
            format: ExportFormat::Jpg,
            quality: 90,
            output_directory: None,
            filename_suffix: "exported".to_string(),
            icc_profile: None,
        }
    }
}

impl ExportRecipe {
    /// Range-check the quality and suffix.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.quality) {
            return Err(ConfigError::ValidationError(
                "export.quality must be between 1 and 100".into(),
            ));
        }
        if self
            .filename_suffix
            .contains(|c: char| std::path::is_separator(c))
        {
            return Err(ConfigError::ValidationError(
                "export.filename_suffix must not contain path separators".into(),
            ));
        }
        Ok(())
    }

    /// Output file name for a frame stem.
    pub fn file_name(&self, stem: &str) -> String {
        if self.filename_suffix.is_empty() {
            format!("{stem}.{}", self.format.extension())
        } else {
            format!(
                "{stem}_{}.{}",
                self.filename_suffix,
                self.format.extension()
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_tone_curve_rejected() {
        let err = "Punchy".parse::<ToneCurve>().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::UnknownVariant {
                field: "tone_curve",
                ..
            }
        ));
    }

    #[test]
    fn test_labels_and_aliases_parse() {
        assert_eq!("LUT".parse::<DisplayMode>().unwrap(), DisplayMode::Lut);
        assert_eq!("lut".parse::<DisplayMode>().unwrap(), DisplayMode::Lut);
        assert_eq!(
            "Display P3 - Display".parse::<DisplayTarget>().unwrap(),
            DisplayTarget::DisplayP3
        );
        assert_eq!("tif16".parse::<ExportFormat>().unwrap(), ExportFormat::Tif16);
        for mode in TargetMode::ALL {
            assert_eq!(mode.as_str().parse::<TargetMode>().unwrap(), *mode);
        }
    }

    #[test]
    fn test_serde_rejects_unknown_mode() {
        let result: Result<TechnicalRecipe, _> = toml::from_str("target_mode = \"Sometimes\"");
        let err = result.unwrap_err().to_string();
        assert!(err.contains("target_mode"), "{err}");
    }

    #[test]
    fn test_serde_partial_recipe_uses_defaults() {
        let recipe: TechnicalRecipe = toml::from_str("bins = 256\ntarget_mode = \"Manual\"").unwrap();
        assert_eq!(recipe.bins, 256);
        assert_eq!(recipe.target_mode, TargetMode::Manual);
        assert_eq!(recipe.dmin_percentile, 3.0);
    }

    #[test]
    fn test_default_technical_recipe_is_valid() {
        assert!(TechnicalRecipe::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_percentile() {
        let recipe = TechnicalRecipe {
            dmax_percentile: 120.0,
            ..Default::default()
        };
        let err = recipe.validate().unwrap_err();
        assert!(err.to_string().contains("dmax_percentile"));
    }

    #[test]
    fn test_validate_rejects_zero_light_ratio() {
        let recipe = TechnicalRecipe {
            light_ratio: [1.0, 0.0, 1.0],
            ..Default::default()
        };
        assert!(recipe.validate().is_err());
    }

    #[test]
    fn test_export_file_name() {
        let recipe = ExportRecipe {
            format: ExportFormat::Tif16,
            ..Default::default()
        };
        assert_eq!(recipe.file_name("frame_01"), "frame_01_exported.tif");

        let bare = ExportRecipe {
            filename_suffix: String::new(),
            ..Default::default()
        };
        assert_eq!(bare.file_name("frame_01"), "frame_01.jpg");
    }

    #[test]
    fn test_export_quality_range() {
        let recipe = ExportRecipe {
            quality: 0,
            ..Default::default()
        };
        assert!(recipe.validate().is_err());
    }
}
