//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.input.extensions.is_empty() {
            return Err(ConfigError::ValidationError(
                "input.extensions must not be empty".into(),
            ));
        }
        if self.limits.max_file_size_mb == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_file_size_mb must be > 0".into(),
            ));
        }
        if self.limits.max_image_dimension == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_image_dimension must be > 0".into(),
            ));
        }
        if self.analysis.proxy_size == 0 {
            return Err(ConfigError::ValidationError(
                "analysis.proxy_size must be > 0".into(),
            ));
        }
        if self.analysis.memory_limit_mb == 0 {
            return Err(ConfigError::ValidationError(
                "analysis.memory_limit_mb must be > 0".into(),
            ));
        }
        let intervals = [
            ("analysis.extrema_check_interval", self.analysis.extrema_check_interval),
            (
                "analysis.histogram_check_interval",
                self.analysis.histogram_check_interval,
            ),
            (
                "analysis.alignment_check_interval",
                self.analysis.alignment_check_interval,
            ),
            ("analysis.batch_size", self.analysis.batch_size),
            ("export.memory_check_interval", self.export.memory_check_interval),
            ("progress.interval", self.progress.interval),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(ConfigError::ValidationError(format!("{name} must be > 0")));
            }
        }
        if self.render.preview_size == 0 {
            return Err(ConfigError::ValidationError(
                "render.preview_size must be > 0".into(),
            ));
        }
        let gain = self.render.rendering.gain();
        if !(gain.is_finite() && gain > 0.0) {
            return Err(ConfigError::ValidationError(
                "render.rendering.gain must be > 0".into(),
            ));
        }
        if self.export.memory_limit_mb == 0 {
            return Err(ConfigError::ValidationError(
                "export.memory_limit_mb must be > 0".into(),
            ));
        }
        if !(self.export.pressure_fraction > 0.0 && self.export.pressure_fraction <= 1.0) {
            return Err(ConfigError::ValidationError(
                "export.pressure_fraction must be between 0.0 and 1.0".into(),
            ));
        }
        if self.export.default_dir_name.is_empty()
            || self
                .export
                .default_dir_name
                .contains(|c: char| std::path::is_separator(c))
        {
            return Err(ConfigError::ValidationError(
                "export.default_dir_name must be a single folder name".into(),
            ));
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(ConfigError::UnknownVariant {
                field: "logging.format",
                value: self.logging.format.clone(),
                expected: "pretty, json".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::RenderingTransform;

    #[test]
    fn test_default_config_passes_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_proxy_size() {
        let mut config = Config::default();
        config.analysis.proxy_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("proxy_size"));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = Config::default();
        config.analysis.histogram_check_interval = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("histogram_check_interval"));
    }

    #[test]
    fn test_validate_rejects_bad_pressure_fraction() {
        let mut config = Config::default();
        config.export.pressure_fraction = 1.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("pressure_fraction"));

        config.export.pressure_fraction = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_positive_gain() {
        let mut config = Config::default();
        config.render.rendering = RenderingTransform::Linear { gain: 0.0 };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("gain"));
    }

    #[test]
    fn test_validate_rejects_unknown_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownVariant { .. })
        ));
    }
}
