//! Input validation before decoding a frame.

use std::io::Read;
use std::path::Path;

use crate::config::LimitsConfig;
use crate::error::PipelineError;

/// Cheap checks run before a full decode.
pub struct Validator {
    limits: LimitsConfig,
}

impl Validator {
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    /// Checks:
    /// - File exists and is readable
    /// - File size is within limits
    /// - File starts with a recognized raster signature
    pub fn validate(&self, path: &Path) -> Result<(), PipelineError> {
        if !path.exists() {
            return Err(PipelineError::FileNotFound(path.to_path_buf()));
        }

        let metadata = std::fs::metadata(path).map_err(|e| PipelineError::Decode {
            path: path.to_path_buf(),
            message: format!("Cannot read metadata: {}", e),
        })?;

        let max_bytes = self.limits.max_file_size_mb * 1024 * 1024;
        if metadata.len() > max_bytes {
            return Err(PipelineError::FileTooLarge {
                path: path.to_path_buf(),
                size_mb: metadata.len() / (1024 * 1024),
                max_mb: self.limits.max_file_size_mb,
            });
        }

        self.check_magic_bytes(path)
    }

    /// Reject a decoded size above the configured dimension limit.
    pub fn check_dimensions(&self, path: &Path, width: u32, height: u32) -> Result<(), PipelineError> {
        let max_dim = self.limits.max_image_dimension;
        if width > max_dim || height > max_dim {
            return Err(PipelineError::ImageTooLarge {
                path: path.to_path_buf(),
                width,
                height,
                max_dim,
            });
        }
        Ok(())
    }

    fn check_magic_bytes(&self, path: &Path) -> Result<(), PipelineError> {
        let mut file = std::fs::File::open(path).map_err(|e| PipelineError::Decode {
            path: path.to_path_buf(),
            message: format!("Cannot open file: {}", e),
        })?;

        let mut header = [0u8; 8];
        let bytes_read = file.read(&mut header).unwrap_or(0);

        if !Self::is_valid_image_header(&header[..bytes_read]) {
            return Err(PipelineError::Decode {
                path: path.to_path_buf(),
                message: "Unrecognized image format (invalid magic bytes)".to_string(),
            });
        }
        Ok(())
    }

    /// Scans arrive as TIFF, occasionally PNG or JPEG.
    fn is_valid_image_header(header: &[u8]) -> bool {
        match header {
            // TIFF: II*\0 or MM\0*, BigTIFF uses version 43
            [b'I', b'I', 0x2A | 0x2B, 0x00, ..] | [b'M', b'M', 0x00, 0x2A | 0x2B, ..] => true,
            [0x89, b'P', b'N', b'G', ..] => true,
            [0xFF, 0xD8, 0xFF, ..] => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_bytes_tiff() {
        assert!(Validator::is_valid_image_header(&[b'I', b'I', 0x2A, 0x00]));
        assert!(Validator::is_valid_image_header(&[b'M', b'M', 0x00, 0x2A]));
        assert!(Validator::is_valid_image_header(&[b'I', b'I', 0x2B, 0x00]));
    }

    #[test]
    fn test_magic_bytes_bare_ii_rejected() {
        assert!(!Validator::is_valid_image_header(&[b'I', b'I', 0x00, 0x00]));
    }

    #[test]
    fn test_magic_bytes_png_and_jpeg() {
        assert!(Validator::is_valid_image_header(&[0x89, b'P', b'N', b'G', 0x0D]));
        assert!(Validator::is_valid_image_header(&[0xFF, 0xD8, 0xFF, 0xE0]));
    }

    #[test]
    fn test_short_header_rejected() {
        assert!(!Validator::is_valid_image_header(&[b'I', b'I']));
        assert!(!Validator::is_valid_image_header(&[]));
    }

    #[test]
    fn test_validate_missing_and_oversized() {
        let dir = tempfile::tempdir().unwrap();
        let validator = Validator::new(LimitsConfig {
            max_file_size_mb: 1,
            ..Default::default()
        });
        assert!(matches!(
            validator.validate(&dir.path().join("nope.tif")),
            Err(PipelineError::FileNotFound(_))
        ));

        let big = dir.path().join("big.tif");
        let mut bytes = vec![b'I', b'I', 0x2A, 0x00];
        bytes.resize(2 * 1024 * 1024, 0);
        std::fs::write(&big, bytes).unwrap();
        assert!(matches!(
            validator.validate(&big),
            Err(PipelineError::FileTooLarge { max_mb: 1, .. })
        ));
    }

    #[test]
    fn test_check_dimensions() {
        let validator = Validator::new(LimitsConfig::default());
        assert!(validator.check_dimensions(Path::new("a.tif"), 6000, 4000).is_ok());
        assert!(validator.check_dimensions(Path::new("a.tif"), 40000, 10).is_err());
    }
}
