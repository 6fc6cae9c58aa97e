//! Encoding rendered buffers into JPEG, PNG or TIFF bytes.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::tiff::TiffEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgb32FImage};
use std::io::Cursor;
use std::path::Path;

use crate::error::{PipelineError, PipelineResult};
use crate::recipe::ExportFormat;

/// Quantize `[0, 1]` samples to 8 bits.
pub fn to_u8(data: &[f32]) -> Vec<u8> {
    data.iter()
        .map(|&v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
        .collect()
}

/// Quantize `[0, 1]` samples to the full 16-bit range.
pub fn to_u16(data: &[f32]) -> Vec<u16> {
    data.iter()
        .map(|&v| (v.clamp(0.0, 1.0) * 65535.0).round() as u16)
        .collect()
}

/// Encode a rendered frame, embedding `icc` when the container supports it.
///
/// `path` only labels errors and log lines.
pub fn encode(
    image: &Rgb32FImage,
    format: ExportFormat,
    quality: u8,
    icc: Option<&[u8]>,
    path: &Path,
) -> PipelineResult<Vec<u8>> {
    let (width, height) = image.dimensions();
    let mut out = Cursor::new(Vec::new());

    match format {
        ExportFormat::Jpg => {
            let encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
            let buf = to_u8(image.as_raw());
            write(encoder, &buf, width, height, ExtendedColorType::Rgb8, icc, path)?;
        }
        ExportFormat::Png => {
            let encoder = PngEncoder::new(&mut out);
            let buf = to_u8(image.as_raw());
            write(encoder, &buf, width, height, ExtendedColorType::Rgb8, icc, path)?;
        }
        ExportFormat::Tif8 => {
            let encoder = TiffEncoder::new(&mut out);
            let buf = to_u8(image.as_raw());
            write(encoder, &buf, width, height, ExtendedColorType::Rgb8, icc, path)?;
        }
        ExportFormat::Tif16 => {
            let bytes: Vec<u8> = to_u16(image.as_raw())
                .into_iter()
                .flat_map(u16::to_ne_bytes)
                .collect();
            let encoder = TiffEncoder::new(&mut out);
            write(encoder, &bytes, width, height, ExtendedColorType::Rgb16, icc, path)?;
        }
    }

    Ok(out.into_inner())
}

fn write<E: ImageEncoder>(
    mut encoder: E,
    buf: &[u8],
    width: u32,
    height: u32,
    color: ExtendedColorType,
    icc: Option<&[u8]>,
    path: &Path,
) -> PipelineResult<()> {
    if let Some(icc) = icc {
        if let Err(e) = encoder.set_icc_profile(icc.to_vec()) {
            tracing::warn!("Color profile not embedded in {:?}: {}", path, e);
        }
    }
    encoder
        .write_image(buf, width, height, color)
        .map_err(|e| PipelineError::Encode {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::OutputSpace;
    use crate::recipe::DisplayTarget;
    use image::codecs::tiff::TiffDecoder;
    use image::{DynamicImage, ImageDecoder, ImageFormat};

    fn gradient() -> Rgb32FImage {
        Rgb32FImage::from_fn(8, 4, |x, y| {
            image::Rgb([x as f32 / 7.0, y as f32 / 3.0, 0.5])
        })
    }

    fn decode(bytes: &[u8]) -> DynamicImage {
        image::load_from_memory(bytes).unwrap()
    }

    #[test]
    fn test_quantization_endpoints() {
        assert_eq!(to_u8(&[0.0, 1.0, -0.5, 2.0]), vec![0, 255, 0, 255]);
        assert_eq!(to_u16(&[0.0, 1.0, 0.5]), vec![0, 65535, 32768]);
    }

    #[test]
    fn test_encode_png_is_8_bit() {
        let bytes = encode(&gradient(), ExportFormat::Png, 90, None, Path::new("a.png")).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Png);
        let img = decode(&bytes);
        assert!(matches!(img, DynamicImage::ImageRgb8(_)));
        assert_eq!(img.to_rgb8().get_pixel(7, 3)[0], 255);
    }

    #[test]
    fn test_encode_tiff16_keeps_full_range() {
        let bytes = encode(&gradient(), ExportFormat::Tif16, 90, None, Path::new("a.tif")).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Tiff);
        let img = decode(&bytes).to_rgb16();
        assert_eq!(img.dimensions(), (8, 4));
        assert_eq!(img.get_pixel(7, 0)[0], 65535);
        assert_eq!(img.get_pixel(0, 0)[2], 32768);
    }

    #[test]
    fn test_encode_jpeg_quality_changes_size() {
        let img = Rgb32FImage::from_fn(64, 64, |x, y| {
            let v = ((x * 7 + y * 13) % 17) as f32 / 16.0;
            image::Rgb([v, 1.0 - v, (v * 3.0).fract()])
        });
        let small = encode(&img, ExportFormat::Jpg, 10, None, Path::new("a.jpg")).unwrap();
        let large = encode(&img, ExportFormat::Jpg, 100, None, Path::new("a.jpg")).unwrap();
        assert_eq!(image::guess_format(&small).unwrap(), ImageFormat::Jpeg);
        assert!(small.len() < large.len());
    }

    fn srgb_icc() -> Vec<u8> {
        OutputSpace::for_display(DisplayTarget::Srgb).icc().unwrap()
    }

    #[test]
    fn test_encode_embeds_profile_in_png() {
        let icc = srgb_icc();
        let bytes = encode(&gradient(), ExportFormat::Png, 90, Some(&icc), Path::new("a.png")).unwrap();
        let mut decoder = image::codecs::png::PngDecoder::new(Cursor::new(&bytes)).unwrap();
        assert_eq!(decoder.icc_profile().unwrap(), Some(icc));
    }

    #[test]
    fn test_encode_embeds_profile_in_tiff() {
        let icc = srgb_icc();
        for format in [ExportFormat::Tif8, ExportFormat::Tif16] {
            let bytes = encode(&gradient(), format, 90, Some(&icc), Path::new("a.tif")).unwrap();
            let mut decoder = TiffDecoder::new(Cursor::new(&bytes)).unwrap();
            assert_eq!(decoder.icc_profile().unwrap(), Some(icc.clone()), "{format:?}");
        }
    }
}
