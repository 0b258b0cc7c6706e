use std::io::Cursor;

use image::imageops::FilterType;
use image::ImageFormat;
use thiserror::Error;

pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
pub const MAX_SOURCE_DIMENSION: u32 = 8192;
pub const MAX_UPLOAD_DIMENSION: u32 = 1440;
pub const UPLOAD_MIME_TYPE: &str = "image/jpeg";

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("image size {size} bytes exceeds maximum of {max} bytes")]
    TooLarge { size: usize, max: usize },

    #[error("image dimensions {width}x{height} exceed maximum of {max}x{max}")]
    DimensionsTooLarge { width: u32, height: u32, max: u32 },

    #[error("unsupported image format")]
    UnsupportedFormat,

    #[error("failed to decode image: {0}")]
    DecodeFailed(String),

    #[error("failed to encode image: {0}")]
    EncodeFailed(String),
}

#[derive(Clone)]
pub struct PreparedImage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub mime_type: &'static str,
}

impl std::fmt::Debug for PreparedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedImage")
            .field("bytes", &self.data.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

/// Validates and normalizes a picked or captured image before it goes to
/// the blob store: format sniffing, size and dimension caps, downscale to
/// the upload bound, re-encode as JPEG. Picker metadata never survives the
/// re-encode.
pub fn prepare_for_upload(data: &[u8]) -> Result<PreparedImage, ImageError> {
    if data.len() > MAX_IMAGE_BYTES {
        return Err(ImageError::TooLarge {
            size: data.len(),
            max: MAX_IMAGE_BYTES,
        });
    }

    let format = image::guess_format(data).map_err(|_| ImageError::UnsupportedFormat)?;
    if !matches!(
        format,
        ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::WebP
    ) {
        return Err(ImageError::UnsupportedFormat);
    }

    let img = image::load_from_memory_with_format(data, format)
        .map_err(|e| ImageError::DecodeFailed(e.to_string()))?;

    let (width, height) = (img.width(), img.height());
    if width > MAX_SOURCE_DIMENSION || height > MAX_SOURCE_DIMENSION {
        return Err(ImageError::DimensionsTooLarge {
            width,
            height,
            max: MAX_SOURCE_DIMENSION,
        });
    }

    tracing::debug!(width, height, ?format, "attachment image decoded");

    let resized = if width > MAX_UPLOAD_DIMENSION || height > MAX_UPLOAD_DIMENSION {
        img.resize(
            MAX_UPLOAD_DIMENSION,
            MAX_UPLOAD_DIMENSION,
            FilterType::Lanczos3,
        )
    } else {
        img
    };

    // JPEG carries no alpha channel; flatten before encoding.
    let rgb = image::DynamicImage::ImageRgb8(resized.to_rgb8());

    let mut out = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut out), ImageFormat::Jpeg)
        .map_err(|e| ImageError::EncodeFailed(e.to_string()))?;

    Ok(PreparedImage {
        data: out,
        width: rgb.width(),
        height: rgb.height(),
        mime_type: UPLOAD_MIME_TYPE,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            width,
            height,
            image::Rgb([120, 180, 90]),
        ));
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn small_image_keeps_dimensions() {
        let prepared = prepare_for_upload(&png_bytes(32, 24)).unwrap();
        assert_eq!((prepared.width, prepared.height), (32, 24));
        assert_eq!(prepared.mime_type, "image/jpeg");
        assert!(!prepared.data.is_empty());
    }

    #[test]
    fn large_image_is_downscaled_preserving_aspect() {
        let prepared = prepare_for_upload(&png_bytes(2880, 1440)).unwrap();
        assert_eq!(prepared.width, MAX_UPLOAD_DIMENSION);
        assert_eq!(prepared.height, MAX_UPLOAD_DIMENSION / 2);
    }

    #[test]
    fn output_is_jpeg() {
        let prepared = prepare_for_upload(&png_bytes(16, 16)).unwrap();
        assert_eq!(
            image::guess_format(&prepared.data).unwrap(),
            ImageFormat::Jpeg
        );
    }

    #[test]
    fn alpha_channel_is_flattened() {
        let img = image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            8,
            8,
            image::Rgba([10, 20, 30, 128]),
        ));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();

        assert!(prepare_for_upload(&bytes).is_ok());
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let blob = vec![0u8; MAX_IMAGE_BYTES + 1];
        assert!(matches!(
            prepare_for_upload(&blob),
            Err(ImageError::TooLarge { .. })
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(prepare_for_upload(&[0x00, 0x01, 0x02, 0x03]).is_err());
    }

    #[test]
    fn unsupported_format_is_rejected() {
        // A GIF header sniffs as GIF, which is not an accepted upload format.
        let gif = b"GIF89a\x01\x00\x01\x00\x00\x00\x00";
        assert!(matches!(
            prepare_for_upload(gif),
            Err(ImageError::UnsupportedFormat)
        ));
    }

    #[test]
    fn truncated_image_fails_decode() {
        let mut bytes = png_bytes(64, 64);
        bytes.truncate(bytes.len() / 2);
        assert!(matches!(
            prepare_for_upload(&bytes),
            Err(ImageError::DecodeFailed(_))
        ));
    }
}
