//! Source image decoding and metadata extraction.
//!
//! Decoding produces an owned bitmap plus an [`ImageContext`] carrying the
//! embedded ICC profile and EXIF block, threaded explicitly through the
//! pipeline stages instead of living in shared state. EXIF orientation is
//! applied to the pixels here so every later stage sees upright geometry.

use image::io::Reader as ImageReader;
use image::{imageops, DynamicImage, ImageFormat};
use img_parts::{Bytes, ImageEXIF, ImageICC};
use std::io::Cursor;

use crate::error::PipelineError;

/// Per-file metadata carried alongside the bitmap through the stages.
#[derive(Debug, Clone, Default)]
pub struct ImageContext {
    /// Embedded ICC profile bytes, if the source carried one.
    pub icc_profile: Option<Vec<u8>>,
    /// Raw EXIF block (TIFF structure), if the source carried one.
    pub exif: Option<Vec<u8>>,
}

/// A decoded source image with its extracted metadata.
pub struct DecodedImage {
    pub image: DynamicImage,
    pub context: ImageContext,
}

/// Decode image bytes and extract embedded metadata.
///
/// With `auto_orient` set, the EXIF orientation tag is applied to the
/// pixels so downstream stages never see sideways geometry.
pub fn decode_bytes(data: &[u8], auto_orient: bool) -> Result<DecodedImage, PipelineError> {
    let format = image::guess_format(data).ok();
    let context = extract_metadata(data, format);

    let mut image = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| PipelineError::Decode(e.to_string()))?
        .decode()
        .map_err(|e| PipelineError::Decode(e.to_string()))?;

    if auto_orient {
        if let Some(exif) = context.exif.as_deref() {
            image = apply_exif_orientation(image, exif);
        }
    }

    Ok(DecodedImage { image, context })
}

/// Pull ICC and EXIF segments out of the container without decoding pixels.
///
/// TIFF and BMP sources carry no extractable segments here; they decode
/// with an empty context.
fn extract_metadata(data: &[u8], format: Option<ImageFormat>) -> ImageContext {
    let bytes = Bytes::copy_from_slice(data);

    match format {
        Some(ImageFormat::Jpeg) => match img_parts::jpeg::Jpeg::from_bytes(bytes) {
            Ok(jpeg) => ImageContext {
                icc_profile: jpeg.icc_profile().map(|b| b.to_vec()),
                exif: jpeg.exif().map(|b| b.to_vec()),
            },
            Err(_) => ImageContext::default(),
        },
        Some(ImageFormat::Png) => match img_parts::png::Png::from_bytes(bytes) {
            Ok(png) => ImageContext {
                icc_profile: png.icc_profile().map(|b| b.to_vec()),
                exif: None,
            },
            Err(_) => ImageContext::default(),
        },
        Some(ImageFormat::WebP) => match img_parts::webp::WebP::from_bytes(bytes) {
            Ok(webp) => ImageContext {
                icc_profile: webp.icc_profile().map(|b| b.to_vec()),
                exif: webp.exif().map(|b| b.to_vec()),
            },
            Err(_) => ImageContext::default(),
        },
        _ => ImageContext::default(),
    }
}

/// Read the orientation tag from a raw EXIF block. Returns 1 (normal) when
/// the block is unreadable or the tag is absent.
fn read_orientation(exif_raw: &[u8]) -> u32 {
    let reader = exif::Reader::new();
    match reader.read_raw(exif_raw.to_vec()) {
        Ok(parsed) => parsed
            .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
            .and_then(|field| field.value.get_uint(0))
            .unwrap_or(1),
        Err(_) => 1,
    }
}

/// Apply EXIF orientation correction to an image.
fn apply_exif_orientation(img: DynamicImage, exif_raw: &[u8]) -> DynamicImage {
    let orientation = read_orientation(exif_raw);
    if orientation == 1 {
        return img;
    }

    tracing::debug!(orientation = orientation, "Applying EXIF orientation");

    let rgba = img.to_rgba8();
    let oriented = match orientation {
        2 => imageops::flip_horizontal(&rgba),
        3 => imageops::rotate180(&rgba),
        4 => imageops::flip_vertical(&rgba),
        5 => imageops::flip_horizontal(&imageops::rotate90(&rgba)),
        6 => imageops::rotate90(&rgba),
        7 => imageops::flip_horizontal(&imageops::rotate270(&rgba)),
        8 => imageops::rotate270(&rgba),
        _ => rgba,
    };
    DynamicImage::ImageRgba8(oriented)
}
