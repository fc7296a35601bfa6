//! Output encoding with an adaptive JPEG size search.
//!
//! JPEG output is encoded in-memory with mozjpeg (4:4:4 chroma, optimized
//! coding) and re-encoded at progressively lower quality until the byte
//! ceiling is met or the quality floor is hit; the floor is a hard bound on
//! visual quality and takes precedence over the size target. PNG and WebP
//! encode exactly once at their configured levels.
//!
//! JPEG bytes are post-processed in-memory: the JFIF density fields carry
//! the configured DPI tag, and the original EXIF block is re-attached when
//! enabled.

use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ColorType, DynamicImage, ImageEncoder as _, RgbImage};
use img_parts::{Bytes, ImageEXIF};
use std::io::Cursor;

use crate::config::{OutputFormat, ProcessingConfig};
use crate::decode::ImageContext;
use crate::error::PipelineError;

/// Fixed decrement between adaptive JPEG attempts.
pub const QUALITY_STEP: u8 = 3;

/// Result of encoding one image.
pub struct EncodedOutput {
    pub bytes: Vec<u8>,
    /// Achieved JPEG quality; `None` for single-shot formats.
    pub quality: Option<u8>,
}

/// Serialize the final bitmap to the configured output format.
pub fn encode_image(
    image: &DynamicImage,
    context: &ImageContext,
    config: &ProcessingConfig,
) -> Result<EncodedOutput, PipelineError> {
    match config.output_format {
        OutputFormat::Jpeg => encode_jpeg_adaptive(image, context, config),
        OutputFormat::Png => encode_png(image, config),
        OutputFormat::WebP => encode_webp(image, config),
    }
}

/// Adaptive JPEG encoding: walk quality down by [`QUALITY_STEP`] until the
/// size ceiling is met or the floor is reached, then keep the last attempt
/// regardless.
fn encode_jpeg_adaptive(
    image: &DynamicImage,
    context: &ImageContext,
    config: &ProcessingConfig,
) -> Result<EncodedOutput, PipelineError> {
    // JPEG carries no alpha channel
    let rgb = flatten_to_white(image);
    let mut quality = config.jpeg_quality;

    loop {
        let mut bytes = encode_jpeg_once(&rgb, quality)?;
        set_jfif_density(&mut bytes, config.output_dpi);

        if config.keep_exif {
            if let Some(exif) = context.exif.as_deref() {
                bytes = attach_exif(bytes, exif);
            }
        }

        let size = bytes.len() as u64;
        let within = config.size_ceiling_bytes == 0 || size <= config.size_ceiling_bytes;

        if within || quality <= config.quality_floor {
            if !within {
                tracing::warn!(
                    size = size,
                    ceiling = config.size_ceiling_bytes,
                    quality = quality,
                    "Size ceiling unreachable at quality floor, keeping floor encode"
                );
            }
            tracing::debug!(quality = quality, size = size, "Encoded JPEG");
            return Ok(EncodedOutput {
                bytes,
                quality: Some(quality),
            });
        }

        quality = quality.saturating_sub(QUALITY_STEP).max(config.quality_floor);
    }
}

/// One in-memory mozjpeg encode at the given quality, 4:4:4 chroma.
fn encode_jpeg_once(rgb: &RgbImage, quality: u8) -> Result<Vec<u8>, PipelineError> {
    let mut comp = mozjpeg::Compress::new(mozjpeg::ColorSpace::JCS_RGB);
    comp.set_size(rgb.width() as usize, rgb.height() as usize);
    comp.set_quality(quality as f32);
    // No chroma subsampling: keeps watermark edges sharp
    comp.set_chroma_sampling_pixel_sizes((1, 1), (1, 1));
    comp.set_optimize_coding(true);

    let mut comp = comp
        .start_compress(Vec::new())
        .map_err(|e| PipelineError::encode("jpeg", e.to_string()))?;
    comp.write_scanlines(rgb.as_raw())
        .map_err(|e| PipelineError::encode("jpeg", e.to_string()))?;
    comp.finish()
        .map_err(|e| PipelineError::encode("jpeg", e.to_string()))
}

fn encode_png(
    image: &DynamicImage,
    config: &ProcessingConfig,
) -> Result<EncodedOutput, PipelineError> {
    let compression = match config.png_compression {
        0..=3 => CompressionType::Fast,
        4..=6 => CompressionType::Default,
        _ => CompressionType::Best,
    };

    let rgba = image.to_rgba8();
    let mut output = Cursor::new(Vec::new());
    let encoder = PngEncoder::new_with_quality(&mut output, compression, FilterType::Adaptive);

    encoder
        .write_image(&rgba, rgba.width(), rgba.height(), ColorType::Rgba8)
        .map_err(|e| PipelineError::encode("png", e.to_string()))?;

    Ok(EncodedOutput {
        bytes: output.into_inner(),
        quality: None,
    })
}

fn encode_webp(
    image: &DynamicImage,
    config: &ProcessingConfig,
) -> Result<EncodedOutput, PipelineError> {
    let rgba = image.to_rgba8();
    let encoder = webp::Encoder::from_rgba(&rgba, rgba.width(), rgba.height());
    let encoded = encoder.encode(config.webp_quality);

    Ok(EncodedOutput {
        bytes: encoded.to_vec(),
        quality: None,
    })
}

/// Flatten any alpha onto a white background; opaque inputs convert
/// directly.
fn flatten_to_white(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }

    let rgba = image.to_rgba8();
    let mut rgb = RgbImage::new(rgba.width(), rgba.height());

    for (dst, src) in rgb.chunks_exact_mut(3).zip(rgba.chunks_exact(4)) {
        let a = src[3] as u32;
        for channel in 0..3 {
            let c = src[channel] as u32;
            dst[channel] = ((c * a + 255 * (255 - a) + 127) / 255) as u8;
        }
    }

    rgb
}

/// Stamp the DPI into the JFIF APP0 density fields, in place.
///
/// mozjpeg always emits a JFIF header for YCbCr output; if the segment is
/// absent or malformed the bytes are left untouched.
fn set_jfif_density(bytes: &mut [u8], dpi: u16) {
    // SOI (2) + APP0 marker (2) + length (2) + "JFIF\0" (5) + version (2)
    // + units (1) + Xdensity (2) + Ydensity (2)
    if bytes.len() < 18 {
        return;
    }
    if bytes[0..2] != [0xFF, 0xD8] || bytes[2..4] != [0xFF, 0xE0] {
        return;
    }
    if &bytes[6..11] != b"JFIF\0" {
        return;
    }

    let density = dpi.to_be_bytes();
    bytes[13] = 1; // units: dots per inch
    bytes[14..16].copy_from_slice(&density);
    bytes[16..18].copy_from_slice(&density);
}

/// Re-attach the original EXIF block. Failures are non-fatal: the encoded
/// image is kept without metadata.
fn attach_exif(bytes: Vec<u8>, exif: &[u8]) -> Vec<u8> {
    match img_parts::jpeg::Jpeg::from_bytes(Bytes::from(bytes.clone())) {
        Ok(mut jpeg) => {
            jpeg.set_exif(Some(Bytes::copy_from_slice(exif)));
            let mut out = Vec::new();
            match jpeg.encoder().write_to(&mut out) {
                Ok(_) => out,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to write EXIF block, keeping bare JPEG");
                    bytes
                }
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to parse encoded JPEG for EXIF re-attach");
            bytes
        }
    }
}
