//! Aspect-preserving resize to a long-edge pixel target.
//!
//! The long edge is determined per image: landscape and portrait inputs are
//! handled by the same rule. Images at or below the target are returned
//! unchanged; the pipeline never upscales.

use fast_image_resize::{FilterType, Image, PixelType, ResizeAlg, Resizer};
use image::{DynamicImage, RgbaImage};
use std::num::NonZeroU32;

use crate::error::PipelineError;

/// Downscale so that `max(width, height) == long_edge`, preserving aspect
/// ratio. Returns the input untouched when the long edge already fits.
///
/// The short edge is computed with integer math (`short * long_edge / long`,
/// rounded down, minimum 1 px) so the long edge lands on the target exactly.
pub fn resize_long_edge(img: DynamicImage, long_edge: u32) -> Result<DynamicImage, PipelineError> {
    let (width, height) = (img.width(), img.height());
    let long = width.max(height);

    if long <= long_edge {
        return Ok(img);
    }

    let (target_w, target_h) = if width >= height {
        let short = ((height as u64 * long_edge as u64) / width as u64).max(1) as u32;
        (long_edge, short)
    } else {
        let short = ((width as u64 * long_edge as u64) / height as u64).max(1) as u32;
        (short, long_edge)
    };

    tracing::debug!(
        from_width = width,
        from_height = height,
        to_width = target_w,
        to_height = target_h,
        "Resizing to long-edge target"
    );

    let resized = resize_rgba(&img.to_rgba8(), target_w, target_h)?;
    Ok(DynamicImage::ImageRgba8(resized))
}

/// Resize an RGBA buffer to exact dimensions with a Lanczos3 filter.
///
/// Also used by the watermark renderer to scale tiles, so that tiles and
/// canvases go through the same resampling path.
pub fn resize_rgba(src: &RgbaImage, target_w: u32, target_h: u32) -> Result<RgbaImage, PipelineError> {
    let src_width = NonZeroU32::new(src.width())
        .ok_or_else(|| PipelineError::Resize("source width is 0".to_string()))?;
    let src_height = NonZeroU32::new(src.height())
        .ok_or_else(|| PipelineError::Resize("source height is 0".to_string()))?;
    let dst_width = NonZeroU32::new(target_w)
        .ok_or_else(|| PipelineError::Resize("target width is 0".to_string()))?;
    let dst_height = NonZeroU32::new(target_h)
        .ok_or_else(|| PipelineError::Resize("target height is 0".to_string()))?;

    let src_image = Image::from_vec_u8(src_width, src_height, src.as_raw().clone(), PixelType::U8x4)
        .map_err(|e| PipelineError::Resize(format!("failed to create source image: {:?}", e)))?;

    let mut dst_image = Image::new(dst_width, dst_height, PixelType::U8x4);

    let mut resizer = Resizer::new(ResizeAlg::Convolution(FilterType::Lanczos3));

    resizer
        .resize(&src_image.view(), &mut dst_image.view_mut())
        .map_err(|e| PipelineError::Resize(format!("resize operation failed: {:?}", e)))?;

    RgbaImage::from_raw(target_w, target_h, dst_image.into_vec())
        .ok_or_else(|| PipelineError::Resize("failed to create output image buffer".to_string()))
}
