//! Color-space normalization from an embedded ICC profile to sRGB.
//!
//! Color accuracy is best-effort: a profile that fails to parse or
//! transform logs a warning and leaves the image untouched. Images with an
//! alpha channel are transformed on the RGB planes only; alpha passes
//! through unmodified.

use image::DynamicImage;
use lcms2::{Intent, PixelFormat, Profile, Transform};
use rgb::RGB8;

use crate::error::PipelineError;

/// Map pixel values from the embedded source profile into sRGB.
///
/// Returns the input unchanged when the profile cannot be used.
pub fn normalize_to_srgb(image: DynamicImage, icc: &[u8]) -> DynamicImage {
    match try_normalize(&image, icc) {
        Ok(normalized) => {
            tracing::debug!("Normalized embedded ICC profile to sRGB");
            normalized
        }
        Err(e) => {
            tracing::warn!(error = %e, "Skipping color normalization");
            image
        }
    }
}

fn try_normalize(image: &DynamicImage, icc: &[u8]) -> Result<DynamicImage, PipelineError> {
    let src_profile =
        Profile::new_icc(icc).map_err(|e| PipelineError::ColorProfile(e.to_string()))?;
    let dst_profile = Profile::new_srgb();

    let transform: Transform<RGB8, RGB8> = Transform::new(
        &src_profile,
        PixelFormat::RGB_8,
        &dst_profile,
        PixelFormat::RGB_8,
        Intent::Perceptual,
    )
    .map_err(|e| PipelineError::ColorProfile(e.to_string()))?;

    if image.color().has_alpha() {
        let mut rgba = image.to_rgba8();
        let mut planes: Vec<RGB8> = rgba
            .chunks_exact(4)
            .map(|px| RGB8::new(px[0], px[1], px[2]))
            .collect();

        transform.transform_in_place(&mut planes);

        for (px, out) in rgba.chunks_exact_mut(4).zip(&planes) {
            px[0] = out.r;
            px[1] = out.g;
            px[2] = out.b;
            // px[3] (alpha) untouched
        }
        Ok(DynamicImage::ImageRgba8(rgba))
    } else {
        let mut rgbim = image.to_rgb8();
        let mut planes: Vec<RGB8> = rgbim
            .chunks_exact(3)
            .map(|px| RGB8::new(px[0], px[1], px[2]))
            .collect();

        transform.transform_in_place(&mut planes);

        for (px, out) in rgbim.chunks_exact_mut(3).zip(&planes) {
            px[0] = out.r;
            px[1] = out.g;
            px[2] = out.b;
        }
        Ok(DynamicImage::ImageRgb8(rgbim))
    }
}
