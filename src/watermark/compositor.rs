//! Tiling compositor for blending watermark tiles onto a canvas.
//!
//! Compositing is a two-step process: the tile is pasted (using its own
//! alpha as the paste mask) onto a full-size transparent overlay, and the
//! overlay is then alpha-composited over the canvas exactly once. Pasting
//! sequentially over the base image instead would double-blend the regions
//! where tiles overlap.

use image::{DynamicImage, RgbaImage};

use super::position::{anchor_origin, tile_origins};
use crate::config::WatermarkPosition;

/// Paste a tile onto the overlay at `(x, y)`, clipped to the overlay
/// bounds, using the tile's alpha channel as the mask.
///
/// Every channel (alpha included) is interpolated toward the tile by the
/// mask weight, so a later overlapping paste replaces rather than
/// accumulates.
pub fn paste_with_mask(overlay: &mut RgbaImage, tile: &RgbaImage, x: i64, y: i64) {
    let overlay_w = overlay.width() as i64;
    let overlay_h = overlay.height() as i64;
    let tile_w = tile.width() as i64;
    let tile_h = tile.height() as i64;

    let x_start = x.max(0);
    let y_start = y.max(0);
    let x_end = (x + tile_w).min(overlay_w);
    let y_end = (y + tile_h).min(overlay_h);

    for oy in y_start..y_end {
        for ox in x_start..x_end {
            let src = tile.get_pixel((ox - x) as u32, (oy - y) as u32);
            let mask = src[3] as u32;
            if mask == 0 {
                continue;
            }

            let dst = overlay.get_pixel_mut(ox as u32, oy as u32);
            for channel in 0..4 {
                let d = dst[channel] as u32;
                let s = src[channel] as u32;
                dst[channel] = ((d * (255 - mask) + s * mask + 127) / 255) as u8;
            }
        }
    }
}

/// Straight-alpha Porter-Duff "over" of the overlay onto the base image.
///
/// Fully transparent overlay pixels leave the base pixel byte-identical,
/// so compositing a zero-opacity tile is the identity.
pub fn alpha_composite_over(base: &RgbaImage, overlay: &RgbaImage) -> RgbaImage {
    debug_assert_eq!(base.dimensions(), overlay.dimensions());

    let mut result = base.clone();

    for (dst, src) in result
        .chunks_exact_mut(4)
        .zip(overlay.chunks_exact(4))
    {
        let top_a = src[3];
        if top_a == 0 {
            continue;
        }
        if top_a == 255 {
            dst.copy_from_slice(src);
            continue;
        }

        let top_alpha = top_a as f32 / 255.0;
        let bottom_alpha = dst[3] as f32 / 255.0;
        let out_alpha = top_alpha + bottom_alpha * (1.0 - top_alpha);

        if out_alpha < 0.001 {
            dst.copy_from_slice(&[0, 0, 0, 0]);
            continue;
        }

        for channel in 0..3 {
            let t = src[channel] as f32 / 255.0;
            let b = dst[channel] as f32 / 255.0;
            let out = (t * top_alpha + b * bottom_alpha * (1.0 - top_alpha)) / out_alpha;
            dst[channel] = (out * 255.0).clamp(0.0, 255.0) as u8;
        }
        dst[3] = (out_alpha * 255.0) as u8;
    }

    result
}

/// Repeat a tile across the whole canvas and blend it in.
pub fn composite_tiled(canvas: &DynamicImage, tile: &RgbaImage, spacing_ratio: f32) -> RgbaImage {
    let base = canvas.to_rgba8();
    let mut overlay = RgbaImage::new(base.width(), base.height());

    let origins = tile_origins(
        base.width(),
        base.height(),
        tile.width(),
        tile.height(),
        spacing_ratio,
    );

    for &(x, y) in &origins {
        paste_with_mask(&mut overlay, tile, x, y);
    }

    tracing::debug!(tiles = origins.len(), "Applied tiled watermark pattern");
    alpha_composite_over(&base, &overlay)
}

/// Blend a single tile at the configured anchor position.
pub fn composite_single(
    canvas: &DynamicImage,
    tile: &RgbaImage,
    position: WatermarkPosition,
) -> RgbaImage {
    let base = canvas.to_rgba8();
    let mut overlay = RgbaImage::new(base.width(), base.height());

    let (x, y) = anchor_origin(
        base.width(),
        base.height(),
        tile.width(),
        tile.height(),
        position,
    );
    paste_with_mask(&mut overlay, tile, x, y);

    tracing::debug!(x = x, y = y, position = ?position, "Applied single watermark");
    alpha_composite_over(&base, &overlay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid(width: u32, height: u32, color: Rgba<u8>) -> RgbaImage {
        RgbaImage::from_pixel(width, height, color)
    }

    // Test: transparent tile composited onto any image is the identity
    #[test]
    fn test_transparent_tile_is_identity() {
        let canvas = DynamicImage::ImageRgba8(solid(50, 50, Rgba([13, 57, 211, 255])));
        let tile = solid(16, 16, Rgba([255, 0, 0, 0]));

        let result = composite_tiled(&canvas, &tile, 0.0);
        assert_eq!(canvas.to_rgba8().as_raw(), result.as_raw());

        let result = composite_single(&canvas, &tile, WatermarkPosition::Center);
        assert_eq!(canvas.to_rgba8().as_raw(), result.as_raw());
    }

    // Test: opaque tile with no spacing covers every pixel
    #[test]
    fn test_opaque_tiling_covers_canvas() {
        let canvas = DynamicImage::ImageRgba8(solid(73, 41, Rgba([0, 0, 0, 255])));
        let tile = solid(16, 16, Rgba([255, 255, 255, 255]));

        let result = composite_tiled(&canvas, &tile, 0.0);
        for px in result.pixels() {
            assert_eq!(px[0], 255);
        }
    }

    #[test]
    fn test_overlapping_tiles_cover_canvas() {
        let canvas = DynamicImage::ImageRgba8(solid(60, 60, Rgba([0, 0, 0, 255])));
        let tile = solid(20, 20, Rgba([200, 200, 200, 255]));

        // Negative spacing: step below tile size, tiles overlap
        let result = composite_tiled(&canvas, &tile, -0.5);
        for px in result.pixels() {
            assert_eq!(px[0], 200);
        }
    }

    // Test: overlapping semi-transparent tiles do not double-blend. The
    // overlay bounds accumulated alpha by the tile's own alpha, whereas
    // sequential over-compositing of 4 overlapping tiles onto the base
    // would compound well past it.
    #[test]
    fn test_overlap_does_not_double_blend() {
        let canvas = DynamicImage::ImageRgba8(solid(200, 200, Rgba([0, 0, 0, 255])));
        let tile = solid(60, 60, Rgba([255, 255, 255, 128]));

        // Step 30: every pixel sits under up to 4 overlapping tiles
        let result = composite_tiled(&canvas, &tile, -0.5);

        for px in result.pixels() {
            // Bounded by a single full-tile-alpha blend (128/255 of white),
            // visible everywhere thanks to full coverage
            assert!(px[0] >= 60, "under-blended pixel: {}", px[0]);
            assert!(px[0] <= 129, "double-blended pixel: {}", px[0]);
        }
    }

    #[test]
    fn test_paste_clips_at_edges() {
        let mut overlay = RgbaImage::new(50, 50);
        let tile = solid(30, 30, Rgba([255, 0, 0, 255]));

        paste_with_mask(&mut overlay, &tile, -20, -20);
        paste_with_mask(&mut overlay, &tile, 40, 40);

        assert_eq!(overlay.get_pixel(5, 5)[0], 255);
        assert_eq!(overlay.get_pixel(45, 45)[0], 255);
        assert_eq!(overlay.get_pixel(25, 25)[3], 0);
    }

    #[test]
    fn test_single_placement_bottom_right_margin() {
        let canvas = DynamicImage::ImageRgba8(solid(100, 100, Rgba([0, 0, 0, 255])));
        let tile = solid(10, 10, Rgba([0, 255, 0, 255]));

        let result = composite_single(&canvas, &tile, WatermarkPosition::BottomRight);

        // Tile occupies x,y in [70, 80): 100 - 10 - 20 = 70
        assert_eq!(result.get_pixel(75, 75)[1], 255);
        assert_eq!(result.get_pixel(65, 75)[1], 0);
        assert_eq!(result.get_pixel(85, 75)[1], 0);
    }

    #[test]
    fn test_alpha_composite_half_blend() {
        let base = solid(4, 4, Rgba([0, 0, 0, 255]));
        let overlay = solid(4, 4, Rgba([255, 255, 255, 128]));

        let result = alpha_composite_over(&base, &overlay);
        let px = result.get_pixel(1, 1);
        assert!(px[0] > 100 && px[0] < 160);
        assert_eq!(px[3], 255);
    }

    #[test]
    fn test_alpha_composite_opaque_overlay_replaces() {
        let base = solid(4, 4, Rgba([10, 20, 30, 255]));
        let overlay = solid(4, 4, Rgba([200, 100, 50, 255]));

        let result = alpha_composite_over(&base, &overlay);
        assert_eq!(result.get_pixel(0, 0).0, [200, 100, 50, 255]);
    }

    #[test]
    fn test_paste_mask_lerps_all_channels() {
        let mut overlay = RgbaImage::new(2, 2);
        let tile = solid(2, 2, Rgba([255, 255, 255, 128]));

        paste_with_mask(&mut overlay, &tile, 0, 0);
        let px = overlay.get_pixel(0, 0);
        // dst was fully transparent black; 50% mask pulls halfway
        assert!(px[0] > 120 && px[0] < 136);
        assert!(px[3] > 60 && px[3] < 70);
    }
}
