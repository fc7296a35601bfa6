//! Watermark rendering and compositing.
//!
//! This module builds a reusable tile bitmap from configuration — either a
//! scaled translucent image or a rotated rendered text block — and blends
//! it into a target canvas, repeated across a brick-pattern grid or placed
//! once at a fixed anchor.
//!
//! Tiles are rendered against the *already-resized* canvas so pattern
//! scale stays consistent across input resolutions; the pipeline resizes
//! before watermarking.

pub mod compositor;
pub mod position;
pub mod renderer;
pub mod text;

pub use compositor::{alpha_composite_over, composite_single, composite_tiled, paste_with_mask};
pub use position::{anchor_origin, tile_origins, tile_step, EDGE_MARGIN};
pub use renderer::{scale_alpha, TilePlacement, WatermarkRenderer, WatermarkTile};
pub use text::{parse_hex_color, render_text_tile, resolve_font, Color, ResolvedFont, TextTileSpec};

use image::DynamicImage;

/// Apply the configured watermark to a canvas.
///
/// Returns the canvas unchanged (as RGBA) when watermarking is disabled.
pub fn apply_watermark(canvas: DynamicImage, renderer: &WatermarkRenderer) -> DynamicImage {
    let tile = match renderer.render_tile(canvas.width(), canvas.height()) {
        Some(tile) => tile,
        None => return canvas,
    };

    let composited = match tile.placement {
        TilePlacement::Single(pos) => composite_single(&canvas, &tile.image, pos),
        TilePlacement::Tiled { spacing_ratio } => {
            composite_tiled(&canvas, &tile.image, spacing_ratio)
        }
    };

    DynamicImage::ImageRgba8(composited)
}
