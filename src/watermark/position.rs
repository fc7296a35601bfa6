//! Placement math for watermark tiles.
//!
//! Two placement policies exist:
//! - **Anchored**: one tile at a fixed position with a 20 px edge margin
//! - **Tiled**: a brick-pattern grid that is guaranteed to cover the whole
//!   canvas for any step at or below the tile size
//!
//! Grid origins may be negative; the compositor clips pastes to the canvas.

use crate::config::WatermarkPosition;

/// Fixed margin between an anchored tile and the canvas edges.
pub const EDGE_MARGIN: i64 = 20;

/// Compute the top-left origin for a single anchored tile.
pub fn anchor_origin(
    canvas_w: u32,
    canvas_h: u32,
    tile_w: u32,
    tile_h: u32,
    position: WatermarkPosition,
) -> (i64, i64) {
    let cw = canvas_w as i64;
    let ch = canvas_h as i64;
    let tw = tile_w as i64;
    let th = tile_h as i64;

    match position {
        WatermarkPosition::Center => ((cw - tw) / 2, (ch - th) / 2),
        WatermarkPosition::TopLeft => (EDGE_MARGIN, EDGE_MARGIN),
        WatermarkPosition::TopRight => (cw - tw - EDGE_MARGIN, EDGE_MARGIN),
        WatermarkPosition::BottomLeft => (EDGE_MARGIN, ch - th - EDGE_MARGIN),
        WatermarkPosition::BottomRight => (cw - tw - EDGE_MARGIN, ch - th - EDGE_MARGIN),
    }
}

/// Step between tile origins: tile dimension plus the configured fraction
/// of it. Negative ratios shrink the step below the tile size (overlap);
/// positive ratios open gaps. Clamped to at least 1 px so the grid always
/// advances.
pub fn tile_step(tile_dim: u32, spacing_ratio: f32) -> i64 {
    let step = (tile_dim as f32 * (1.0 + spacing_ratio)).floor();
    (step as i64).max(1)
}

/// Compute the origin grid for tiled placement.
///
/// The grid starts one tile above and to the left of the canvas and runs
/// until it exceeds the canvas by one tile on each axis, so edges are
/// covered for every canvas size. Every second row is shifted right by a
/// half step, producing the brick pattern.
pub fn tile_origins(
    canvas_w: u32,
    canvas_h: u32,
    tile_w: u32,
    tile_h: u32,
    spacing_ratio: f32,
) -> Vec<(i64, i64)> {
    let step_x = tile_step(tile_w, spacing_ratio);
    let step_y = tile_step(tile_h, spacing_ratio);

    let x_end = canvas_w as i64 + tile_w as i64;
    let y_end = canvas_h as i64 + tile_h as i64;

    let mut origins = Vec::new();
    let mut y = -(tile_h as i64);
    let mut row = 0usize;

    while y < y_end {
        let offset = if row % 2 == 1 { step_x / 2 } else { 0 };
        let mut x = -(tile_w as i64) + offset;
        while x < x_end {
            origins.push((x, y));
            x += step_x;
        }
        y += step_y;
        row += 1;
    }

    origins
}
