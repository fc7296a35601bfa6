//! Watermark tile construction.
//!
//! The renderer is built once per run from the configured mode; assets and
//! fonts load at construction. Tiles are rendered per image because their
//! pixel size derives from the already-resized canvas dimensions, keeping
//! the watermark scale consistent across input resolutions.
//!
//! A missing or unreadable watermark asset downgrades the renderer to
//! disabled with a logged warning; files keep processing unwatermarked.

use image::RgbaImage;
use std::path::Path;

use super::text::{parse_hex_color, render_text_tile, resolve_font, Color, ResolvedFont, TextTileSpec};
use crate::config::{WatermarkMode, WatermarkPosition};
use crate::resize::resize_rgba;

/// Minimum font size for text watermarks, in pixels.
const MIN_FONT_PX: f32 = 12.0;

/// How a rendered tile should be placed on the canvas.
pub enum TilePlacement {
    Single(WatermarkPosition),
    Tiled { spacing_ratio: f32 },
}

/// A tile rendered for one specific canvas size.
pub struct WatermarkTile {
    pub image: RgbaImage,
    pub placement: TilePlacement,
}

enum RendererMode {
    Disabled,
    ImageSingle {
        asset: RgbaImage,
        opacity: f32,
        position: WatermarkPosition,
        scale_ratio: f32,
    },
    ImageTiled {
        asset: RgbaImage,
        opacity: f32,
        tile_size_ratio: f32,
        tile_spacing_ratio: f32,
        opacity_reduction: f32,
    },
    TextTiled {
        font: ResolvedFont,
        text: String,
        color: Color,
        opacity: f32,
        font_size_ratio: f32,
        rotation_degrees: f32,
        tile_spacing_ratio: f32,
        opacity_reduction: f32,
        outline_width: u32,
        outline_color: Color,
    },
}

/// Builds watermark tiles for target canvases.
pub struct WatermarkRenderer {
    mode: RendererMode,
}

impl WatermarkRenderer {
    /// Construct a renderer from configuration, loading assets and fonts.
    pub fn from_config(mode: &WatermarkMode) -> Self {
        let mode = match mode {
            WatermarkMode::None => RendererMode::Disabled,
            WatermarkMode::ImageSingle {
                asset,
                opacity,
                position,
                scale_ratio,
            } => match load_asset(asset) {
                Some(asset) => RendererMode::ImageSingle {
                    asset,
                    opacity: *opacity,
                    position: *position,
                    scale_ratio: *scale_ratio,
                },
                None => RendererMode::Disabled,
            },
            WatermarkMode::ImageTiled {
                asset,
                opacity,
                tile_size_ratio,
                tile_spacing_ratio,
                opacity_reduction,
            } => match load_asset(asset) {
                Some(asset) => RendererMode::ImageTiled {
                    asset,
                    opacity: *opacity,
                    tile_size_ratio: *tile_size_ratio,
                    tile_spacing_ratio: *tile_spacing_ratio,
                    opacity_reduction: *opacity_reduction,
                },
                None => RendererMode::Disabled,
            },
            WatermarkMode::TextTiled {
                text,
                color,
                opacity,
                font_size_ratio,
                rotation_degrees,
                tile_spacing_ratio,
                opacity_reduction,
                outline_width,
                outline_color,
                font,
            } => RendererMode::TextTiled {
                font: resolve_font(font.as_deref()),
                text: format!("\u{00A9} {}", text),
                color: parse_color_or_white(color),
                opacity: *opacity,
                font_size_ratio: *font_size_ratio,
                rotation_degrees: *rotation_degrees,
                tile_spacing_ratio: *tile_spacing_ratio,
                opacity_reduction: *opacity_reduction,
                outline_width: *outline_width,
                outline_color: parse_color_or_white(outline_color),
            },
        };

        Self { mode }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self.mode, RendererMode::Disabled)
    }

    /// Render the tile for a canvas of the given dimensions.
    ///
    /// Returns `None` when watermarking is disabled or the tile would be
    /// degenerate.
    pub fn render_tile(&self, canvas_w: u32, canvas_h: u32) -> Option<WatermarkTile> {
        if canvas_w == 0 || canvas_h == 0 {
            return None;
        }

        match &self.mode {
            RendererMode::Disabled => None,
            RendererMode::ImageSingle {
                asset,
                opacity,
                position,
                scale_ratio,
            } => {
                let mut image = scale_asset(asset, canvas_w, *scale_ratio)?;
                scale_alpha(&mut image, *opacity);
                Some(WatermarkTile {
                    image,
                    placement: TilePlacement::Single(*position),
                })
            }
            RendererMode::ImageTiled {
                asset,
                opacity,
                tile_size_ratio,
                tile_spacing_ratio,
                opacity_reduction,
            } => {
                let mut image = scale_asset(asset, canvas_w, *tile_size_ratio)?;
                // Densely repeated marks are rendered fainter
                scale_alpha(&mut image, opacity * opacity_reduction);
                Some(WatermarkTile {
                    image,
                    placement: TilePlacement::Tiled {
                        spacing_ratio: *tile_spacing_ratio,
                    },
                })
            }
            RendererMode::TextTiled {
                font,
                text,
                color,
                opacity,
                font_size_ratio,
                rotation_degrees,
                tile_spacing_ratio,
                opacity_reduction,
                outline_width,
                outline_color,
            } => {
                let font_px = (canvas_w as f32 * font_size_ratio).max(MIN_FONT_PX);
                let alpha = (opacity * opacity_reduction * 255.0).round().clamp(0.0, 255.0) as u8;

                let image = render_text_tile(
                    font,
                    &TextTileSpec {
                        text,
                        font_px,
                        color: *color,
                        alpha,
                        rotation_degrees: *rotation_degrees,
                        outline_width: *outline_width,
                        outline_color: *outline_color,
                    },
                );
                Some(WatermarkTile {
                    image,
                    placement: TilePlacement::Tiled {
                        spacing_ratio: *tile_spacing_ratio,
                    },
                })
            }
        }
    }
}

/// Load a watermark asset as RGBA. A failure logs and returns `None`,
/// which disables watermarking for the run.
fn load_asset(path: &Path) -> Option<RgbaImage> {
    match image::open(path) {
        Ok(img) => {
            tracing::info!(path = %path.display(), "Loaded watermark asset");
            Some(img.to_rgba8())
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Watermark asset unusable, continuing without watermark"
            );
            None
        }
    }
}

/// Config colors are validated up front; an unparsable one here still
/// degrades to white instead of failing the run.
fn parse_color_or_white(hex: &str) -> Color {
    parse_hex_color(hex).unwrap_or_else(|e| {
        tracing::warn!(color = hex, error = %e, "Unparsable watermark color, using white");
        Color::white()
    })
}

/// Scale the asset so its width is `canvas_w * ratio`, preserving the
/// asset's own aspect ratio.
fn scale_asset(asset: &RgbaImage, canvas_w: u32, ratio: f32) -> Option<RgbaImage> {
    let tile_w = ((canvas_w as f32 * ratio) as u32).max(1);
    let tile_h = ((tile_w as u64 * asset.height() as u64) / asset.width() as u64).max(1) as u32;

    match resize_rgba(asset, tile_w, tile_h) {
        Ok(scaled) => Some(scaled),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to scale watermark tile");
            None
        }
    }
}

/// Scale the alpha plane of every pixel by `factor`, vectorized over the
/// raw buffer.
pub fn scale_alpha(tile: &mut RgbaImage, factor: f32) {
    let factor = factor.clamp(0.0, 1.0);
    for px in tile.chunks_exact_mut(4) {
        px[3] = (px[3] as f32 * factor) as u8;
    }
}
