//! Text watermark rendering.
//!
//! Renders a text run to an RGBA tile with baked-in alpha, an optional
//! outline pass, and counter-clockwise rotation with expand semantics.
//!
//! Font resolution order:
//! 1. The configured font path
//! 2. Well-known system font locations
//! 3. A built-in 5x7 glyph set, so text watermarking never hard-fails
//!
//! # Example
//!
//! ```ignore
//! use sukashi::watermark::text::{render_text_tile, resolve_font, Color, TextTileSpec};
//!
//! let font = resolve_font(None);
//! let tile = render_text_tile(&font, &TextTileSpec {
//!     text: "© ACME",
//!     font_px: 24.0,
//!     color: Color::white(),
//!     alpha: 128,
//!     rotation_degrees: 30.0,
//!     outline_width: 0,
//!     outline_color: Color::black(),
//! });
//! ```

use ab_glyph::{Font, FontVec, PxScale, ScaleFont};
use image::{Rgba, RgbaImage};
use std::path::Path;

use crate::error::PipelineError;

/// Font files tried when no font path is configured.
const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/truetype/liberation2/LiberationSans-Regular.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/noto/NotoSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// RGB color for text rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn white() -> Self {
        Self::new(255, 255, 255)
    }

    pub fn black() -> Self {
        Self::new(0, 0, 0)
    }
}

/// Parse a hex color string into RGB components.
///
/// Supports both #RGB and #RRGGBB formats.
pub fn parse_hex_color(hex: &str) -> Result<Color, PipelineError> {
    let hex = hex
        .strip_prefix('#')
        .ok_or_else(|| PipelineError::Config("color must start with '#'".to_string()))?;

    let digit = |s: &str| {
        u8::from_str_radix(s, 16)
            .map_err(|_| PipelineError::Config(format!("invalid hex digit in '#{}'", hex)))
    };

    match hex.len() {
        3 => {
            // #RGB - each digit doubled: 0xF -> 0xFF
            let r = digit(&hex[0..1])?;
            let g = digit(&hex[1..2])?;
            let b = digit(&hex[2..3])?;
            Ok(Color::new(r * 17, g * 17, b * 17))
        }
        6 => {
            let r = digit(&hex[0..2])?;
            let g = digit(&hex[2..4])?;
            let b = digit(&hex[4..6])?;
            Ok(Color::new(r, g, b))
        }
        _ => Err(PipelineError::Config(format!(
            "color must be #RGB or #RRGGBB format, got {} characters",
            hex.len()
        ))),
    }
}

/// A font resolved at pipeline construction.
pub enum ResolvedFont {
    Vector(FontVec),
    Builtin,
}

/// Resolve a usable font, preferring the configured path, then system
/// fonts, then the built-in glyph set.
pub fn resolve_font(configured: Option<&Path>) -> ResolvedFont {
    if let Some(path) = configured {
        match load_font_file(path) {
            Some(font) => return ResolvedFont::Vector(font),
            None => {
                tracing::warn!(path = %path.display(), "Configured font unusable, trying system fonts");
            }
        }
    }

    for candidate in SYSTEM_FONT_CANDIDATES {
        if let Some(font) = load_font_file(Path::new(candidate)) {
            tracing::debug!(path = candidate, "Resolved system font");
            return ResolvedFont::Vector(font);
        }
    }

    tracing::warn!("No font resolvable, falling back to built-in glyph set");
    ResolvedFont::Builtin
}

fn load_font_file(path: &Path) -> Option<FontVec> {
    let data = std::fs::read(path).ok()?;
    FontVec::try_from_vec(data).ok()
}

impl ResolvedFont {
    /// Calculate the dimensions of a rendered text run, with a small pad.
    pub fn measure(&self, text: &str, font_px: f32) -> (u32, u32) {
        match self {
            Self::Vector(font) => measure_vector(font, text, font_px),
            Self::Builtin => measure_builtin(text, font_px),
        }
    }

    /// Draw a text run onto an existing image at the given top-left origin,
    /// alpha-blending glyph coverage over what is already there.
    pub fn draw(
        &self,
        image: &mut RgbaImage,
        text: &str,
        font_px: f32,
        origin: (i32, i32),
        color: Color,
        alpha: u8,
    ) {
        match self {
            Self::Vector(font) => draw_vector(font, image, text, font_px, origin, color, alpha),
            Self::Builtin => draw_builtin(image, text, font_px, origin, color, alpha),
        }
    }
}

/// Everything needed to render one text tile.
pub struct TextTileSpec<'a> {
    pub text: &'a str,
    pub font_px: f32,
    pub color: Color,
    /// Alpha baked into the fill and outline pixels (0-255).
    pub alpha: u8,
    /// Counter-clockwise rotation in degrees.
    pub rotation_degrees: f32,
    /// Outline thickness in pixels; 0 disables the outline pass.
    pub outline_width: u32,
    pub outline_color: Color,
}

/// Render a text run into a tight RGBA tile, stamping the outline first,
/// then the fill, then rotating with expand semantics.
pub fn render_text_tile(font: &ResolvedFont, spec: &TextTileSpec<'_>) -> RgbaImage {
    if spec.text.is_empty() {
        return RgbaImage::new(1, 1);
    }

    let (text_w, text_h) = font.measure(spec.text, spec.font_px);
    let margin = spec.outline_width;
    let mut buffer = RgbaImage::new(text_w + 2 * margin, text_h + 2 * margin);

    // Outline: re-draw the run at every integer offset within the outline
    // width, before the fill pass
    if margin > 0 {
        let w = margin as i32;
        for dy in -w..=w {
            for dx in -w..=w {
                if dx == 0 && dy == 0 {
                    continue;
                }
                font.draw(
                    &mut buffer,
                    spec.text,
                    spec.font_px,
                    (w + dx, w + dy),
                    spec.outline_color,
                    spec.alpha,
                );
            }
        }
    }

    font.draw(
        &mut buffer,
        spec.text,
        spec.font_px,
        (margin as i32, margin as i32),
        spec.color,
        spec.alpha,
    );

    if spec.rotation_degrees.abs() > f32::EPSILON {
        rotate_expand(&buffer, spec.rotation_degrees)
    } else {
        buffer
    }
}

fn measure_vector(font: &FontVec, text: &str, font_px: f32) -> (u32, u32) {
    let scale = PxScale::from(font_px);
    let scaled = font.as_scaled(scale);

    let mut width = 0.0f32;
    let mut prev_glyph: Option<ab_glyph::GlyphId> = None;

    for c in text.chars() {
        let glyph_id = scaled.glyph_id(c);
        if let Some(prev) = prev_glyph {
            width += scaled.kern(prev, glyph_id);
        }
        width += scaled.h_advance(glyph_id);
        prev_glyph = Some(glyph_id);
    }

    let height = scaled.height();
    let padding = 2;
    (
        width.ceil() as u32 + padding,
        height.ceil() as u32 + padding,
    )
}

fn draw_vector(
    font: &FontVec,
    image: &mut RgbaImage,
    text: &str,
    font_px: f32,
    origin: (i32, i32),
    color: Color,
    alpha: u8,
) {
    let scale = PxScale::from(font_px);
    let scaled = font.as_scaled(scale);

    let (canvas_w, canvas_h) = (image.width() as i32, image.height() as i32);
    let baseline_y = origin.1 as f32 + scaled.ascent();
    let mut cursor_x = origin.0 as f32;
    let mut prev_glyph: Option<ab_glyph::GlyphId> = None;

    for c in text.chars() {
        let glyph_id = scaled.glyph_id(c);
        if let Some(prev) = prev_glyph {
            cursor_x += scaled.kern(prev, glyph_id);
        }

        let glyph = glyph_id.with_scale_and_position(scale, ab_glyph::point(cursor_x, baseline_y));

        if let Some(outlined) = font.outline_glyph(glyph) {
            let bounds = outlined.px_bounds();

            outlined.draw(|px, py, coverage| {
                let x = px as i32 + bounds.min.x as i32;
                let y = py as i32 + bounds.min.y as i32;

                if x >= 0 && y >= 0 && x < canvas_w && y < canvas_h {
                    let pixel_alpha = (coverage * alpha as f32) as u8;
                    let pixel = Rgba([color.r, color.g, color.b, pixel_alpha]);

                    // Blend with existing pixel (anti-aliasing overlap)
                    let existing = image.get_pixel(x as u32, y as u32);
                    let blended = blend_over(*existing, pixel);
                    image.put_pixel(x as u32, y as u32, blended);
                }
            });
        }

        cursor_x += scaled.h_advance(glyph_id);
        prev_glyph = Some(glyph_id);
    }
}

/// Blend two RGBA pixels using the "over" operator.
fn blend_over(bottom: Rgba<u8>, top: Rgba<u8>) -> Rgba<u8> {
    let top_alpha = top[3] as f32 / 255.0;
    let bottom_alpha = bottom[3] as f32 / 255.0;

    let out_alpha = top_alpha + bottom_alpha * (1.0 - top_alpha);
    if out_alpha < 0.001 {
        return Rgba([0, 0, 0, 0]);
    }

    let blend = |t: u8, b: u8| -> u8 {
        let t = t as f32 / 255.0;
        let b = b as f32 / 255.0;
        let result = (t * top_alpha + b * bottom_alpha * (1.0 - top_alpha)) / out_alpha;
        (result * 255.0) as u8
    };

    Rgba([
        blend(top[0], bottom[0]),
        blend(top[1], bottom[1]),
        blend(top[2], bottom[2]),
        (out_alpha * 255.0) as u8,
    ])
}

// --- Built-in 5x7 glyph set ---

const GLYPH_COLS: u32 = 5;
/// Horizontal advance in cells (5 columns + 1 spacing).
const GLYPH_ADVANCE: u32 = 6;
/// Vertical cell size (7 rows + 1 leading).
const GLYPH_LINE: u32 = 8;

/// Row-encoded 5x7 glyph, top row first, bit 4 = leftmost column.
fn builtin_glyph(c: char) -> [u8; 7] {
    match c {
        ' ' => [0x00; 7],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1C, 0x12, 0x11, 0x11, 0x11, 0x12, 0x1C],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x19, 0x15, 0x13, 0x11, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x0A, 0x04, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        ',' => [0x00, 0x00, 0x00, 0x00, 0x0C, 0x04, 0x08],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '_' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1F],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '/' => [0x01, 0x01, 0x02, 0x04, 0x08, 0x10, 0x10],
        '(' => [0x02, 0x04, 0x08, 0x08, 0x08, 0x04, 0x02],
        ')' => [0x08, 0x04, 0x02, 0x02, 0x02, 0x04, 0x08],
        '+' => [0x00, 0x04, 0x04, 0x1F, 0x04, 0x04, 0x00],
        '©' => [0x0E, 0x11, 0x17, 0x14, 0x17, 0x11, 0x0E],
        c if c.is_ascii_lowercase() => builtin_glyph(c.to_ascii_uppercase()),
        // Unknown characters render as a hollow box
        _ => [0x1F, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1F],
    }
}

/// Integer cell scale for the built-in font at a given pixel size.
fn builtin_scale(font_px: f32) -> u32 {
    ((font_px / GLYPH_LINE as f32).round() as u32).max(1)
}

fn measure_builtin(text: &str, font_px: f32) -> (u32, u32) {
    let scale = builtin_scale(font_px);
    let chars = text.chars().count() as u32;
    let padding = 2;
    (
        chars * GLYPH_ADVANCE * scale + padding,
        GLYPH_LINE * scale + padding,
    )
}

fn draw_builtin(
    image: &mut RgbaImage,
    text: &str,
    font_px: f32,
    origin: (i32, i32),
    color: Color,
    alpha: u8,
) {
    let scale = builtin_scale(font_px);
    let (canvas_w, canvas_h) = (image.width() as i32, image.height() as i32);
    let pixel = Rgba([color.r, color.g, color.b, alpha]);

    let mut cell_x = origin.0;
    for c in text.chars() {
        let glyph = builtin_glyph(c);
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..GLYPH_COLS {
                if bits & (1 << (GLYPH_COLS - 1 - col)) == 0 {
                    continue;
                }
                // One font cell expands to a scale x scale block
                for sy in 0..scale as i32 {
                    for sx in 0..scale as i32 {
                        let x = cell_x + (col as i32 * scale as i32) + sx;
                        let y = origin.1 + (row as i32 * scale as i32) + sy;
                        if x >= 0 && y >= 0 && x < canvas_w && y < canvas_h {
                            let existing = image.get_pixel(x as u32, y as u32);
                            let blended = blend_over(*existing, pixel);
                            image.put_pixel(x as u32, y as u32, blended);
                        }
                    }
                }
            }
        }
        cell_x += (GLYPH_ADVANCE * scale) as i32;
    }
}

// --- Rotation ---

/// Catmull-Rom cubic kernel.
fn cubic_weight(t: f32) -> f32 {
    let t = t.abs();
    if t < 1.0 {
        1.5 * t * t * t - 2.5 * t * t + 1.0
    } else if t < 2.0 {
        -0.5 * t * t * t + 2.5 * t * t - 4.0 * t + 2.0
    } else {
        0.0
    }
}

/// Rotate counter-clockwise by `degrees` with bicubic resampling. The
/// output grows to bound the rotated content without clipping; pixels
/// sampled from outside the source are transparent.
pub fn rotate_expand(image: &RgbaImage, degrees: f32) -> RgbaImage {
    let radians = degrees.to_radians();
    let (cos, sin) = (radians.cos(), radians.sin());

    let src_w = image.width() as f32;
    let src_h = image.height() as f32;
    let cx = src_w / 2.0;
    let cy = src_h / 2.0;

    // Forward map (visual counter-clockwise, y-down coordinates)
    let forward = |x: f32, y: f32| (x * cos + y * sin, -x * sin + y * cos);

    let corners = [
        forward(-cx, -cy),
        forward(src_w - cx, -cy),
        forward(-cx, src_h - cy),
        forward(src_w - cx, src_h - cy),
    ];

    let min_x = corners.iter().map(|&(x, _)| x).fold(f32::INFINITY, f32::min);
    let max_x = corners
        .iter()
        .map(|&(x, _)| x)
        .fold(f32::NEG_INFINITY, f32::max);
    let min_y = corners.iter().map(|&(_, y)| y).fold(f32::INFINITY, f32::min);
    let max_y = corners
        .iter()
        .map(|&(_, y)| y)
        .fold(f32::NEG_INFINITY, f32::max);

    let dst_w = ((max_x - min_x).ceil() as u32).max(1);
    let dst_h = ((max_y - min_y).ceil() as u32).max(1);
    let dst_cx = dst_w as f32 / 2.0;
    let dst_cy = dst_h as f32 / 2.0;

    let sample = |x: i32, y: i32, channel: usize| -> f32 {
        if x < 0 || y < 0 || x >= image.width() as i32 || y >= image.height() as i32 {
            0.0
        } else {
            image.get_pixel(x as u32, y as u32)[channel] as f32
        }
    };

    let mut rotated = RgbaImage::new(dst_w, dst_h);

    for dy in 0..dst_h {
        for dx in 0..dst_w {
            // Inverse map: rotate the destination point back by -degrees
            let rx = dx as f32 - dst_cx;
            let ry = dy as f32 - dst_cy;
            let sx = rx * cos - ry * sin + cx;
            let sy = rx * sin + ry * cos + cy;

            if sx < -2.0 || sy < -2.0 || sx > src_w + 2.0 || sy > src_h + 2.0 {
                continue;
            }

            let x0 = sx.floor() as i32;
            let y0 = sy.floor() as i32;
            let fx = sx - x0 as f32;
            let fy = sy - y0 as f32;

            let mut acc = [0.0f32; 4];
            let mut weight_sum = 0.0f32;

            for ky in -1..=2 {
                let wy = cubic_weight(ky as f32 - fy);
                if wy == 0.0 {
                    continue;
                }
                for kx in -1..=2 {
                    let wx = cubic_weight(kx as f32 - fx);
                    if wx == 0.0 {
                        continue;
                    }
                    let w = wx * wy;
                    weight_sum += w;
                    for (channel, slot) in acc.iter_mut().enumerate() {
                        *slot += w * sample(x0 + kx, y0 + ky, channel);
                    }
                }
            }

            if weight_sum.abs() > f32::EPSILON {
                let px = Rgba([
                    (acc[0] / weight_sum).clamp(0.0, 255.0) as u8,
                    (acc[1] / weight_sum).clamp(0.0, 255.0) as u8,
                    (acc[2] / weight_sum).clamp(0.0, 255.0) as u8,
                    (acc[3] / weight_sum).clamp(0.0, 255.0) as u8,
                ]);
                rotated.put_pixel(dx, dy, px);
            }
        }
    }

    rotated
}
