//! Processing configuration types.
//!
//! This module defines the immutable per-run configuration consumed by the
//! pipeline:
//! - Output format and per-format quality settings
//! - Adaptive JPEG size ceiling and quality floor
//! - Resize target (long edge) and DPI tag
//! - Watermark mode with mode-specific parameters
//! - Batch execution settings
//!
//! The configuration is a flat YAML document. The pipeline performs no
//! defaulting at run time; every field is populated here, either from the
//! file or from the serde defaults below, and checked by `validate()`
//! before a run begins.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::PipelineError;

// Default values
fn default_jpeg_quality() -> u8 {
    85
}

fn default_png_compression() -> u8 {
    6
}

fn default_webp_quality() -> f32 {
    85.0
}

fn default_quality_floor() -> u8 {
    40
}

fn default_long_edge() -> u32 {
    1920
}

fn default_output_dpi() -> u16 {
    72
}

fn default_true() -> bool {
    true
}

fn default_output_suffix() -> String {
    "_web".to_string()
}

fn default_pdf_dpi() -> u32 {
    200
}

fn default_opacity() -> f32 {
    0.3
}

fn default_scale_ratio() -> f32 {
    0.2
}

fn default_tile_size_ratio() -> f32 {
    0.2
}

fn default_tile_spacing_ratio() -> f32 {
    0.5
}

fn default_opacity_reduction() -> f32 {
    0.7
}

fn default_font_size_ratio() -> f32 {
    0.05
}

fn default_rotation_degrees() -> f32 {
    30.0
}

fn default_text_color() -> String {
    "#FFFFFF".to_string()
}

fn default_outline_color() -> String {
    "#000000".to_string()
}

fn default_position() -> WatermarkPosition {
    WatermarkPosition::BottomRight
}

/// Output image format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
    Png,
    WebP,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::WebP => "webp",
        }
    }

    /// File extension used for output paths.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::WebP => "webp",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            "webp" => Ok(OutputFormat::WebP),
            _ => Err(PipelineError::Config(format!("unknown format: {}", s))),
        }
    }
}

/// Anchor for single-placement watermarks.
///
/// Corner anchors keep a fixed 20 px margin from the relevant edges;
/// `Center` centers both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WatermarkPosition {
    Center,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// Watermark mode, selected once per run.
///
/// Uses a serde tag to distinguish modes in YAML:
/// ```yaml
/// watermark:
///   mode: image-tiled
///   asset: watermarks/logo.png
///   opacity: 0.3
///   tile_size_ratio: 0.2
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum WatermarkMode {
    /// No watermark is applied.
    None,

    /// One scaled copy of the watermark asset at a fixed anchor.
    ImageSingle {
        /// Path to the watermark image (decoded as RGBA at startup).
        asset: PathBuf,

        /// Opacity from 0.0 (transparent) to 1.0 (opaque).
        #[serde(default = "default_opacity")]
        opacity: f32,

        /// Anchor position on the canvas.
        #[serde(default = "default_position")]
        position: WatermarkPosition,

        /// Watermark width as a fraction of the canvas width.
        #[serde(default = "default_scale_ratio")]
        scale_ratio: f32,
    },

    /// The watermark asset repeated in a brick pattern across the canvas.
    ImageTiled {
        asset: PathBuf,

        #[serde(default = "default_opacity")]
        opacity: f32,

        /// Tile width as a fraction of the canvas width.
        #[serde(default = "default_tile_size_ratio")]
        tile_size_ratio: f32,

        /// Gap (positive) or overlap (negative) between tiles as a
        /// fraction of the tile dimension. Must stay above -1.0.
        #[serde(default = "default_tile_spacing_ratio")]
        tile_spacing_ratio: f32,

        /// Extra opacity multiplier for the dense repeated pattern.
        #[serde(default = "default_opacity_reduction")]
        opacity_reduction: f32,
    },

    /// Rotated rendered text repeated across the canvas.
    TextTiled {
        /// Text to render; a copyright glyph is prefixed automatically.
        text: String,

        /// Fill color as "#RGB" or "#RRGGBB".
        #[serde(default = "default_text_color")]
        color: String,

        #[serde(default = "default_opacity")]
        opacity: f32,

        /// Font size as a fraction of the canvas width (floor 12 px).
        #[serde(default = "default_font_size_ratio")]
        font_size_ratio: f32,

        /// Counter-clockwise rotation in degrees.
        #[serde(default = "default_rotation_degrees")]
        rotation_degrees: f32,

        #[serde(default = "default_tile_spacing_ratio")]
        tile_spacing_ratio: f32,

        #[serde(default = "default_opacity_reduction")]
        opacity_reduction: f32,

        /// Outline thickness in pixels; 0 disables the outline pass.
        #[serde(default)]
        outline_width: u32,

        #[serde(default = "default_outline_color")]
        outline_color: String,

        /// Font file override; falls back to system fonts, then to the
        /// built-in glyph set.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        font: Option<PathBuf>,
    },
}

impl Default for WatermarkMode {
    fn default() -> Self {
        Self::None
    }
}

/// Immutable configuration for one processing run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Output format for all files in the batch.
    pub output_format: OutputFormat,

    /// Starting JPEG quality (1-100) for the adaptive search.
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// PNG compression level (0-9).
    #[serde(default = "default_png_compression")]
    pub png_compression: u8,

    /// WebP lossy quality (0.0-100.0).
    #[serde(default = "default_webp_quality")]
    pub webp_quality: f32,

    /// Byte-size ceiling for JPEG output; 0 disables the adaptive search.
    #[serde(default)]
    pub size_ceiling_bytes: u64,

    /// Hard lower bound on JPEG quality, takes precedence over the ceiling.
    #[serde(default = "default_quality_floor")]
    pub quality_floor: u8,

    /// Target pixel length of the longer edge; images are never upscaled.
    #[serde(default = "default_long_edge")]
    pub long_edge: u32,

    /// Density tag stamped into JPEG output (dots per inch).
    #[serde(default = "default_output_dpi")]
    pub output_dpi: u16,

    /// Transform embedded ICC profiles to sRGB.
    #[serde(default = "default_true")]
    pub normalize_color: bool,

    /// Re-attach the original EXIF block to JPEG output.
    #[serde(default)]
    pub keep_exif: bool,

    /// Apply EXIF orientation to pixels at decode time.
    #[serde(default = "default_true")]
    pub auto_orient: bool,

    /// Suffix appended to the output stem: `{stem}{suffix}.{ext}`.
    #[serde(default = "default_output_suffix")]
    pub output_suffix: String,

    /// Rasterization density handed to the PDF collaborator.
    #[serde(default = "default_pdf_dpi")]
    pub pdf_dpi: u32,

    /// Fan the batch out across a worker pool.
    #[serde(default = "default_true")]
    pub parallel: bool,

    /// Worker pool size; defaults to the available CPU cores.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Watermark mode and its parameters.
    #[serde(default)]
    pub watermark: WatermarkMode,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::Jpeg,
            jpeg_quality: default_jpeg_quality(),
            png_compression: default_png_compression(),
            webp_quality: default_webp_quality(),
            size_ceiling_bytes: 0,
            quality_floor: default_quality_floor(),
            long_edge: default_long_edge(),
            output_dpi: default_output_dpi(),
            normalize_color: true,
            keep_exif: false,
            auto_orient: true,
            output_suffix: default_output_suffix(),
            pdf_dpi: default_pdf_dpi(),
            parallel: true,
            workers: None,
            watermark: WatermarkMode::None,
        }
    }
}

/// Check that a color string is "#RGB" or "#RRGGBB" with hex digits only.
fn validate_hex_color(color: &str, field: &str) -> Result<(), String> {
    match color.strip_prefix('#') {
        Some(hex) if (hex.len() == 3 || hex.len() == 6) => {
            if hex.chars().all(|c| c.is_ascii_hexdigit()) {
                Ok(())
            } else {
                Err(format!("{} has non-hex characters: '{}'", field, color))
            }
        }
        Some(_) => Err(format!(
            "{} must be #RGB or #RRGGBB format, got '{}'",
            field, color
        )),
        None => Err(format!(
            "{} must be a hex string starting with '#', got '{}'",
            field, color
        )),
    }
}

fn validate_ratio(value: f32, field: &str) -> Result<(), String> {
    if !value.is_finite() || value <= 0.0 {
        return Err(format!("{} must be a finite positive ratio, got {}", field, value));
    }
    Ok(())
}

fn validate_opacity(value: f32, field: &str) -> Result<(), String> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(format!(
            "{} must be a finite value between 0.0 and 1.0, got {}",
            field, value
        ));
    }
    Ok(())
}

impl WatermarkMode {
    /// Validate mode-specific parameters.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::None => Ok(()),
            Self::ImageSingle {
                asset,
                opacity,
                scale_ratio,
                ..
            } => {
                if asset.as_os_str().is_empty() {
                    return Err("image watermark 'asset' cannot be empty".to_string());
                }
                validate_opacity(*opacity, "watermark opacity")?;
                validate_ratio(*scale_ratio, "scale_ratio")
            }
            Self::ImageTiled {
                asset,
                opacity,
                tile_size_ratio,
                tile_spacing_ratio,
                opacity_reduction,
            } => {
                if asset.as_os_str().is_empty() {
                    return Err("image watermark 'asset' cannot be empty".to_string());
                }
                validate_opacity(*opacity, "watermark opacity")?;
                validate_opacity(*opacity_reduction, "opacity_reduction")?;
                validate_ratio(*tile_size_ratio, "tile_size_ratio")?;
                if !tile_spacing_ratio.is_finite() || *tile_spacing_ratio <= -1.0 {
                    return Err(format!(
                        "tile_spacing_ratio must be greater than -1.0, got {}",
                        tile_spacing_ratio
                    ));
                }
                Ok(())
            }
            Self::TextTiled {
                text,
                color,
                opacity,
                font_size_ratio,
                rotation_degrees,
                tile_spacing_ratio,
                opacity_reduction,
                outline_color,
                ..
            } => {
                if text.is_empty() {
                    return Err("text watermark 'text' cannot be empty".to_string());
                }
                validate_hex_color(color, "text color")?;
                validate_hex_color(outline_color, "outline color")?;
                validate_opacity(*opacity, "watermark opacity")?;
                validate_opacity(*opacity_reduction, "opacity_reduction")?;
                validate_ratio(*font_size_ratio, "font_size_ratio")?;
                if !rotation_degrees.is_finite() {
                    return Err(format!(
                        "rotation_degrees must be finite, got {}",
                        rotation_degrees
                    ));
                }
                if !tile_spacing_ratio.is_finite() || *tile_spacing_ratio <= -1.0 {
                    return Err(format!(
                        "tile_spacing_ratio must be greater than -1.0, got {}",
                        tile_spacing_ratio
                    ));
                }
                Ok(())
            }
        }
    }
}

impl ProcessingConfig {
    /// Validate the full configuration before a run begins.
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(format!(
                "jpeg_quality must be 1-100, got {}",
                self.jpeg_quality
            ));
        }
        if !(1..=100).contains(&self.quality_floor) {
            return Err(format!(
                "quality_floor must be 1-100, got {}",
                self.quality_floor
            ));
        }
        if self.quality_floor > self.jpeg_quality {
            return Err(format!(
                "quality_floor ({}) cannot exceed jpeg_quality ({})",
                self.quality_floor, self.jpeg_quality
            ));
        }
        if self.png_compression > 9 {
            return Err(format!(
                "png_compression must be 0-9, got {}",
                self.png_compression
            ));
        }
        if !self.webp_quality.is_finite() || !(0.0..=100.0).contains(&self.webp_quality) {
            return Err(format!(
                "webp_quality must be 0.0-100.0, got {}",
                self.webp_quality
            ));
        }
        if self.long_edge == 0 {
            return Err("long_edge must be at least 1 pixel".to_string());
        }
        if self.output_dpi == 0 {
            return Err("output_dpi must be positive".to_string());
        }
        if self.pdf_dpi == 0 {
            return Err("pdf_dpi must be positive".to_string());
        }
        if self.workers == Some(0) {
            return Err("workers must be at least 1 when set".to_string());
        }
        self.watermark.validate()
    }

    /// Load configuration from a YAML file.
    pub fn load_from_file(path: &Path) -> Result<Self, PipelineError> {
        let data = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        serde_yaml::from_str(&data)
            .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Save configuration to a YAML file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), PipelineError> {
        let data = serde_yaml::to_string(self)
            .map_err(|e| PipelineError::Config(format!("serialize: {}", e)))?;
        std::fs::write(path, data).map_err(|e| PipelineError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ProcessingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.output_format, OutputFormat::Jpeg);
        assert_eq!(config.jpeg_quality, 85);
        assert_eq!(config.quality_floor, 40);
        assert_eq!(config.long_edge, 1920);
        assert!(matches!(config.watermark, WatermarkMode::None));
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("jpeg".parse::<OutputFormat>().unwrap(), OutputFormat::Jpeg);
        assert_eq!("JPG".parse::<OutputFormat>().unwrap(), OutputFormat::Jpeg);
        assert_eq!("png".parse::<OutputFormat>().unwrap(), OutputFormat::Png);
        assert_eq!("webp".parse::<OutputFormat>().unwrap(), OutputFormat::WebP);
        assert!("bmp".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_output_format_extension() {
        assert_eq!(OutputFormat::Jpeg.extension(), "jpg");
        assert_eq!(OutputFormat::Png.extension(), "png");
        assert_eq!(OutputFormat::WebP.extension(), "webp");
    }

    #[test]
    fn test_watermark_mode_yaml_tag() {
        let yaml = r#"
mode: image-tiled
asset: watermarks/logo.png
opacity: 0.4
tile_size_ratio: 0.25
tile_spacing_ratio: -0.5
"#;
        let mode: WatermarkMode = serde_yaml::from_str(yaml).unwrap();
        match mode {
            WatermarkMode::ImageTiled {
                asset,
                opacity,
                tile_size_ratio,
                tile_spacing_ratio,
                opacity_reduction,
            } => {
                assert_eq!(asset, PathBuf::from("watermarks/logo.png"));
                assert!((opacity - 0.4).abs() < f32::EPSILON);
                assert!((tile_size_ratio - 0.25).abs() < f32::EPSILON);
                assert!((tile_spacing_ratio + 0.5).abs() < f32::EPSILON);
                // Unspecified field picks up its default
                assert!((opacity_reduction - 0.7).abs() < f32::EPSILON);
            }
            other => panic!("unexpected mode: {:?}", other),
        }
    }

    #[test]
    fn test_text_mode_defaults() {
        let yaml = "mode: text-tiled\ntext: ACME Media\n";
        let mode: WatermarkMode = serde_yaml::from_str(yaml).unwrap();
        assert!(mode.validate().is_ok());
        match mode {
            WatermarkMode::TextTiled {
                text,
                color,
                rotation_degrees,
                outline_width,
                font,
                ..
            } => {
                assert_eq!(text, "ACME Media");
                assert_eq!(color, "#FFFFFF");
                assert!((rotation_degrees - 30.0).abs() < f32::EPSILON);
                assert_eq!(outline_width, 0);
                assert!(font.is_none());
            }
            other => panic!("unexpected mode: {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_bad_quality() {
        let mut config = ProcessingConfig::default();
        config.jpeg_quality = 0;
        assert!(config.validate().is_err());

        let mut config = ProcessingConfig::default();
        config.quality_floor = 90;
        config.jpeg_quality = 80;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_watermark() {
        let mut config = ProcessingConfig::default();
        config.watermark = WatermarkMode::TextTiled {
            text: String::new(),
            color: default_text_color(),
            opacity: default_opacity(),
            font_size_ratio: default_font_size_ratio(),
            rotation_degrees: default_rotation_degrees(),
            tile_spacing_ratio: default_tile_spacing_ratio(),
            opacity_reduction: default_opacity_reduction(),
            outline_width: 0,
            outline_color: default_outline_color(),
            font: None,
        };
        assert!(config.validate().is_err());

        config.watermark = WatermarkMode::ImageTiled {
            asset: PathBuf::from("logo.png"),
            opacity: 0.3,
            tile_size_ratio: 0.2,
            tile_spacing_ratio: -1.5,
            opacity_reduction: 0.7,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_color() {
        let mut config = ProcessingConfig::default();
        config.watermark = WatermarkMode::TextTiled {
            text: "ACME".to_string(),
            color: "FFFFFF".to_string(),
            opacity: 0.3,
            font_size_ratio: 0.05,
            rotation_degrees: 30.0,
            tile_spacing_ratio: 0.5,
            opacity_reduction: 0.7,
            outline_width: 0,
            outline_color: default_outline_color(),
            font: None,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        let mut config = ProcessingConfig::default();
        config.output_format = OutputFormat::WebP;
        config.size_ceiling_bytes = 300_000;
        config.watermark = WatermarkMode::ImageSingle {
            asset: PathBuf::from("logo.png"),
            opacity: 0.5,
            position: WatermarkPosition::Center,
            scale_ratio: 0.25,
        };

        config.save_to_file(&path).unwrap();
        let loaded = ProcessingConfig::load_from_file(&path).unwrap();

        assert_eq!(loaded.output_format, OutputFormat::WebP);
        assert_eq!(loaded.size_ceiling_bytes, 300_000);
        match loaded.watermark {
            WatermarkMode::ImageSingle {
                position,
                scale_ratio,
                ..
            } => {
                assert_eq!(position, WatermarkPosition::Center);
                assert!((scale_ratio - 0.25).abs() < f32::EPSILON);
            }
            other => panic!("unexpected mode: {:?}", other),
        }
    }
}
