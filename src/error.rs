//! Error types for the processing pipeline.
//!
//! Each variant maps to one branch of the error taxonomy: asset errors
//! degrade gracefully, decode/encode errors fail a single file, and
//! configuration errors abort before any file is touched.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Unsupported source format: {0}")]
    UnsupportedFormat(String),

    #[error("Watermark asset error: {0}")]
    Asset(String),

    #[error("Color profile error: {0}")]
    ColorProfile(String),

    #[error("Resize failed: {0}")]
    Resize(String),

    #[error("Failed to encode to {format}: {message}")]
    Encode {
        format: &'static str,
        message: String,
    },

    #[error("PDF rasterization failed: {0}")]
    Pdf(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// Shorthand for an I/O error tied to a specific path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Shorthand for an encode failure in a specific output format.
    pub fn encode(format: &'static str, message: impl Into<String>) -> Self {
        Self::Encode {
            format,
            message: message.into(),
        }
    }
}
