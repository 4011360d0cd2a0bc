//! Error types for the batch-watermark crate.

use std::path::PathBuf;

use serde::Serialize;

/// Errors that can occur while preparing a watermark or processing images.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Source or watermark dimensions cannot produce a usable tile.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// The watermark image could not be read or decoded.
    #[error("failed to load watermark image {}: {source}", path.display())]
    WatermarkLoad {
        /// Path of the watermark image.
        path: PathBuf,
        /// Underlying decode error.
        source: image::ImageError,
    },

    /// The requested font could not be resolved or parsed.
    #[error("failed to load font '{0}'")]
    FontLoad(String),

    /// The text watermark has nothing to draw.
    #[error("watermark text is empty")]
    EmptyText,

    /// A source image could not be read or decoded.
    #[error("failed to decode {}: {source}", path.display())]
    ImageDecode {
        /// Path of the source image.
        path: PathBuf,
        /// Underlying decode error.
        source: image::ImageError,
    },

    /// A watermarked image could not be encoded or written.
    #[error("failed to write {}: {source}", path.display())]
    ImageWrite {
        /// Path of the output image.
        path: PathBuf,
        /// Underlying encode or I/O error.
        source: image::ImageError,
    },

    /// The input folder could not be listed or the output folder created.
    #[error("directory {}: {source}", path.display())]
    Directory {
        /// The offending directory.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The image's pixel layout has no compositing path.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted settings could not be parsed or serialized.
    #[error("settings error: {0}")]
    Settings(#[from] serde_json::Error),
}

impl Error {
    /// Coarse classification used when recording per-file outcomes.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidGeometry(_) => ErrorKind::InvalidGeometry,
            Self::WatermarkLoad { .. } => ErrorKind::WatermarkLoad,
            Self::FontLoad(_) | Self::EmptyText => ErrorKind::FontLoad,
            Self::ImageDecode { .. } | Self::UnsupportedFormat(_) => ErrorKind::ImageDecode,
            Self::ImageWrite { .. } => ErrorKind::ImageWrite,
            Self::Directory { .. } | Self::Io(_) | Self::Settings(_) => ErrorKind::Other,
        }
    }
}

/// Classification of an [`Error`], recorded in per-file results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Degenerate source or tile dimensions.
    InvalidGeometry,
    /// Watermark image unreadable.
    WatermarkLoad,
    /// Font unresolvable or text unusable.
    FontLoad,
    /// Source image unreadable.
    ImageDecode,
    /// Output image unwritable.
    ImageWrite,
    /// Anything else.
    Other,
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
