//! Last-used settings, persisted as JSON between runs.
//!
//! This belongs to the application layer: the command-line front end loads
//! it to fill in defaults and saves it after a batch. The engine itself only
//! ever sees a complete [`JobDescription`](crate::JobDescription).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::engine::Placement;
use crate::geometry::SizePercent;
use crate::opacity::OpacityPercent;
use crate::text::{TextLayout, TextStyle};

/// Kind of watermark last used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatermarkKind {
    /// An image file.
    #[default]
    Image,
    /// Generated text.
    Text,
}

/// Persisted front-end settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Last input folder.
    pub input_dir: Option<PathBuf>,
    /// Last output folder.
    pub output_dir: Option<PathBuf>,
    /// Image or text.
    pub watermark_kind: WatermarkKind,
    /// Last watermark image.
    pub watermark_image: Option<PathBuf>,
    /// Last plain watermark text.
    pub text: String,
    /// Last sender name.
    pub sender: String,
    /// Last receiver name.
    pub receiver: String,
    /// Font family or file.
    pub font: String,
    /// Font size in pixels.
    pub font_size: f32,
    /// Text colour.
    pub color: [u8; 3],
    /// Text style.
    pub style: TextStyle,
    /// Text layout.
    pub layout: TextLayout,
    /// Watermark size.
    pub size: SizePercent,
    /// Watermark opacity.
    pub opacity: OpacityPercent,
    /// Tiled or single watermark.
    pub placement: Placement,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            input_dir: None,
            output_dir: None,
            watermark_kind: WatermarkKind::Image,
            watermark_image: None,
            text: String::new(),
            sender: String::new(),
            receiver: String::new(),
            font: "Arial".to_string(),
            font_size: 24.0,
            color: [0, 0, 0],
            style: TextStyle::Filled,
            layout: TextLayout::SingleLine,
            size: SizePercent::default(),
            opacity: OpacityPercent::default(),
            placement: Placement::Tiled,
        }
    }
}

impl Settings {
    /// Load settings from `path`, or defaults if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) if the file cannot be read and
    /// [`Error::Settings`](crate::Error::Settings) if it is not valid JSON.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no saved settings, using defaults");
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Write settings to `path`, creating parent folders as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        debug!(path = %path.display(), "saved settings");
        Ok(())
    }
}
