//! Watermark sources and tile rendering.
//!
//! A [`Watermark`] is prepared once per batch from a [`WatermarkSpec`]: the
//! image is decoded or the text rasterized at its requested font size. Each
//! source image then gets a tile scaled from it: image rasters are resampled,
//! text is drawn again at the tile's size.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ab_glyph::FontVec;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageReader, RgbaImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::font;
use crate::geometry::{self, SizePercent};
use crate::opacity::{self, OpacityPercent};
use crate::text::{self, TextWatermark};

/// What to stamp onto each image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WatermarkSpec {
    /// A raster image, ideally with its own alpha channel.
    Image {
        /// Path to the watermark image.
        path: PathBuf,
    },
    /// Generated text.
    Text(TextWatermark),
}

/// A watermark rendered at its native size, ready to be scaled per image.
///
/// Image watermarks are resampled to each tile size. Text watermarks keep
/// their font and are drawn again at the tile's size, so glyph edges and
/// outlines stay crisp.
#[derive(Clone)]
pub struct Watermark {
    raster: RgbaImage,
    text: Option<(TextWatermark, Arc<FontVec>)>,
}

impl fmt::Debug for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watermark")
            .field("width", &self.raster.width())
            .field("height", &self.raster.height())
            .field("text", &self.text.as_ref().map(|(text, _)| text))
            .finish()
    }
}

impl Watermark {
    /// Load or rasterize the watermark described by `spec`.
    ///
    /// Text is rendered once at its own font size here, so empty text and
    /// bad font sizes are reported before any image is touched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WatermarkLoad`] for an unreadable image,
    /// [`Error::FontLoad`] or [`Error::EmptyText`] for unusable text and
    /// [`Error::InvalidGeometry`] for an empty raster.
    pub fn prepare(spec: &WatermarkSpec, allow_font_fallback: bool) -> Result<Self> {
        let (raster, text) = match spec {
            WatermarkSpec::Image { path } => {
                let raster = open_image(path)
                    .map_err(|source| Error::WatermarkLoad {
                        path: path.clone(),
                        source,
                    })?
                    .to_rgba8();
                (raster, None)
            }
            WatermarkSpec::Text(text) => {
                let font = font::load_font(&text.font, allow_font_fallback)?;
                let raster = text::render_text(text, &font)?;
                (raster, Some((text.clone(), Arc::new(font))))
            }
        };

        if raster.width() == 0 || raster.height() == 0 {
            return Err(Error::InvalidGeometry(format!(
                "watermark is {}x{}",
                raster.width(),
                raster.height()
            )));
        }
        debug!(
            width = raster.width(),
            height = raster.height(),
            "prepared watermark"
        );
        Ok(Self { raster, text })
    }

    /// Wrap an already rendered RGBA raster.
    #[must_use]
    pub fn from_raster(raster: RgbaImage) -> Self {
        Self { raster, text: None }
    }

    /// The watermark at its native size, before scaling and opacity.
    #[must_use]
    pub fn raster(&self) -> &RgbaImage {
        &self.raster
    }

    /// Whether this watermark is generated text.
    #[must_use]
    pub fn is_text(&self) -> bool {
        self.text.is_some()
    }

    /// Build the finished tile for a `width` x `height` source image.
    ///
    /// The tile size comes from [`geometry::tile_dimensions`]. Images are
    /// resized with Lanczos3; text is drawn again at a proportionally scaled
    /// font size. The alpha is then scaled by `opacity`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidGeometry`] for a zero-sized source.
    pub fn tile(
        &self,
        width: u32,
        height: u32,
        size: SizePercent,
        opacity: OpacityPercent,
    ) -> Result<RgbaImage> {
        let target = geometry::tile_dimensions((width, height), size, self.raster.dimensions())?;

        let scaled = if target == self.raster.dimensions() {
            opacity::apply_opacity(&self.raster, opacity)
        } else if let Some((text, font)) = &self.text {
            let rendered = self.render_text_tile(text, font, target)?;
            opacity::apply_opacity(&rendered, opacity)
        } else {
            let resized = imageops::resize(&self.raster, target.0, target.1, FilterType::Lanczos3);
            opacity::apply_opacity(&resized, opacity)
        };
        Ok(scaled)
    }

    /// Draw `text` so its glyphs fill a `target` sized tile.
    ///
    /// The stroke margin does not scale with the font, so the font size
    /// follows the long edge with the margins taken off. Any rounding left
    /// over is absorbed by centring on a transparent canvas of exactly
    /// `target` size.
    #[allow(clippy::cast_possible_truncation)]
    fn render_text_tile(
        &self,
        text: &TextWatermark,
        font: &FontVec,
        target: (u32, u32),
    ) -> Result<RgbaImage> {
        let (native_w, native_h) = self.raster.dimensions();
        let (native_long, target_long) = if native_w >= native_h {
            (native_w, target.0)
        } else {
            (native_h, target.1)
        };
        let margins = 2 * text.margin();
        let factor = f64::from(target_long.saturating_sub(margins).max(1))
            / f64::from(native_long.saturating_sub(margins).max(1));
        let font_size = (f64::from(text.font_size) * factor) as f32;

        let rendered = text::render_text_at(text, font, font_size)?;
        if rendered.dimensions() == target {
            return Ok(rendered);
        }
        let mut canvas = RgbaImage::new(target.0, target.1);
        let x = (i64::from(target.0) - i64::from(rendered.width())) / 2;
        let y = (i64::from(target.1) - i64::from(rendered.height())) / 2;
        imageops::replace(&mut canvas, &rendered, x, y);
        Ok(canvas)
    }
}

/// Decode an image, detecting its format from the content rather than the
/// file extension.
pub(crate) fn open_image(path: &Path) -> image::ImageResult<DynamicImage> {
    ImageReader::open(path)?.with_guessed_format()?.decode()
}
