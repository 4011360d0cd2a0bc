//! Core watermarking engine.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::blending;
use crate::error::{Error, Result};
use crate::geometry::SizePercent;
use crate::opacity::OpacityPercent;
use crate::watermark::{self, Watermark, WatermarkSpec};

/// Gap between a single image watermark and the bottom-right corner.
pub const CORNER_PADDING: u32 = 20;

/// Where the watermark goes on each image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// Repeated edge to edge from the top-left corner.
    #[default]
    Tiled,
    /// Drawn once: image watermarks in the bottom-right corner, inset by
    /// [`CORNER_PADDING`], text watermarks centred.
    Single,
}

/// Options controlling how images are watermarked and written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessOptions {
    /// Use a default system font when the requested one cannot be found.
    pub allow_font_fallback: bool,
    /// JPEG encoding quality (1-100).
    pub jpeg_quality: u8,
    /// Tiled or single watermark.
    pub placement: Placement,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            allow_font_fallback: false,
            jpeg_quality: 95,
            placement: Placement::Tiled,
        }
    }
}

/// The watermark engine holding a prepared watermark and its finished tiles.
///
/// Create once per batch with [`WatermarkEngine::new()`] and reuse it for
/// every image. Tiles are cached by dimensions, so images of the same size
/// share one tile.
pub struct WatermarkEngine {
    watermark: Watermark,
    size: SizePercent,
    opacity: OpacityPercent,
    options: ProcessOptions,
    tiles: Mutex<HashMap<(u32, u32), Arc<RgbaImage>>>,
}

impl WatermarkEngine {
    /// Prepare the watermark described by `spec`.
    ///
    /// # Errors
    ///
    /// Returns the preparation error from [`Watermark::prepare`]; these are
    /// fatal for a batch.
    pub fn new(
        spec: &WatermarkSpec,
        size: SizePercent,
        opacity: OpacityPercent,
        options: ProcessOptions,
    ) -> Result<Self> {
        let watermark = Watermark::prepare(spec, options.allow_font_fallback)?;
        Ok(Self::with_watermark(watermark, size, opacity, options))
    }

    /// Build an engine around an already prepared watermark.
    #[must_use]
    pub fn with_watermark(
        watermark: Watermark,
        size: SizePercent,
        opacity: OpacityPercent,
        options: ProcessOptions,
    ) -> Self {
        Self {
            watermark,
            size,
            opacity,
            options,
            tiles: Mutex::new(HashMap::new()),
        }
    }

    /// Finished (scaled, opacity-adjusted) tile for a source of this size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidGeometry`] for a zero-sized source.
    pub fn tile_for(&self, width: u32, height: u32) -> Result<Arc<RgbaImage>> {
        let cached = self
            .tiles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(width, height))
            .cloned();
        if let Some(tile) = cached {
            return Ok(tile);
        }

        let tile = Arc::new(
            self.watermark
                .tile(width, height, self.size, self.opacity)?,
        );
        debug!(
            width,
            height,
            tile_w = tile.width(),
            tile_h = tile.height(),
            "rendered tile"
        );
        self.tiles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((width, height), Arc::clone(&tile));
        Ok(tile)
    }

    /// Apply the watermark to `image` in place, tiled or once depending on
    /// [`ProcessOptions::placement`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidGeometry`] or [`Error::UnsupportedFormat`].
    pub fn apply(&self, image: &mut DynamicImage) -> Result<()> {
        let (width, height) = (image.width(), image.height());
        let tile = self.tile_for(width, height)?;
        match self.options.placement {
            Placement::Tiled => blending::composite_tiled(image, &tile),
            Placement::Single => {
                let (x, y) = if self.watermark.is_text() {
                    (
                        width.saturating_sub(tile.width()) / 2,
                        height.saturating_sub(tile.height()) / 2,
                    )
                } else {
                    (
                        width.saturating_sub(tile.width() + CORNER_PADDING),
                        height.saturating_sub(tile.height() + CORNER_PADDING),
                    )
                };
                blending::composite_at(image, &tile, x, y)
            }
        }
    }

    /// Process a single image file: load, watermark, save.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ImageDecode`] if `input` cannot be decoded and
    /// [`Error::ImageWrite`] if `output` cannot be written.
    pub fn process_file(&self, input: &Path, output: &Path) -> Result<()> {
        let mut img = watermark::open_image(input).map_err(|source| Error::ImageDecode {
            path: input.to_path_buf(),
            source,
        })?;

        self.apply(&mut img)?;

        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| Error::ImageWrite {
                    path: output.to_path_buf(),
                    source: image::ImageError::IoError(e),
                })?;
            }
        }

        save_image(&img, output, self.options.jpeg_quality).map_err(|source| Error::ImageWrite {
            path: output.to_path_buf(),
            source,
        })
    }
}

/// Check if a file has a supported image extension.
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => matches!(
            ext.to_lowercase().as_str(),
            "jpg" | "jpeg" | "png" | "webp" | "bmp" | "gif"
        ),
        None => false,
    }
}

/// Save an image in the format implied by the path's extension.
///
/// The channel layout is kept where the encoder allows it. JPEG drops alpha
/// (grayscale stays grayscale), BMP and WebP are limited to 8-bit samples,
/// GIF frames are RGBA and PNG keeps 16-bit but not float samples.
///
/// # Errors
///
/// Returns an error if the format is unknown or encoding/writing fails.
pub fn save_image(img: &DynamicImage, path: &Path, jpeg_quality: u8) -> image::ImageResult<()> {
    let format = ImageFormat::from_path(path)?;

    match format {
        ImageFormat::Jpeg => {
            let file = std::io::BufWriter::new(std::fs::File::create(path)?);
            let encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(file, jpeg_quality.clamp(1, 100));
            if has_gray_color(img) {
                let gray = img.to_luma8();
                encoder.write_image(&gray, gray.width(), gray.height(), ExtendedColorType::L8)
            } else {
                let rgb = img.to_rgb8();
                encoder.write_image(&rgb, rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
            }
        }
        ImageFormat::Gif => DynamicImage::ImageRgba8(img.to_rgba8()).save_with_format(path, format),
        ImageFormat::Bmp | ImageFormat::WebP => to_eight_bit(img).save_with_format(path, format),
        ImageFormat::Png => match img {
            DynamicImage::ImageRgb32F(_) => {
                DynamicImage::ImageRgb16(img.to_rgb16()).save_with_format(path, format)
            }
            DynamicImage::ImageRgba32F(_) => {
                DynamicImage::ImageRgba16(img.to_rgba16()).save_with_format(path, format)
            }
            _ => img.save_with_format(path, format),
        },
        _ => img.save_with_format(path, format),
    }
}

fn has_gray_color(img: &DynamicImage) -> bool {
    matches!(
        img,
        DynamicImage::ImageLuma8(_)
            | DynamicImage::ImageLumaA8(_)
            | DynamicImage::ImageLuma16(_)
            | DynamicImage::ImageLumaA16(_)
    )
}

/// Reduce 16-bit and float images to 8-bit, keeping the channel layout.
fn to_eight_bit(img: &DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageLuma16(_) => DynamicImage::ImageLuma8(img.to_luma8()),
        DynamicImage::ImageLumaA16(_) => DynamicImage::ImageLumaA8(img.to_luma_alpha8()),
        DynamicImage::ImageRgb16(_) | DynamicImage::ImageRgb32F(_) => {
            DynamicImage::ImageRgb8(img.to_rgb8())
        }
        DynamicImage::ImageRgba16(_) | DynamicImage::ImageRgba32F(_) => {
            DynamicImage::ImageRgba8(img.to_rgba8())
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage, Rgba};

    fn black_engine(opacity: u8) -> WatermarkEngine {
        black_engine_with(opacity, Placement::Tiled)
    }

    fn black_engine_with(opacity: u8, placement: Placement) -> WatermarkEngine {
        let wm = Watermark::from_raster(RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 255])));
        WatermarkEngine::with_watermark(
            wm,
            SizePercent::new(20.0).unwrap(),
            OpacityPercent(opacity),
            ProcessOptions {
                placement,
                ..ProcessOptions::default()
            },
        )
    }

    fn dark_box(img: &DynamicImage) -> Option<(u32, u32, u32, u32)> {
        let rgb = img.to_rgb8();
        let dark: Vec<(u32, u32)> = rgb
            .enumerate_pixels()
            .filter(|(_, _, p)| p[0] < 128)
            .map(|(x, y, _)| (x, y))
            .collect();
        Some((
            dark.iter().map(|d| d.0).min()?,
            dark.iter().map(|d| d.1).min()?,
            dark.iter().map(|d| d.0).max()?,
            dark.iter().map(|d| d.1).max()?,
        ))
    }

    #[test]
    fn is_supported_image_accepts_common_formats() {
        assert!(is_supported_image(Path::new("photo.jpg")));
        assert!(is_supported_image(Path::new("photo.JPEG")));
        assert!(is_supported_image(Path::new("photo.png")));
        assert!(is_supported_image(Path::new("photo.webp")));
        assert!(is_supported_image(Path::new("photo.bmp")));
        assert!(is_supported_image(Path::new("anim.GIF")));
    }

    #[test]
    fn is_supported_image_rejects_unsupported_formats() {
        assert!(!is_supported_image(Path::new("photo.tiff")));
        assert!(!is_supported_image(Path::new("notes.txt")));
        assert!(!is_supported_image(Path::new("photo")));
    }

    #[test]
    fn tiles_are_cached_per_dimensions() {
        let engine = black_engine(100);
        let a = engine.tile_for(200, 100).unwrap();
        let b = engine.tile_for(200, 100).unwrap();
        let c = engine.tile_for(300, 300).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.dimensions(), (20, 20));
        assert_eq!(c.dimensions(), (60, 60));
    }

    #[test]
    fn process_file_keeps_grayscale_png() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("gray.png");
        let output = dir.path().join("out/gray.png");
        GrayImage::from_pixel(30, 20, Luma([255])).save(&input).unwrap();

        black_engine(50).process_file(&input, &output).unwrap();

        let written = image::open(&output).unwrap();
        let gray = written.as_luma8().expect("output stays single channel");
        // 255 * (1 - 128/255)
        assert!(gray.pixels().all(|p| p[0] == 127));
    }

    #[test]
    fn process_file_reports_decode_errors() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("broken.jpg");
        std::fs::write(&input, b"definitely not a jpeg").unwrap();

        let err = black_engine(50)
            .process_file(&input, &dir.path().join("broken_out.jpg"))
            .unwrap_err();
        assert!(matches!(err, Error::ImageDecode { .. }));
    }

    #[test]
    fn process_file_reports_write_errors() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("ok.png");
        RgbImage::from_pixel(10, 10, Rgb([9, 9, 9])).save(&input).unwrap();
        // a regular file where the output directory should be
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();

        let err = black_engine(50)
            .process_file(&input, &blocker.join("ok.png"))
            .unwrap_err();
        assert!(matches!(err, Error::ImageWrite { .. }));
    }

    #[test]
    fn save_jpeg_drops_alpha() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rgba.jpg");
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([10, 200, 30, 77])));
        save_image(&img, &path, 90).unwrap();
        assert!(image::open(&path).unwrap().as_rgb8().is_some());
    }

    #[test]
    fn save_png_keeps_sixteen_bit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deep.png");
        let img = DynamicImage::ImageRgb16(image::ImageBuffer::from_pixel(4, 4, Rgb([1000u16, 2, 3])));
        save_image(&img, &path, 90).unwrap();
        assert!(image::open(&path).unwrap().as_rgb16().is_some());
    }

    #[test]
    fn single_image_watermark_sits_in_bottom_right_corner() {
        let engine = black_engine_with(100, Placement::Single);
        let mut img = DynamicImage::ImageRgb8(RgbImage::from_pixel(200, 100, Rgb([255, 255, 255])));
        engine.apply(&mut img).unwrap();

        // 20x20 tile, 20px from the right and bottom edges
        assert_eq!(dark_box(&img), Some((160, 60, 179, 79)));
    }

    #[test]
    fn single_placement_hugs_corner_on_tiny_images() {
        let engine = black_engine_with(100, Placement::Single);
        let mut img = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, Rgb([255, 255, 255])));
        engine.apply(&mut img).unwrap();
        assert_eq!(dark_box(&img), Some((0, 0, 1, 1)));
    }

    #[test]
    fn single_text_watermark_is_centred() {
        let mut text = crate::TextWatermark::new(crate::TextContent::Plain("MMMM".into()));
        text.font = "DejaVu Sans".into();
        text.font_size = 40.0;
        let spec = WatermarkSpec::Text(text);
        let options = ProcessOptions {
            allow_font_fallback: true,
            placement: Placement::Single,
            ..ProcessOptions::default()
        };
        // Skip on machines without any installed fonts
        let Ok(engine) = WatermarkEngine::new(
            &spec,
            SizePercent::new(50.0).unwrap(),
            OpacityPercent(100),
            options,
        ) else {
            return;
        };

        let mut img = DynamicImage::ImageRgb8(RgbImage::from_pixel(400, 400, Rgb([255, 255, 255])));
        engine.apply(&mut img).unwrap();

        let (x0, y0, x1, y1) = dark_box(&img).unwrap();
        assert!((i64::from(x0 + x1) - 399).abs() <= 12, "{x0}..{x1}");
        assert!(y0 > 100 && y1 < 300, "{y0}..{y1}");
    }

    #[test]
    fn format_is_detected_from_content() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("actually_png.jpg");
        RgbImage::from_pixel(12, 12, Rgb([200, 200, 200]))
            .save_with_format(&input, ImageFormat::Png)
            .unwrap();

        let output = dir.path().join("out.jpg");
        black_engine(50).process_file(&input, &output).unwrap();
        let written = image::open(&output).unwrap();
        assert_eq!((written.width(), written.height()), (12, 12));
    }

    #[test]
    fn options_fill_missing_fields_from_defaults() {
        let options: ProcessOptions = serde_json::from_str(r#"{ "placement": "single" }"#).unwrap();
        assert_eq!(options.placement, Placement::Single);
        assert_eq!(options.jpeg_quality, 95);
    }
}
