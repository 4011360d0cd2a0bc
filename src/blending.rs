//! Alpha blending of a repeated watermark tile.
//!
//! The watermark is applied with forward alpha blending:
//! `out = src * (1 - alpha) + watermark * alpha`
//!
//! [`composite_tiled`] lays the tile out in a regular grid from the top-left
//! corner with a stride equal to its own size. Canvas pixel `(x, y)` is
//! blended with tile pixel `(x % tile_w, y % tile_h)`, so every pixel is
//! covered by exactly one (possibly cropped) tile instance.
//! [`composite_at`] places a single instance at a given offset instead.

use image::{DynamicImage, Rgba, RgbaImage};

use crate::error::{Error, Result};

/// A channel sample type that can be blended in normalized float space.
trait Sample: Copy + Send + Sync {
    /// Value representing full intensity.
    const FULL: f32;

    fn to_f32(self) -> f32;

    fn from_f32(value: f32) -> Self;
}

impl Sample for u8 {
    const FULL: f32 = 255.0;

    fn to_f32(self) -> f32 {
        f32::from(self)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn from_f32(value: f32) -> Self {
        value.round().clamp(0.0, Self::FULL) as u8
    }
}

impl Sample for u16 {
    const FULL: f32 = 65535.0;

    fn to_f32(self) -> f32 {
        f32::from(self)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn from_f32(value: f32) -> Self {
        value.round().clamp(0.0, Self::FULL) as u16
    }
}

impl Sample for f32 {
    const FULL: f32 = 1.0;

    fn to_f32(self) -> f32 {
        self
    }

    fn from_f32(value: f32) -> Self {
        value.clamp(0.0, Self::FULL)
    }
}

/// Blend a single channel value: `src * (1 - alpha) + wm * alpha`.
#[must_use]
pub fn blend_channel(src: f32, wm: f32, alpha: f32) -> f32 {
    src * (1.0 - alpha) + wm * alpha
}

/// Rec. 601 luma of an RGBA pixel's colour, in `[0, 255]`.
///
/// Blending this onto a grayscale pixel gives the same result as promoting
/// the pixel to RGB, blending there, and converting back.
#[must_use]
pub fn luma(px: &Rgba<u8>) -> f32 {
    0.299 * f32::from(px[0]) + 0.587 * f32::from(px[1]) + 0.114 * f32::from(px[2])
}

/// How tile pixels map onto the canvas.
#[derive(Debug, Clone, Copy)]
struct Layout {
    origin: (u32, u32),
    repeat: bool,
}

impl Layout {
    /// Tile coordinate covering canvas coordinate `pos` along one axis.
    #[allow(clippy::cast_possible_truncation)]
    fn axis(self, pos: usize, origin: u32, len: u32) -> Option<u32> {
        let pos = pos as u32;
        if self.repeat {
            Some(pos % len)
        } else {
            pos.checked_sub(origin).filter(|&p| p < len)
        }
    }
}

/// Composite `tile` repeatedly across the whole of `image`, in place.
///
/// The image keeps its channel mode and sample type. Alpha channels in the
/// source are left untouched; only colour channels are blended.
///
/// # Errors
///
/// Returns [`Error::InvalidGeometry`] for an empty tile and
/// [`Error::UnsupportedFormat`] for pixel layouts without a blending path.
pub fn composite_tiled(image: &mut DynamicImage, tile: &RgbaImage) -> Result<()> {
    composite(
        image,
        tile,
        Layout {
            origin: (0, 0),
            repeat: true,
        },
    )
}

/// Composite a single instance of `tile` with its top-left corner at
/// `(x, y)`. Parts falling outside the canvas are cropped.
///
/// # Errors
///
/// Same as [`composite_tiled`].
pub fn composite_at(image: &mut DynamicImage, tile: &RgbaImage, x: u32, y: u32) -> Result<()> {
    composite(
        image,
        tile,
        Layout {
            origin: (x, y),
            repeat: false,
        },
    )
}

fn composite(image: &mut DynamicImage, tile: &RgbaImage, layout: Layout) -> Result<()> {
    if tile.width() == 0 || tile.height() == 0 {
        return Err(Error::InvalidGeometry(format!(
            "watermark tile is {}x{}",
            tile.width(),
            tile.height()
        )));
    }

    let width = image.width();
    match image {
        DynamicImage::ImageLuma8(buf) => blend_rows(buf, width, 1, 1, tile, layout),
        DynamicImage::ImageLumaA8(buf) => blend_rows(buf, width, 2, 1, tile, layout),
        DynamicImage::ImageRgb8(buf) => blend_rows(buf, width, 3, 3, tile, layout),
        DynamicImage::ImageRgba8(buf) => blend_rows(buf, width, 4, 3, tile, layout),
        DynamicImage::ImageLuma16(buf) => blend_rows(buf, width, 1, 1, tile, layout),
        DynamicImage::ImageLumaA16(buf) => blend_rows(buf, width, 2, 1, tile, layout),
        DynamicImage::ImageRgb16(buf) => blend_rows(buf, width, 3, 3, tile, layout),
        DynamicImage::ImageRgba16(buf) => blend_rows(buf, width, 4, 3, tile, layout),
        DynamicImage::ImageRgb32F(buf) => blend_rows(buf, width, 3, 3, tile, layout),
        DynamicImage::ImageRgba32F(buf) => blend_rows(buf, width, 4, 3, tile, layout),
        other => return Err(Error::UnsupportedFormat(format!("{:?}", other.color()))),
    }

    Ok(())
}

/// Blend the tile over a raw interleaved sample buffer.
///
/// `channels` is the total samples per pixel and `color_channels` how many of
/// them (from the front) carry colour; the rest are left alone.
fn blend_rows<S: Sample>(
    data: &mut [S],
    width: u32,
    channels: usize,
    color_channels: usize,
    tile: &RgbaImage,
    layout: Layout,
) {
    let row_len = width as usize * channels;
    if row_len == 0 {
        return;
    }

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        data.par_chunks_mut(row_len)
            .enumerate()
            .for_each(|(y, row)| blend_row(row, y, channels, color_channels, tile, layout));
    }

    #[cfg(not(feature = "parallel"))]
    {
        data.chunks_mut(row_len)
            .enumerate()
            .for_each(|(y, row)| blend_row(row, y, channels, color_channels, tile, layout));
    }
}

fn blend_row<S: Sample>(
    row: &mut [S],
    y: usize,
    channels: usize,
    color_channels: usize,
    tile: &RgbaImage,
    layout: Layout,
) {
    let Some(tile_y) = layout.axis(y, layout.origin.1, tile.height()) else {
        return;
    };

    for (x, px) in row.chunks_exact_mut(channels).enumerate() {
        let Some(tile_x) = layout.axis(x, layout.origin.0, tile.width()) else {
            continue;
        };
        let wm = tile.get_pixel(tile_x, tile_y);
        if wm[3] == 0 {
            continue;
        }
        let alpha = f32::from(wm[3]) / 255.0;

        if color_channels == 1 {
            let value = luma(wm) / 255.0 * S::FULL;
            px[0] = S::from_f32(blend_channel(px[0].to_f32(), value, alpha));
        } else {
            for ch in 0..color_channels {
                let value = f32::from(wm[ch]) / 255.0 * S::FULL;
                px[ch] = S::from_f32(blend_channel(px[ch].to_f32(), value, alpha));
            }
        }
    }
}
