//! Watermark tile geometry.
//!
//! The tile's longer edge is a percentage of the source image's smaller
//! dimension; the shorter edge follows the watermark's own aspect ratio.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Watermark size as a percentage of the source image's smaller dimension.
///
/// Always within `(0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f32", into = "f32")]
pub struct SizePercent(f32);

impl SizePercent {
    /// Validate a percentage.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidGeometry`] unless `percent` lies in `(0, 100]`.
    pub fn new(percent: f32) -> Result<Self> {
        if percent > 0.0 && percent <= 100.0 {
            Ok(Self(percent))
        } else {
            Err(Error::InvalidGeometry(format!(
                "watermark size {percent}% outside (0, 100]"
            )))
        }
    }

    /// The percentage value.
    #[must_use]
    pub fn get(self) -> f32 {
        self.0
    }
}

impl Default for SizePercent {
    fn default() -> Self {
        Self(15.0)
    }
}

impl TryFrom<f32> for SizePercent {
    type Error = Error;

    fn try_from(value: f32) -> Result<Self> {
        Self::new(value)
    }
}

impl From<SizePercent> for f32 {
    fn from(value: SizePercent) -> Self {
        value.0
    }
}

/// Compute the tile dimensions for a source image.
///
/// `source` is the canvas `(width, height)` and `aspect` the watermark's
/// native `(width, height)`. The longer tile edge is
/// `round(min(width, height) * percent / 100)`; both edges are at least one
/// pixel. Since the percentage is at most 100 and the shorter edge never
/// exceeds the longer one, the tile always fits inside the canvas.
///
/// # Errors
///
/// Returns [`Error::InvalidGeometry`] if any source or watermark dimension is zero.
pub fn tile_dimensions(
    source: (u32, u32),
    size: SizePercent,
    aspect: (u32, u32),
) -> Result<(u32, u32)> {
    let (width, height) = source;
    let (aw, ah) = aspect;
    if width == 0 || height == 0 {
        return Err(Error::InvalidGeometry(format!(
            "source image is {width}x{height}"
        )));
    }
    if aw == 0 || ah == 0 {
        return Err(Error::InvalidGeometry(format!("watermark is {aw}x{ah}")));
    }

    let long_edge = scaled(width.min(height), f64::from(size.get()) / 100.0);
    let (tile_w, tile_h) = if aw >= ah {
        (long_edge, scaled(long_edge, f64::from(ah) / f64::from(aw)))
    } else {
        (scaled(long_edge, f64::from(aw) / f64::from(ah)), long_edge)
    };

    Ok((tile_w, tile_h))
}

/// `round(value * factor)`, clamped to at least 1.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scaled(value: u32, factor: f64) -> u32 {
    let v = (f64::from(value) * factor).round();
    (v as u32).max(1)
}
