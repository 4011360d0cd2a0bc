//! Bounded watermark transparency.

use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// Lowest alpha scale ever applied, so a watermark is never invisible.
pub const MIN_ALPHA_SCALE: f32 = 0.20;

/// Requested watermark opacity in percent.
///
/// Any value is accepted; [`OpacityPercent::scale`] clamps it into the
/// visible range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpacityPercent(pub u8);

impl OpacityPercent {
    /// Effective alpha multiplier in `[0.20, 1.00]`.
    #[must_use]
    pub fn scale(self) -> f32 {
        (f32::from(self.0.min(100)) / 100.0).max(MIN_ALPHA_SCALE)
    }
}

impl Default for OpacityPercent {
    fn default() -> Self {
        Self(50)
    }
}

/// Return a copy of `tile` with every alpha value multiplied by the
/// effective opacity scale.
#[must_use]
pub fn apply_opacity(tile: &RgbaImage, opacity: OpacityPercent) -> RgbaImage {
    let scale = opacity.scale();
    let mut out = tile.clone();
    for px in out.pixels_mut() {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        {
            px[3] = (f32::from(px[3]) * scale).round() as u8;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn low_requests_clamp_to_minimum() {
        for requested in 0..=20 {
            assert!((OpacityPercent(requested).scale() - 0.20).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn full_and_excess_requests_are_opaque() {
        assert!((OpacityPercent(100).scale() - 1.0).abs() < f32::EPSILON);
        assert!((OpacityPercent(255).scale() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn mid_range_passes_through() {
        assert!((OpacityPercent(50).scale() - 0.5).abs() < f32::EPSILON);
        assert!((OpacityPercent(73).scale() - 0.73).abs() < 1e-6);
    }

    #[test]
    fn apply_scales_alpha_only_and_leaves_input_untouched() {
        let tile = RgbaImage::from_pixel(4, 3, Rgba([10, 20, 30, 200]));
        let out = apply_opacity(&tile, OpacityPercent(50));

        assert_eq!(tile.get_pixel(0, 0), &Rgba([10, 20, 30, 200]));
        for px in out.pixels() {
            assert_eq!(px, &Rgba([10, 20, 30, 100]));
        }
    }

    #[test]
    fn apply_never_drops_below_twenty_percent() {
        let tile = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255]));
        let out = apply_opacity(&tile, OpacityPercent(0));
        assert_eq!(out.get_pixel(1, 1)[3], 51);
    }
}
