//! Text watermark rasterization.
//!
//! Text is first drawn as an 8-bit coverage mask. Styles are then built from
//! that mask: filled text uses the coverage as alpha, the outline ring is the
//! mask dilated by the stroke width in all 8 directions.

use ab_glyph::{Font, FontVec, PxScale, ScaleFont};
use image::{GrayImage, Luma, Rgba, RgbaImage};
use imageproc::distance_transform::Norm;
use imageproc::drawing::{draw_text_mut, text_size};
use imageproc::morphology::dilate;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Distance between line tops, as a multiple of the font's line height.
pub const LINE_SPACING: f32 = 1.2;

/// Separator used when sender and receiver share a single line.
const PAIR_SEPARATOR: &str = " | ";

/// What the text watermark says.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextContent {
    /// A single free-form string.
    Plain(String),
    /// Sender and receiver names, composited into one watermark string.
    SenderReceiver {
        /// Sender name.
        sender: String,
        /// Receiver name.
        receiver: String,
    },
}

impl TextContent {
    /// Build the string to draw for `layout`, or `None` if there is no text.
    ///
    /// Single-line layout flattens line breaks to spaces and joins sender and
    /// receiver with `" | "`; multi-line layout keeps breaks and puts sender
    /// and receiver on their own lines.
    #[must_use]
    pub fn compose(&self, layout: TextLayout) -> Option<String> {
        let lines: Vec<&str> = match self {
            Self::Plain(text) => text.lines().map(str::trim).collect(),
            Self::SenderReceiver { sender, receiver } => [sender.trim(), receiver.trim()]
                .into_iter()
                .filter(|s| !s.is_empty())
                .collect(),
        };
        if lines.iter().all(|l| l.is_empty()) {
            return None;
        }

        let composed = match (self, layout) {
            (_, TextLayout::MultiLine) => lines.join("\n"),
            (Self::SenderReceiver { .. }, TextLayout::SingleLine) => lines.join(PAIR_SEPARATOR),
            (Self::Plain(_), TextLayout::SingleLine) => lines
                .into_iter()
                .filter(|l| !l.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
        };
        Some(composed)
    }
}

/// How glyphs are painted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextStyle {
    /// Solid glyphs in the fill colour.
    #[default]
    Filled,
    /// Solid glyphs with a contrasting border.
    Outlined,
    /// Only the border, drawn in the fill colour.
    Hollow,
}

/// How text is arranged on the tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextLayout {
    /// Everything on one line.
    #[default]
    SingleLine,
    /// Stacked, horizontally centred lines.
    MultiLine,
}

/// A text watermark description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextWatermark {
    /// Text to draw.
    pub content: TextContent,
    /// Font family name or path to a font file.
    pub font: String,
    /// Font size in pixels.
    pub font_size: f32,
    /// Fill colour.
    pub color: [u8; 3],
    /// Paint style.
    pub style: TextStyle,
    /// Line arrangement.
    pub layout: TextLayout,
    /// Wrap multi-line text to this many pixels per line.
    pub wrap_width: Option<u32>,
    /// Outline thickness in pixels for outlined and hollow styles.
    pub stroke_width: u8,
}

impl TextWatermark {
    /// A filled, single-line watermark in 24px black Arial.
    #[must_use]
    pub fn new(content: TextContent) -> Self {
        Self {
            content,
            font: "Arial".to_string(),
            font_size: 24.0,
            color: [0, 0, 0],
            style: TextStyle::Filled,
            layout: TextLayout::SingleLine,
            wrap_width: None,
            stroke_width: 2,
        }
    }

    /// Transparent border around the glyphs, in pixels, on each side.
    #[must_use]
    pub fn margin(&self) -> u32 {
        match self.style {
            TextStyle::Filled => 0,
            TextStyle::Outlined | TextStyle::Hollow => u32::from(self.stroke_width.max(1)),
        }
    }
}

/// Rasterize `text` with `font` onto a transparent canvas sized to the text.
///
/// Outlined and hollow styles get an extra margin of `stroke_width` pixels
/// on every side so the ring is not clipped.
///
/// # Errors
///
/// Returns [`Error::EmptyText`] if there is nothing to draw and
/// [`Error::InvalidGeometry`] for a non-positive font size.
pub fn render_text(text: &TextWatermark, font: &FontVec) -> Result<RgbaImage> {
    render_text_at(text, font, text.font_size)
}

/// Like [`render_text`], but drawn at `font_size` pixels.
///
/// Line breaks (including `wrap_width` wrapping) are decided at the
/// watermark's own font size, so every size shows the same lines.
///
/// # Errors
///
/// Same as [`render_text`].
pub fn render_text_at(text: &TextWatermark, font: &FontVec, font_size: f32) -> Result<RgbaImage> {
    let composed = text.content.compose(text.layout).ok_or(Error::EmptyText)?;
    for size in [text.font_size, font_size] {
        if size.is_nan() || size <= 0.0 {
            return Err(Error::InvalidGeometry(format!(
                "font size {size} must be positive"
            )));
        }
    }

    let lines = match text.layout {
        TextLayout::SingleLine => vec![composed],
        TextLayout::MultiLine => {
            wrap_lines(&composed, text.wrap_width, PxScale::from(text.font_size), font)
        }
    };

    let stroke = text.stroke_width.max(1);
    let coverage = coverage_mask(&lines, PxScale::from(font_size), font, text.margin());

    let [r, g, b] = text.color;
    let tile = match text.style {
        TextStyle::Filled => {
            RgbaImage::from_fn(coverage.width(), coverage.height(), |x, y| {
                Rgba([r, g, b, coverage.get_pixel(x, y)[0]])
            })
        }
        TextStyle::Hollow => {
            let ring = dilate(&coverage, Norm::LInf, stroke);
            RgbaImage::from_fn(coverage.width(), coverage.height(), |x, y| {
                let alpha = ring.get_pixel(x, y)[0].saturating_sub(coverage.get_pixel(x, y)[0]);
                Rgba([r, g, b, alpha])
            })
        }
        TextStyle::Outlined => {
            let ring = dilate(&coverage, Norm::LInf, stroke);
            let fill = Rgba([r, g, b, 255]);
            let border = contrasting(text.color);
            RgbaImage::from_fn(coverage.width(), coverage.height(), |x, y| {
                over(
                    fill,
                    coverage.get_pixel(x, y)[0],
                    border,
                    ring.get_pixel(x, y)[0],
                )
            })
        }
    };

    Ok(tile)
}

/// Draw each line's glyph coverage, centred horizontally, into a gray mask.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss
)]
fn coverage_mask(lines: &[String], scale: PxScale, font: &FontVec, margin: u32) -> GrayImage {
    let line_height = font.as_scaled(scale).height();
    let advance = line_height * LINE_SPACING;

    let widths: Vec<u32> = lines
        .iter()
        .map(|line| text_size(scale, font, line).0)
        .collect();
    let content_w = widths.iter().copied().max().unwrap_or(0).max(1);
    let content_h = (advance * lines.len().saturating_sub(1) as f32 + line_height)
        .ceil()
        .max(1.0) as u32;

    let mut mask = GrayImage::new(content_w + 2 * margin, content_h + 2 * margin);
    for (i, (line, width)) in lines.iter().zip(&widths).enumerate() {
        let x = margin + (content_w - width) / 2;
        let y = margin + (advance * i as f32).round() as u32;
        draw_text_mut(&mut mask, Luma([255]), x as i32, y as i32, scale, font, line);
    }
    mask
}

/// Split on line breaks and, with a wrap width, greedily on whitespace.
fn wrap_lines(text: &str, wrap_width: Option<u32>, scale: PxScale, font: &FontVec) -> Vec<String> {
    text.lines()
        .flat_map(|line| match wrap_width {
            Some(max) if max > 0 => wrap_line(line, max, scale, font),
            _ => vec![line.trim().to_string()],
        })
        .collect()
}

fn wrap_line(line: &str, max: u32, scale: PxScale, font: &FontVec) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for word in line.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
            continue;
        }
        let candidate = format!("{current} {word}");
        if text_size(scale, font, &candidate).0 <= max {
            current = candidate;
        } else {
            out.push(std::mem::replace(&mut current, word.to_string()));
        }
    }
    out.push(current);
    out
}

/// Black for light fills, white for dark ones.
fn contrasting(color: [u8; 3]) -> Rgba<u8> {
    let luma = crate::blending::luma(&Rgba([color[0], color[1], color[2], 255])) / 255.0;
    if luma < 0.5 {
        Rgba([255, 255, 255, 255])
    } else {
        Rgba([0, 0, 0, 255])
    }
}

/// Porter-Duff "over" of `top` with coverage `top_a` onto `bottom` with `bottom_a`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn over(top: Rgba<u8>, top_a: u8, bottom: Rgba<u8>, bottom_a: u8) -> Rgba<u8> {
    let ta = f32::from(top_a) / 255.0;
    let ba = f32::from(bottom_a) / 255.0 * (1.0 - ta);
    let out_a = ta + ba;
    if out_a <= 0.0 {
        return Rgba([top[0], top[1], top[2], 0]);
    }
    let mut px = [0u8; 4];
    for ch in 0..3 {
        let v = (f32::from(top[ch]) * ta + f32::from(bottom[ch]) * ba) / out_a;
        px[ch] = v.round().clamp(0.0, 255.0) as u8;
    }
    px[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgba(px)
}

/// Parse `"#RRGGBB"` or `"RRGGBB"`.
#[must_use]
pub fn parse_hex_color(hex: &str) -> Option<[u8; 3]> {
    let hex = hex.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}
