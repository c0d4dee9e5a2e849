//! Detection overlay rendering.
//!
//! Boxes are drawn in the natural pixel space of the source image: the surface
//! is resized to the image's natural dimensions before drawing, so detection
//! geometry maps onto it without scaling.

mod raster;

use anyhow::{anyhow, Result};
use image::Rgba;

use crate::detect::{BoxRect, Detection};

pub use raster::RasterSurface;

/// Vertical gap between a box's top edge and its label baseline.
pub const LABEL_OFFSET_PX: f64 = 5.0;

pub const DEFAULT_COLOR: &str = "#FF3D00";
pub const DEFAULT_LINE_WIDTH: u32 = 3;
pub const DEFAULT_FONT_PX: f32 = 16.0;

/// Something the renderer can draw on.
///
/// Coordinates are natural pixel space; `fill_text` positions the text
/// baseline at `y`.
pub trait Surface {
    /// Resize to exactly `width` x `height`. Resizing discards prior content.
    fn resize(&mut self, width: u32, height: u32);

    /// Remove everything drawn so far.
    fn clear(&mut self);

    fn stroke_rect(&mut self, rect: BoxRect, style: &OverlayStyle);

    fn fill_text(&mut self, text: &str, x: f64, y: f64, style: &OverlayStyle);
}

#[derive(Clone, Debug, PartialEq)]
pub struct OverlayStyle {
    pub color: Rgba<u8>,
    pub line_width: u32,
    pub font_px: f32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            color: Rgba([0xFF, 0x3D, 0x00, 0xFF]),
            line_width: DEFAULT_LINE_WIDTH,
            font_px: DEFAULT_FONT_PX,
        }
    }
}

/// Parse a `#RRGGBB` colour into an opaque RGBA pixel.
pub fn parse_hex_color(value: &str) -> Result<Rgba<u8>> {
    let digits = value.trim().trim_start_matches('#');
    let bytes = hex::decode(digits)
        .map_err(|e| anyhow!("invalid colour '{}': {}", value, e))?;
    match bytes.as_slice() {
        [r, g, b] => Ok(Rgba([*r, *g, *b, 0xFF])),
        _ => Err(anyhow!("invalid colour '{}': expected #RRGGBB", value)),
    }
}

/// Label drawn above each box: class and confidence with one decimal.
pub fn box_label(detection: &Detection) -> String {
    format!(
        "{} ({:.1}%)",
        detection.class_label,
        detection.confidence_percent()
    )
}

#[derive(Clone, Debug, Default)]
pub struct OverlayRenderer {
    style: OverlayStyle,
}

impl OverlayRenderer {
    pub fn new(style: OverlayStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }

    /// Draw `detections` onto `surface`, replacing whatever was there.
    ///
    /// Drawing order follows the detection order.
    pub fn render<S: Surface + ?Sized>(
        &self,
        detections: &[Detection],
        surface: &mut S,
        natural_width: u32,
        natural_height: u32,
    ) {
        surface.resize(natural_width, natural_height);
        surface.clear();
        for detection in detections {
            let rect = detection.rect();
            surface.stroke_rect(rect, &self.style);
            surface.fill_text(
                &box_label(detection),
                rect.x,
                rect.y - LABEL_OFFSET_PX,
                &self.style,
            );
        }
    }
}
