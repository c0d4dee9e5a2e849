use ab_glyph::FontArc;
use anyhow::{anyhow, Context, Result};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::path::Path;

use super::{OverlayStyle, Surface};
use crate::detect::BoxRect;
use crate::payload::ImagePayload;

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// How far outside the layer a label origin may sit before it is pinned.
const TEXT_MARGIN_PX: f64 = 4096.0;

/// Transparent RGBA layer sized to the source image, composited over it for
/// output.
pub struct RasterSurface {
    layer: RgbaImage,
    font: Option<FontArc>,
    warned_missing_font: bool,
}

impl RasterSurface {
    /// Create an empty surface. Without a font, labels are skipped.
    pub fn new(font: Option<FontArc>) -> Self {
        Self {
            layer: RgbaImage::new(0, 0),
            font,
            warned_missing_font: false,
        }
    }

    /// Load a TrueType/OpenType font for box labels.
    pub fn load_font(path: &Path) -> Result<FontArc> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("read font file {}", path.display()))?;
        FontArc::try_from_vec(bytes)
            .map_err(|e| anyhow!("unable to parse font {}: {}", path.display(), e))
    }

    /// The overlay layer on its own.
    pub fn layer(&self) -> &RgbaImage {
        &self.layer
    }

    /// Lay the overlay over the payload's decoded image.
    pub fn compose(&self, payload: &ImagePayload) -> Result<RgbaImage> {
        if (payload.natural_width(), payload.natural_height()) != self.layer.dimensions() {
            return Err(anyhow!(
                "overlay is {}x{} but image is {}x{}; render before composing",
                self.layer.width(),
                self.layer.height(),
                payload.natural_width(),
                payload.natural_height()
            ));
        }
        let mut base = payload.display().to_rgba8();
        image::imageops::overlay(&mut base, &self.layer, 0, 0);
        Ok(base)
    }
}

impl Surface for RasterSurface {
    fn resize(&mut self, width: u32, height: u32) {
        self.layer = RgbaImage::from_pixel(width, height, TRANSPARENT);
    }

    fn clear(&mut self) {
        for pixel in self.layer.pixels_mut() {
            *pixel = TRANSPARENT;
        }
    }

    fn stroke_rect(&mut self, rect: BoxRect, style: &OverlayStyle) {
        // Geometry comes from the remote service. Pin each edge just outside
        // the layer so off-image edges stay invisible and the integer maths
        // below cannot overflow.
        let margin = f64::from(style.line_width) + 1.0;
        let (layer_w, layer_h) = self.layer.dimensions();
        let left = clamp_edge(rect.x, layer_w, margin);
        let top = clamp_edge(rect.y, layer_h, margin);
        let right = clamp_edge(rect.x + rect.width, layer_w, margin);
        let bottom = clamp_edge(rect.y + rect.height, layer_h, margin);

        let x = left.round() as i64;
        let y = top.round() as i64;
        let w = (right - left).round() as i64;
        let h = (bottom - top).round() as i64;
        // Centre the stroke on the path, like a 2D canvas does.
        let half = (i64::from(style.line_width) - 1) / 2;
        for i in 0..i64::from(style.line_width) {
            let grow = i - half;
            let (rw, rh) = (w + 2 * grow, h + 2 * grow);
            if rw < 1 || rh < 1 {
                continue;
            }
            let outline =
                Rect::at((x - grow) as i32, (y - grow) as i32).of_size(rw as u32, rh as u32);
            draw_hollow_rect_mut(&mut self.layer, outline, style.color);
        }
    }

    fn fill_text(&mut self, text: &str, x: f64, y: f64, style: &OverlayStyle) {
        let Some(font) = self.font.as_ref() else {
            if !self.warned_missing_font {
                log::warn!("no overlay font configured; box labels are not drawn");
                self.warned_missing_font = true;
            }
            return;
        };
        // `y` is the baseline; imageproc positions text by its top edge.
        let (layer_w, layer_h) = self.layer.dimensions();
        let left = clamp_edge(x, layer_w, TEXT_MARGIN_PX);
        let top = clamp_edge(y - f64::from(style.font_px), layer_h, TEXT_MARGIN_PX);
        draw_text_mut(
            &mut self.layer,
            style.color,
            left.round() as i32,
            top.round() as i32,
            style.font_px,
            font,
            text,
        );
    }
}

/// Clamp a coordinate to `[-margin, extent + margin]`. NaN maps to `-margin`.
fn clamp_edge(value: f64, extent: u32, margin: f64) -> f64 {
    if value.is_nan() {
        return -margin;
    }
    value.clamp(-margin, f64::from(extent) + margin)
}
