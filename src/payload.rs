//! Image payload handed from capture to inference and rendering.
//!
//! An `ImagePayload` lives for exactly one capture -> inference -> render cycle.
//! Fields are private and there is no `&mut` API: once built, a payload is
//! read-only.

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{DynamicImage, GenericImageView};

/// Decoded image plus the base64 text sent to the inference endpoint.
#[derive(Debug)]
pub struct ImagePayload {
    display: DynamicImage,
    encoded: String,
    natural_width: u32,
    natural_height: u32,
}

impl ImagePayload {
    /// Build a payload from an already decoded image and its base64 text.
    pub(crate) fn new(display: DynamicImage, encoded: String) -> Result<Self> {
        let (natural_width, natural_height) = display.dimensions();
        if natural_width == 0 || natural_height == 0 {
            return Err(anyhow!("image has zero natural dimensions"));
        }
        Ok(Self {
            display,
            encoded,
            natural_width,
            natural_height,
        })
    }

    /// Decode raw encoded image bytes (JPEG/PNG) into a payload.
    pub fn from_encoded_bytes(bytes: &[u8]) -> Result<Self> {
        let display = image::load_from_memory(bytes)
            .map_err(|e| anyhow!("failed to decode image: {}", e))?;
        Self::new(display, encode_base64(bytes))
    }

    /// Decoded bitmap used for on-screen (or on-disk) display.
    pub fn display(&self) -> &DynamicImage {
        &self.display
    }

    /// Base64 text of the original encoded bytes.
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    pub fn natural_width(&self) -> u32 {
        self.natural_width
    }

    pub fn natural_height(&self) -> u32 {
        self.natural_height
    }
}

pub(crate) fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}
