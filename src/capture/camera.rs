//! Live camera capture.
//!
//! A `CameraSession` owns at most one open `CameraStream`. Streams release
//! their device when dropped, and switching facing mode drops the current
//! stream before the next one is opened, so a device is never held twice.
//!
//! Device paths starting with `stub://` open a synthetic camera that needs no
//! hardware. Real devices use V4L2 and require the `camera-v4l2` feature.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbImage};
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Mutex;

#[cfg(feature = "camera-v4l2")]
use super::v4l2::V4l2Stream;
use crate::payload::{encode_base64, ImagePayload};

/// Which physical camera a stream uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Front-facing ("selfie") camera.
    User,
    /// Back-facing camera.
    #[default]
    Environment,
}

impl FacingMode {
    pub fn toggled(self) -> Self {
        match self {
            FacingMode::User => FacingMode::Environment,
            FacingMode::Environment => FacingMode::User,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FacingMode::User => "user",
            FacingMode::Environment => "environment",
        }
    }

    /// Human label for the camera this mode selects.
    pub fn camera_name(self) -> &'static str {
        match self {
            FacingMode::User => "front camera",
            FacingMode::Environment => "back camera",
        }
    }
}

impl FromStr for FacingMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" | "front" => Ok(FacingMode::User),
            "environment" | "back" => Ok(FacingMode::Environment),
            other => Err(anyhow!(
                "unknown facing mode '{}'; expected user|environment",
                other
            )),
        }
    }
}

/// Configuration for live camera capture.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Device used for `FacingMode::User` (e.g., "/dev/video1").
    pub front_device: String,
    /// Device used for `FacingMode::Environment` (e.g., "/dev/video0").
    pub back_device: String,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
    /// JPEG quality for captured stills (1-100).
    pub jpeg_quality: u8,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            front_device: "/dev/video1".to_string(),
            back_device: "/dev/video0".to_string(),
            width: 640,
            height: 480,
            jpeg_quality: 90,
        }
    }
}

impl CameraConfig {
    pub fn device_for(&self, facing: FacingMode) -> &str {
        match facing {
            FacingMode::User => &self.front_device,
            FacingMode::Environment => &self.back_device,
        }
    }
}

/// An open video stream on one device.
pub struct CameraStream {
    backend: StreamBackend,
}

enum StreamBackend {
    Synthetic(SyntheticStream),
    #[cfg(feature = "camera-v4l2")]
    Device(V4l2Stream),
}

impl CameraStream {
    pub fn open(device: &str, width: u32, height: u32) -> Result<Self> {
        if device.starts_with("stub://") {
            return Ok(Self {
                backend: StreamBackend::Synthetic(SyntheticStream::open(device, width, height)?),
            });
        }
        #[cfg(feature = "camera-v4l2")]
        {
            Ok(Self {
                backend: StreamBackend::Device(V4l2Stream::open(device, width, height)?),
            })
        }
        #[cfg(not(feature = "camera-v4l2"))]
        {
            Err(anyhow!(
                "camera device {} requires the camera-v4l2 feature",
                device
            ))
        }
    }

    pub fn device(&self) -> &str {
        match &self.backend {
            StreamBackend::Synthetic(stream) => &stream.device,
            #[cfg(feature = "camera-v4l2")]
            StreamBackend::Device(stream) => stream.device(),
        }
    }

    /// Pull the next frame from the stream as RGB.
    pub fn next_frame(&mut self) -> Result<RgbImage> {
        match &mut self.backend {
            StreamBackend::Synthetic(stream) => stream.next_frame(),
            #[cfg(feature = "camera-v4l2")]
            StreamBackend::Device(stream) => stream.next_frame(),
        }
    }
}

/// Camera owned by the realtime screen.
pub struct CameraSession {
    config: CameraConfig,
    facing: FacingMode,
    stream: Option<CameraStream>,
}

impl CameraSession {
    /// Open the camera selected by `facing`.
    pub fn open(config: CameraConfig, facing: FacingMode) -> Result<Self> {
        let mut session = Self {
            config,
            facing,
            stream: None,
        };
        session.acquire()?;
        Ok(session)
    }

    pub fn facing(&self) -> FacingMode {
        self.facing
    }

    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    pub fn active_device(&self) -> Option<&str> {
        self.stream.as_ref().map(|stream| stream.device())
    }

    /// Switch between front and back cameras.
    ///
    /// The current stream is released before the other device is opened. If
    /// the new device fails to open, the session is left without a stream and
    /// the new facing mode is kept, so toggling again retries the original.
    pub fn switch_facing(&mut self) -> Result<FacingMode> {
        self.close();
        self.facing = self.facing.toggled();
        self.acquire()?;
        Ok(self.facing)
    }

    /// Take one still frame and encode it as JPEG.
    pub fn capture(&mut self) -> Result<ImagePayload> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| anyhow!("camera is not streaming"))?;
        let frame = stream.next_frame().context("capture camera frame")?;
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.config.jpeg_quality)
            .encode_image(&frame)
            .context("encode captured frame as jpeg")?;
        ImagePayload::new(DynamicImage::ImageRgb8(frame), encode_base64(&jpeg))
    }

    /// Release the open stream, if any.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            log::info!("camera: released {}", stream.device());
        }
    }

    fn acquire(&mut self) -> Result<()> {
        let device = self.config.device_for(self.facing).to_string();
        let stream = CameraStream::open(&device, self.config.width, self.config.height)
            .with_context(|| format!("open {} ({})", self.facing.camera_name(), device))?;
        log::info!(
            "camera: streaming {} from {}",
            self.facing.camera_name(),
            device
        );
        self.stream = Some(stream);
        Ok(())
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.close();
    }
}

// ----------------------------------------------------------------------------
// Synthetic camera (stub://)
// ----------------------------------------------------------------------------

/// Synthetic devices currently held open. A device can only be opened once,
/// like a real capture device.
static OPEN_SYNTHETIC: Mutex<Vec<String>> = Mutex::new(Vec::new());

/// True while a synthetic `stub://` device has an open stream.
pub fn synthetic_device_open(device: &str) -> bool {
    OPEN_SYNTHETIC
        .lock()
        .map(|open| open.iter().any(|d| d == device))
        .unwrap_or(false)
}

struct SyntheticStream {
    device: String,
    width: u32,
    height: u32,
    frame_count: u64,
}

impl SyntheticStream {
    fn open(device: &str, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("camera frame size must be non-zero"));
        }
        let mut open = OPEN_SYNTHETIC
            .lock()
            .map_err(|_| anyhow!("synthetic camera registry poisoned"))?;
        if open.iter().any(|d| d == device) {
            return Err(anyhow!("camera device {} is busy", device));
        }
        open.push(device.to_string());
        Ok(Self {
            device: device.to_string(),
            width,
            height,
            frame_count: 0,
        })
    }

    fn next_frame(&mut self) -> Result<RgbImage> {
        self.frame_count += 1;
        let len = (self.width * self.height * 3) as usize;
        let mut pixels = vec![0u8; len];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count) % 256) as u8;
        }
        RgbImage::from_raw(self.width, self.height, pixels)
            .ok_or_else(|| anyhow!("synthetic frame buffer size mismatch"))
    }
}

impl Drop for SyntheticStream {
    fn drop(&mut self) {
        if let Ok(mut open) = OPEN_SYNTHETIC.lock() {
            open.retain(|d| d != &self.device);
        }
    }
}
