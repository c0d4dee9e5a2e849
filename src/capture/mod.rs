//! Capture adapters.
//!
//! Two ways to obtain a still image for a detection cycle:
//! - `file`: a user-selected image file, read fully and base64-encoded
//! - `camera`: a live camera stream (front/back), one still per capture
//!
//! Both produce an `ImagePayload`. Captured images are held in memory for one
//! cycle only; nothing here writes to disk.

pub mod camera;
pub mod file;
#[cfg(feature = "camera-v4l2")]
mod normalize;
#[cfg(feature = "camera-v4l2")]
mod v4l2;

pub use camera::{synthetic_device_open, CameraConfig, CameraSession, CameraStream, FacingMode};
pub use file::{FileCapture, PendingPayload};
