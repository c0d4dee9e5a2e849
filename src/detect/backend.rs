use anyhow::Result;

use crate::detect::result::Detection;

/// Anything that turns an encoded image into detections.
///
/// The production implementation is `HostedInferenceClient`. Implementations
/// must make exactly one attempt per call and report every failure as `Err`
/// with a human-readable message rather than panicking.
pub trait DetectionService: Send + Sync {
    /// Service identifier for logs.
    fn name(&self) -> &'static str;

    /// Detect objects in a base64-encoded JPEG/PNG image.
    fn detect(&self, encoded_image: &str) -> Result<Vec<Detection>>;
}
