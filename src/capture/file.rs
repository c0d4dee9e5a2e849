//! Image file capture.
//!
//! The file is read fully into memory and base64-encoded right away, so the
//! inference request can start immediately. Decoding runs on its own thread and
//! reports completion through a channel; the renderer only receives an
//! `ImagePayload` once natural dimensions are known.

use anyhow::{anyhow, Context, Result};
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::thread;

use crate::payload::{encode_base64, ImagePayload};

pub struct FileCapture;

impl FileCapture {
    /// Start loading the selected file.
    ///
    /// Fails with "no file selected" when `path` is `None` or blank.
    pub fn load(path: Option<&Path>) -> Result<PendingPayload> {
        let path = match path {
            Some(path) if !path.as_os_str().is_empty() => path,
            _ => return Err(anyhow!("no file selected")),
        };
        let bytes =
            std::fs::read(path).with_context(|| format!("read image file {}", path.display()))?;
        if bytes.is_empty() {
            return Err(anyhow!("image file {} is empty", path.display()));
        }

        let encoded = encode_base64(&bytes);
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("bioscan-decode".to_string())
            .spawn(move || {
                let decoded = image::load_from_memory(&bytes)
                    .map_err(|e| anyhow!("failed to decode image: {}", e));
                // Receiver may be gone if the cycle was abandoned.
                let _ = tx.send(decoded);
            })
            .context("spawn image decode thread")?;

        log::debug!("loading {} ({} base64 chars)", path.display(), encoded.len());
        Ok(PendingPayload {
            source: path.to_path_buf(),
            encoded,
            decoded: rx,
        })
    }
}

/// A file whose bytes are encoded but whose decode may still be running.
pub struct PendingPayload {
    source: PathBuf,
    encoded: String,
    decoded: Receiver<Result<DynamicImage>>,
}

impl PendingPayload {
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Base64 text of the raw file bytes, available before decoding finishes.
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    /// Block until decoding completes.
    pub fn wait(self) -> Result<ImagePayload> {
        let display = self
            .decoded
            .recv()
            .map_err(|_| anyhow!("image decode thread exited without a result"))?
            .with_context(|| format!("decode {}", self.source.display()))?;
        ImagePayload::new(display, self.encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use image::{ImageFormat, RgbImage};
    use std::io::Write;

    #[test]
    fn missing_selection_is_rejected() {
        let err = FileCapture::load(None).err().expect("no file");
        assert_eq!(err.to_string(), "no file selected");
        let err = FileCapture::load(Some(Path::new(""))).err().expect("blank");
        assert_eq!(err.to_string(), "no file selected");
    }

    #[test]
    fn encodes_raw_bytes_and_decodes_dimensions() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("sample.png");
        DynamicImage::ImageRgb8(RgbImage::new(40, 30)).save_with_format(&path, ImageFormat::Png)?;
        let raw = std::fs::read(&path)?;

        let pending = FileCapture::load(Some(&path))?;
        assert_eq!(
            pending.encoded(),
            base64::engine::general_purpose::STANDARD.encode(&raw)
        );
        let payload = pending.wait()?;
        assert_eq!(payload.natural_width(), 40);
        assert_eq!(payload.natural_height(), 30);
        Ok(())
    }

    #[test]
    fn undecodable_file_fails_on_wait() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(b"definitely not a picture")?;

        let pending = FileCapture::load(Some(file.path()))?;
        assert!(!pending.encoded().is_empty());
        assert!(pending.wait().is_err());
        Ok(())
    }

    #[test]
    fn empty_and_missing_files_are_rejected() -> Result<()> {
        let file = tempfile::NamedTempFile::new()?;
        assert!(FileCapture::load(Some(file.path())).is_err());
        assert!(FileCapture::load(Some(Path::new("/nonexistent/bioscan.png"))).is_err());
        Ok(())
    }
}
